//! Built-in recipes.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::debug;

use super::{Interaction, Recipe, RecipeContext, RecipeFuture};
use crate::editor::ActiveTextEditorSelection;
use crate::AppError;

/// Warning shown when a code recipe runs without a selection.
pub const NO_SELECTION_WARNING: &str = "No code selected. Please select some code and try again.";

/// Every built-in recipe in listing order.
#[must_use]
pub fn all() -> Vec<Arc<dyn Recipe>> {
    let mut recipes: Vec<Arc<dyn Recipe>> = vec![Arc::new(ChatQuestion)];
    recipes.extend(
        SELECTION_RECIPES
            .iter()
            .map(|recipe| Arc::new(*recipe) as Arc<dyn Recipe>),
    );
    recipes
}

// ── chat-question ─────────────────────────────────────────────────────────────

/// Free-form question; attaches the selection when the question is about it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatQuestion;

impl Recipe for ChatQuestion {
    fn id(&self) -> &str {
        "chat-question"
    }

    fn title(&self) -> &str {
        "Chat Question"
    }

    fn interaction<'a>(
        &'a self,
        human_input: &'a str,
        context: &'a RecipeContext,
    ) -> RecipeFuture<'a> {
        Box::pin(async move {
            let mut prompt = String::new();
            if context.intent.is_editor_context_required(human_input).await? {
                match context.editor.active_text_editor_selection().await? {
                    Some(selection) => {
                        write_selection(&mut prompt, &selection);
                        prompt.push('\n');
                    }
                    None => debug!("chat-question: editor context wanted but nothing selected"),
                }
            }
            prompt.push_str(human_input);

            Ok(Interaction {
                prompt,
                display_text: human_input.to_owned(),
            })
        })
    }
}

// ── Selection recipes ─────────────────────────────────────────────────────────

/// Recipe that wraps the current selection in a fixed instruction.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRecipe {
    id: &'static str,
    title: &'static str,
    instruction: &'static str,
}

const SELECTION_RECIPES: [SelectionRecipe; 6] = [
    SelectionRecipe {
        id: "explain-code-detailed",
        title: "Explain selected code (detailed)",
        instruction: "Please explain the following code. Be very detailed and specific, and \
                      indicate when it is not clear to you what is going on. Format your \
                      response as an ordered list.",
    },
    SelectionRecipe {
        id: "explain-code-high-level",
        title: "Explain selected code (high level)",
        instruction: "Explain the following code at a high level. Only include details that \
                      are essential to an overall understanding of what's happening in the code.",
    },
    SelectionRecipe {
        id: "generate-docstring",
        title: "Generate docstring",
        instruction: "Generate a comment documenting the parameters and functionality of the \
                      following code. Only output the comment.",
    },
    SelectionRecipe {
        id: "generate-unit-test",
        title: "Generate unit test",
        instruction: "Generate a unit test for the following code. Follow the testing \
                      conventions visible in the surrounding code.",
    },
    SelectionRecipe {
        id: "improve-variable-names",
        title: "Improve variable names",
        instruction: "Improve the variable names in the following code. Leave everything else \
                      unchanged and only output the updated code.",
    },
    SelectionRecipe {
        id: "find-code-smells",
        title: "Smell code",
        instruction: "Find code smells, potential bugs, and unhandled errors in the following \
                      code. List at most five, most important first.",
    },
];

impl Recipe for SelectionRecipe {
    fn id(&self) -> &str {
        self.id
    }

    fn title(&self) -> &str {
        self.title
    }

    fn interaction<'a>(
        &'a self,
        human_input: &'a str,
        context: &'a RecipeContext,
    ) -> RecipeFuture<'a> {
        Box::pin(async move {
            let selection = context
                .editor
                .active_text_editor_selection()
                .await?
                .filter(|s| !s.selected_text.trim().is_empty());

            let Some(selection) = selection else {
                context
                    .editor
                    .show_warning_message(NO_SELECTION_WARNING)
                    .await?;
                return Err(AppError::Upstream(format!(
                    "recipe `{}` needs a code selection",
                    self.id
                )));
            };

            let mut prompt = format!("{}\n\n", self.instruction);
            write_selection(&mut prompt, &selection);
            let extra = human_input.trim();
            if !extra.is_empty() {
                let _ = write!(prompt, "\n{extra}");
            }

            Ok(Interaction {
                prompt,
                display_text: format!(
                    "{}:\n```\n{}\n```",
                    self.title,
                    selection.selected_text.trim_end()
                ),
            })
        })
    }
}

/// Append the selection and its surroundings as fenced blocks.
fn write_selection(out: &mut String, selection: &ActiveTextEditorSelection) {
    let _ = writeln!(out, "File: {}", selection.file_name);
    if !selection.preceding_text.trim().is_empty() {
        let _ = writeln!(
            out,
            "Code before the selection:\n```\n{}\n```",
            selection.preceding_text.trim_end()
        );
    }
    let _ = writeln!(
        out,
        "Selected code:\n```\n{}\n```",
        selection.selected_text.trim_end()
    );
    if !selection.following_text.trim().is_empty() {
        let _ = writeln!(
            out,
            "Code after the selection:\n```\n{}\n```",
            selection.following_text.trim_end()
        );
    }
}
