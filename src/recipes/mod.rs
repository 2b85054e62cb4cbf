//! Recipes: named chat behaviours invoked by id.
//!
//! A [`Recipe`] turns the human's chat input into an [`Interaction`], reading
//! whatever editor context it needs through [`RecipeContext`]. The
//! [`RecipeRegistry`] keeps recipes in registration order, which is also the
//! order `recipes/list` reports.

pub mod builtin;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::editor::Editor;
use crate::intent::IntentDetector;
use crate::protocol::RecipeInfo;
use crate::{AppError, Result};

/// Boxed future returned by [`Recipe::interaction`].
pub type RecipeFuture<'a> = Pin<Box<dyn Future<Output = Result<Interaction>> + Send + 'a>>;

/// The human turn a recipe produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// Text sent to the model.
    pub prompt: String,
    /// Text shown in the chat transcript.
    pub display_text: String,
}

/// Capabilities available while a recipe runs.
#[derive(Clone)]
pub struct RecipeContext {
    /// Editing surface.
    pub editor: Arc<dyn Editor>,
    /// Intent classification.
    pub intent: Arc<dyn IntentDetector>,
    /// Whether this is the first exchange of the chat.
    pub first_interaction: bool,
}

impl std::fmt::Debug for RecipeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeContext")
            .field("first_interaction", &self.first_interaction)
            .finish_non_exhaustive()
    }
}

/// A chat behaviour selectable by id.
pub trait Recipe: Send + Sync {
    /// Stable id used by `recipes/execute`.
    fn id(&self) -> &str;

    /// Human-readable title.
    fn title(&self) -> &str;

    /// Build the human turn for `human_input`.
    ///
    /// Errors are reported to the `recipes/execute` caller unchanged.
    fn interaction<'a>(&'a self, human_input: &'a str, context: &'a RecipeContext)
        -> RecipeFuture<'a>;
}

/// Ordered collection of recipes keyed by id.
#[derive(Default, Clone)]
pub struct RecipeRegistry {
    recipes: Vec<Arc<dyn Recipe>>,
}

impl std::fmt::Debug for RecipeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.recipes.iter().map(|r| r.id()).collect();
        f.debug_struct("RecipeRegistry").field("recipes", &ids).finish()
    }
}

impl RecipeRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in recipe.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            recipes: builtin::all(),
        }
    }

    /// Add `recipe` after the existing ones.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if a recipe with the same id exists.
    pub fn register(&mut self, recipe: Arc<dyn Recipe>) -> Result<()> {
        if self.get(recipe.id()).is_some() {
            return Err(AppError::Config(format!(
                "recipe `{}` is already registered",
                recipe.id()
            )));
        }
        self.recipes.push(recipe);
        Ok(())
    }

    /// Look up a recipe by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Recipe>> {
        self.recipes.iter().find(|r| r.id() == id).cloned()
    }

    /// `{id, title}` of every recipe in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<RecipeInfo> {
        self.recipes
            .iter()
            .map(|r| RecipeInfo {
                id: r.id().to_owned(),
                title: r.title().to_owned(),
            })
            .collect()
    }

    /// Number of registered recipes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}
