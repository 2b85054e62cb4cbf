//! Server lifecycle state machine.
//!
//! `Uninitialized → Initialized → ShuttingDown → Exited`. `Exited` is also
//! reachable directly from the first two states when `exit` arrives without a
//! prior `shutdown`; the exit code records which path was taken.

use tokio::sync::watch;

use crate::{AppError, Result};

/// Lifecycle states of one agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Waiting for `initialize`.
    Uninitialized,
    /// Serving the full request surface.
    Initialized,
    /// `shutdown` was answered; only `exit` is accepted.
    ShuttingDown,
    /// Terminal. `clean` is true when `shutdown` preceded `exit`.
    Exited {
        /// Whether the session exited after a `shutdown`.
        clean: bool,
    },
}

impl LifecycleState {
    /// Process exit code for a terminal state, `None` before `exit`.
    #[must_use]
    pub fn exit_code(self) -> Option<i32> {
        match self {
            Self::Exited { clean: true } => Some(0),
            Self::Exited { clean: false } => Some(1),
            _ => None,
        }
    }
}

/// Shared lifecycle cell; observers can wait for transitions.
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Start in [`LifecycleState::Uninitialized`].
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self { state }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Handle `initialize`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Lifecycle`] unless the session is uninitialized.
    pub fn initialize(&self) -> Result<()> {
        self.transition(|state| match state {
            LifecycleState::Uninitialized => Ok(LifecycleState::Initialized),
            LifecycleState::Initialized => {
                Err(AppError::Lifecycle("initialize was already received".to_owned()))
            }
            _ => Err(AppError::Lifecycle("server is shutting down".to_owned())),
        })
    }

    /// Gate for every operational request (`recipes/*` and friends).
    ///
    /// # Errors
    ///
    /// - [`AppError::NotInitialized`] before `initialize`.
    /// - [`AppError::Lifecycle`] after `shutdown`.
    pub fn ensure_operational(&self, method: &str) -> Result<()> {
        match self.state() {
            LifecycleState::Initialized => Ok(()),
            LifecycleState::Uninitialized => Err(AppError::NotInitialized(format!(
                "`{method}` received before initialize"
            ))),
            _ => Err(AppError::Lifecycle(format!(
                "`{method}` rejected: server is shutting down"
            ))),
        }
    }

    /// Handle `shutdown`.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotInitialized`] before `initialize`.
    /// - [`AppError::Lifecycle`] if `shutdown` was already received.
    pub fn shutdown(&self) -> Result<()> {
        self.transition(|state| match state {
            LifecycleState::Initialized => Ok(LifecycleState::ShuttingDown),
            LifecycleState::Uninitialized => Err(AppError::NotInitialized(
                "shutdown received before initialize".to_owned(),
            )),
            _ => Err(AppError::Lifecycle("shutdown was already received".to_owned())),
        })
    }

    /// Handle `exit`; returns the resulting process exit code.
    ///
    /// A repeated `exit` keeps the first outcome.
    #[must_use]
    pub fn exit(&self) -> i32 {
        self.state.send_if_modified(|state| match *state {
            LifecycleState::Exited { .. } => false,
            previous => {
                *state = LifecycleState::Exited {
                    clean: previous == LifecycleState::ShuttingDown,
                };
                true
            }
        });
        self.state().exit_code().unwrap_or(1)
    }

    fn transition<F>(&self, next: F) -> Result<()>
    where
        F: FnOnce(LifecycleState) -> Result<LifecycleState>,
    {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| match next(*state) {
            Ok(new_state) => {
                *state = new_state;
                true
            }
            Err(err) => {
                outcome = Err(err);
                false
            }
        });
        outcome
    }
}
