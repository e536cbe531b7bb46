//! Authentication gate seam.
//!
//! The core consumes authentication purely as a gate: it can observe the
//! current session and ask for sign-out. Session logic itself (tokens,
//! refresh, persistence) belongs to the external auth collaborator and
//! never enters the view models.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::feed::Subscription;

/// The signed-in identity as observed from the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl SessionInfo {
    pub fn new(user_id: impl Into<String>) -> SessionInfo {
        SessionInfo {
            user_id: user_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> SessionInfo {
        self.email = Some(email.into());
        self
    }
}

/// Observer for session transitions. `None` means signed out.
pub type SessionObserver = Arc<dyn Fn(Option<SessionInfo>) + Send + Sync>;

/// The auth collaborator as consumed by this core.
pub trait AuthGate: Send + Sync {
    /// Observes the current session: the present value is delivered
    /// immediately, then every transition.
    fn observe_session(&self, observer: SessionObserver) -> Result<Subscription>;

    /// Ends the current session.
    fn sign_out(&self) -> Result<()>;
}
