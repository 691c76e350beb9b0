//! Signed-in identity supplied by the authentication subsystem.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub user_email: String,
    pub is_authenticated: bool,
}

impl Identity {
    pub fn signed_in(user_id: impl Into<String>, user_email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_email: user_email.into(),
            is_authenticated: true,
        }
    }

    /// Gate for every sync operation.
    pub fn require_authenticated(&self) -> Result<&Self> {
        if self.is_authenticated && !self.user_id.trim().is_empty() {
            Ok(self)
        } else {
            Err(SyncError::AuthenticationRequired)
        }
    }
}
