use std::fmt;

use serde::{Deserialize, Serialize};

/// The signed-in principal together with the tokens the backend issued for it.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds after which `access_token` is no longer accepted.
    pub expires_at: Option<i64>,
}

// Tokens end up in logs through `?session`; keep them out.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tokens handed back by the identity provider on the OAuth redirect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthCallback {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absolute expiry in unix seconds, when the provider supplies it.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Public view of the principal, safe to hand to a UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
}

impl From<&Session> for Principal {
    fn from(session: &Session) -> Self {
        Self {
            id: session.user_id.clone(),
            email: session.email.clone(),
        }
    }
}
