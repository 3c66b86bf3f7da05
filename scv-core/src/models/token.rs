//! Activation token minting and parsing.
//!
//! A token reads `"<targetId>:<random>"`. The target prefix is only a
//! routing hint; the authoritative check is always the target's token map.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::id::TargetId;

/// Length of the random suffix appended after the target prefix.
pub const TOKEN_SUFFIX_LEN: usize = 36;

/// Opaque authorization token identifying one active checkout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Mint a fresh token for `target_id` with a uniform 36-character
    /// alphanumeric suffix.
    #[must_use]
    pub fn mint(target_id: &TargetId) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_SUFFIX_LEN)
            .map(char::from)
            .collect();
        Self(format!("{target_id}:{suffix}"))
    }

    #[must_use]
    pub const fn from_string(raw: String) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the first `:`, or `None` when the token has no
    /// separator and is therefore malformed.
    #[must_use]
    pub fn target_prefix(&self) -> Option<TargetId> {
        self.0
            .split_once(':')
            .map(|(prefix, _)| TargetId::from_string(prefix.to_string()))
    }
}

impl std::fmt::Display for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AuthToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}
