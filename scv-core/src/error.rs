use thiserror::Error;

use crate::models::{AuthToken, StreamId, TargetId};

/// Why a token failed to resolve.
///
/// Activation traffic is audit-logged, so callers need to tell a garbage
/// token apart from a stale-but-well-formed one.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenFault {
    #[error("token is malformed")]
    Malformed,
    #[error("token names an unknown target")]
    UnknownTarget,
    #[error("token is not registered with its target")]
    Unregistered,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("stream {0} already exists")]
    AlreadyExists(StreamId),

    #[error("stream {0} does not exist")]
    NotFound(StreamId),

    #[error("target {0} does not exist")]
    UnknownTarget(TargetId),

    #[error("target {0} has no assignable streams")]
    TargetDrained(TargetId),

    #[error("invalid token {token}: {fault}")]
    InvalidToken { token: AuthToken, fault: TokenFault },

    #[error("injector failed")]
    Injector(#[source] anyhow::Error),

    #[error("closure failed")]
    Closure(#[source] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn invalid_token(token: &AuthToken, fault: TokenFault) -> Self {
        Self::InvalidToken {
            token: token.clone(),
            fault,
        }
    }

    /// True for the benign race where a heartbeat timer fires after its
    /// stream was already deactivated.
    #[must_use]
    pub const fn is_invalid_token(&self) -> bool {
        matches!(self, Self::InvalidToken { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
