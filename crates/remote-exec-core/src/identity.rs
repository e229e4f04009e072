//! Process specification and session identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What to run remotely, and with which executor.
///
/// Serializes to the content API's create-process request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Source code handed to the executor.
    #[serde(rename = "code")]
    pub source_code: String,

    /// Interpreter/runtime name (e.g. `python`).
    #[serde(rename = "executor")]
    pub executor_kind: String,
}

impl ProcessSpec {
    /// Create a new process specification.
    #[must_use]
    pub fn new(source_code: impl Into<String>, executor_kind: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            executor_kind: executor_kind.into(),
        }
    }
}

/// Identity/authorization pair issued by the content API.
///
/// Written once when creation succeeds and carried unchanged on every
/// outbound event afterwards.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    id: String,
    #[serde(alias = "authorizationCode")]
    auth_code: String,
}

impl SessionIdentity {
    /// Create an identity pair.
    #[must_use]
    pub fn new(id: impl Into<String>, auth_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            auth_code: auth_code.into(),
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Authorization code proving the holder may act on the session.
    #[must_use]
    pub fn auth_code(&self) -> &str {
        &self.auth_code
    }
}

// The authorization code never ends up in logs.
impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("id", &self.id)
            .field("auth_code", &"<redacted>")
            .finish()
    }
}

/// Content API response to a create-process request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProcessResponse {
    /// Whether the process was created.
    pub success: bool,

    /// Identity pair, present on success.
    #[serde(
        default,
        rename = "code_execution",
        alias = "session",
        skip_serializing_if = "Option::is_none"
    )]
    pub session: Option<SessionIdentity>,

    /// Server-provided failure reason.
    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreateProcessResponse {
    /// Successful response carrying an identity.
    #[must_use]
    pub const fn created(identity: SessionIdentity) -> Self {
        Self {
            success: true,
            session: Some(identity),
            error: None,
        }
    }

    /// Failed response with an optional reason.
    #[must_use]
    pub const fn rejected(error: Option<String>) -> Self {
        Self {
            success: false,
            session: None,
            error,
        }
    }

    /// Extract the identity, or the reason creation did not succeed.
    ///
    /// # Errors
    /// Returns the failure reason when `success` is false or no identity was sent.
    pub fn into_identity(self) -> Result<SessionIdentity, String> {
        match (self.success, self.session) {
            (true, Some(identity)) => Ok(identity),
            (true, None) => Err("response carried no session identity".to_string()),
            (false, _) => Err(self
                .error
                .unwrap_or_else(|| "process creation rejected".to_string())),
        }
    }
}
