//! Status values passed between the gates and returned to the caller.

use http::StatusCode;
use serde::Serialize;
use sigil_auth::AuthError;

/// The outcome of a gate, verifier, or hook, as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    /// HTTP status.
    #[serde(rename = "status", serialize_with = "serialize_code")]
    pub code: StatusCode,
    /// Human readable message.
    pub message: String,
    /// Redirect target for 3xx statuses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

fn serialize_code<S: serde::Serializer>(code: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(code.as_u16())
}

impl AuthStatus {
    /// A status with a message.
    #[must_use]
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
        }
    }

    /// `200 OK`.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK, "ok")
    }

    /// `302 Found` pointing at `location`.
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            code: StatusCode::FOUND,
            message: String::new(),
            location: Some(location.into()),
        }
    }

    /// Whether the status is `200 OK`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::OK
    }

    /// What the caller should do with the request.
    #[must_use]
    pub fn decision(&self) -> Decision {
        if self.is_ok() {
            return Decision::Continue;
        }
        match &self.location {
            Some(location) if self.code.is_redirection() => Decision::Redirect {
                code: self.code,
                location: location.clone(),
            },
            _ => Decision::Reject(self.clone()),
        }
    }
}

impl Default for AuthStatus {
    fn default() -> Self {
        Self::ok()
    }
}

impl From<&AuthError> for AuthStatus {
    fn from(err: &AuthError) -> Self {
        Self::new(err.status(), err.to_string())
    }
}

/// Final decision of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Pass the request on to the application.
    Continue,
    /// Send the status to the client and stop.
    Reject(AuthStatus),
    /// Redirect the client.
    Redirect {
        /// 3xx status.
        code: StatusCode,
        /// Redirect target.
        location: String,
    },
}
