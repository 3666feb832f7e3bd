/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Error types for snapshot lifecycle operations

use thiserror::Error;

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors raised while managing snapshots
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("management API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl LifecycleError {
    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unexpected-response error.
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedResponse(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LifecycleError::Api {
            status: 409,
            code: "OperationNotAllowed".to_string(),
            message: "snapshot is attached".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "management API error 409 (OperationNotAllowed): snapshot is attached"
        );

        let err = LifecycleError::auth("no credential source yielded a token");
        assert_eq!(
            err.to_string(),
            "authentication error: no credential source yielded a token"
        );
    }
}
