// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Rejected settings, surfaced before any record is admitted.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Outcome of a single call against the remote store.
///
/// `NotFound` is an expected signal on append and drives the create path,
/// every other variant is treated as a failed attempt.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{path} does not exist")]
    NotFound { path: String },

    #[error("{status}: {exception}: {message}")]
    Remote {
        status: StatusCode,
        exception: String,
        message: String,
    },

    #[error("redirect from namenode without a usable Location header (status {0})")]
    Redirect(StatusCode),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Failure to commit one destination path. Never fatal for the sink.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to encode payload for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("gave up on {path} after {attempts} attempts: {source}")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl WriteError {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            WriteError::Encode { path, .. }
            | WriteError::Create { path, .. }
            | WriteError::RetriesExhausted { path, .. } => path,
        }
    }
}

/// Errors that stop the sink from starting or accepting records.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("WebHDFS check request failed (namenode: {endpoint}): {source}")]
    HealthCheck {
        endpoint: String,
        #[source]
        source: StoreError,
    },

    #[error("Sink already shut down")]
    AlreadyShutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("snappy_bufsize must be at most 65536".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: snappy_bufsize must be at most 65536"
        );
        assert_eq!(
            ConfigError::Missing("user").to_string(),
            "Missing required setting: user"
        );
    }

    #[test]
    fn test_not_found_is_distinguishable() {
        let not_found = StoreError::NotFound {
            path: "/logs/a.log".to_string(),
        };
        assert!(not_found.is_not_found());

        let remote = StoreError::Remote {
            status: StatusCode::FORBIDDEN,
            exception: "AlreadyBeingCreatedException".to_string(),
            message: "lease held".to_string(),
        };
        assert!(!remote.is_not_found());
        assert!(remote.to_string().contains("AlreadyBeingCreatedException"));
    }

    #[test]
    fn test_write_error_path() {
        let error = WriteError::RetriesExhausted {
            path: "/logs/a.log".to_string(),
            attempts: 5,
            source: StoreError::Redirect(StatusCode::TEMPORARY_REDIRECT),
        };
        assert_eq!(error.path(), "/logs/a.log");
        assert!(error.to_string().contains("after 5 attempts"));
    }
}
