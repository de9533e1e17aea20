//! Error types for object storage access.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Backend failure; `status` is the upstream HTTP status when known.
    #[error("Storage backend error on {path}: {message}")]
    Backend {
        path: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

impl StorageError {
    pub(crate) fn from_backend(path: &str, err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { .. } => StorageError::NotFound(path.to_string()),
            other => StorageError::Backend {
                path: path.to_string(),
                status: backend_status(&other),
                message: other.to_string(),
            },
        }
    }

    /// Upstream status code, if the backend reported one.
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::NotFound(_) => Some(404),
            StorageError::Backend { status, .. } => *status,
            StorageError::Config(_) => None,
        }
    }
}

/// HTTP status implied by a typed backend error. `Generic` errors carry no
/// typed status and map to `None`.
fn backend_status(err: &object_store::Error) -> Option<u16> {
    use object_store::Error;
    match err {
        Error::NotFound { .. } => Some(404),
        Error::NotModified { .. } => Some(304),
        Error::AlreadyExists { .. } => Some(409),
        Error::Precondition { .. } => Some(412),
        Error::InvalidPath { .. } => Some(400),
        Error::NotSupported { .. } | Error::NotImplemented => Some(501),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cause() -> Box<dyn std::error::Error + Send + Sync> {
        "upstream said no".into()
    }

    #[test]
    fn test_backend_status_from_variant() {
        let err = StorageError::from_backend(
            "indices/radar/nexrad/KTLX/frames.json",
            object_store::Error::Precondition {
                path: "indices/radar/nexrad/KTLX/frames.json".into(),
                source: cause(),
            },
        );
        assert_eq!(err.status(), Some(412));

        let err = StorageError::from_backend(
            "k",
            object_store::Error::AlreadyExists {
                path: "k".into(),
                source: cause(),
            },
        );
        assert_eq!(err.status(), Some(409));

        let err = StorageError::from_backend("k", object_store::Error::NotImplemented);
        assert_eq!(err.status(), Some(501));
    }

    #[test]
    fn test_generic_error_has_no_status_even_if_message_mentions_one() {
        let err = StorageError::from_backend(
            "2025/01/01/KTLX/",
            object_store::Error::Generic {
                store: "S3",
                source: "Client error with status 403 Forbidden".into(),
            },
        );
        match &err {
            StorageError::Backend {
                status, message, ..
            } => {
                assert_eq!(*status, None);
                assert!(message.contains("403"));
            }
            other => panic!("expected Backend, got {other:?}"),
        }
    }

    #[test]
    fn test_not_found_variant() {
        let err = StorageError::from_backend(
            "missing",
            object_store::Error::NotFound {
                path: "missing".into(),
                source: cause(),
            },
        );
        assert!(matches!(err, StorageError::NotFound(ref p) if p == "missing"));
        assert_eq!(err.status(), Some(404));
    }
}
