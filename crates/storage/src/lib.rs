//! Storage abstractions for the ingestion services.
//!
//! Wraps S3-compatible object storage for both the anonymous public
//! archives (NEXRAD Level II, GOES ABI, MRMS) and the credentialed derived bucket,
//! and owns the canonical key layouts.

pub mod error;
pub mod object_store;
pub mod paths;

pub use self::object_store::{ObjectInfo, ObjectStorage, ObjectStorageConfig, SourceArchiveConfig};
pub use error::{StorageError, StorageResult};
pub use paths::{SourcePath, StoragePath};
