//! Common types and errors shared across OmniDrive crates.

mod error;
mod types;

pub use error::{Error, Result};
pub use types::{FileMetadata, ProviderId, Quota, Uploaded};
