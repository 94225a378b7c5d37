//! Provider adapter contract and registry for OmniDrive.
//!
//! An adapter translates the generic provider operations (quota, listing,
//! search, upload, download, delete, move, create-folder) into one
//! backend's wire protocol. The registry holds the set of active adapters
//! keyed by provider identifier, in insertion order.

mod adapter;
mod local;
mod memory;
mod registry;

pub use adapter::{ProviderAdapter, SearchOptions};
pub use local::LocalAdapter;
pub use memory::{Fault, MemoryAdapter};
pub use registry::ProviderRegistry;
