//! The resource-to-object index for the arca persistence core.
//!
//! Every logical resource maps to the OCFL object that stores it and to the
//! root resource within that object. For a resource outside any archival
//! group the mapping is identity; for archival-group members, every
//! descendant maps to the group root's object.
//!
//! The index is shared process-wide and participates in the storage
//! session's commit: mutations are staged in a per-session delta and become
//! visible to other sessions only when the session commits.
//!
//! # Implementations
//!
//! - [`MemoryResourceIndex`] -- `HashMap`-based, for tests and embedding
//! - [`FsResourceIndex`] -- JSON file rewritten atomically on every commit;
//!   survives restarts

mod delta;
pub mod error;
pub mod fs;
pub mod mapping;
pub mod memory;
pub mod traits;

pub use error::{IndexError, IndexResult};
pub use fs::FsResourceIndex;
pub use mapping::OcflMapping;
pub use memory::MemoryResourceIndex;
pub use traits::ResourceIndex;
