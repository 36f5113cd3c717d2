//! Foundation types for the arca persistence core.
//!
//! This crate provides the identifier, digest, and metadata types used
//! throughout arca. Every other arca crate depends on `arca-types`.
//!
//! # Key Types
//!
//! - [`ResourceId`] — Logical resource identifier with optional hierarchy
//! - [`OcflObjectId`] — Identifier of an OCFL object on storage
//! - [`VersionId`] — OCFL version label (`v1`, `v2`, ...)
//! - [`SessionId`] — Transaction id of a read-write storage session
//! - [`InteractionModel`] — How a resource behaves (container vs. binary)
//! - [`ContentDigest`] — Content digest with its algorithm
//! - [`ResourceHeaders`] — Sidecar metadata persisted next to each resource

pub mod digest;
pub mod error;
pub mod headers;
pub mod model;
pub mod object;
pub mod resource;
pub mod session;

pub use digest::{ContentDigest, DigestAlgorithm};
pub use error::TypeError;
pub use headers::ResourceHeaders;
pub use model::{InteractionModel, ServerManagedPropsMode};
pub use object::{OcflObjectId, VersionId};
pub use resource::ResourceId;
pub use session::SessionId;
