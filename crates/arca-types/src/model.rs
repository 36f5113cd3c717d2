//! Interaction models and server-managed-property handling.

use serde::{Deserialize, Serialize};

/// How a resource behaves: the LDP-style interaction model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionModel {
    /// A plain container of triples.
    BasicContainer,
    /// A container that maintains membership triples on a target resource.
    DirectContainer,
    /// A container with indirection through inserted-content relations.
    IndirectContainer,
    /// A binary (non-RDF) resource with an opaque payload.
    NonRdfSource,
}

impl InteractionModel {
    /// Returns `true` for the container (RDF-bearing) models.
    pub fn is_rdf(&self) -> bool {
        !matches!(self, Self::NonRdfSource)
    }
}

/// Whether server-managed properties (timestamps, etc.) may be supplied by
/// the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerManagedPropsMode {
    /// Server-managed properties are stamped by the server; caller-supplied
    /// values are rejected.
    #[default]
    Strict,
    /// Caller-supplied values are accepted (e.g. for migrations).
    Relaxed,
}
