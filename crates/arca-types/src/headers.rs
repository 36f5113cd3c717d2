//! Resource header sidecars.
//!
//! Every resource body on storage has a sibling sidecar file holding its
//! metadata: interaction model, parentage, timestamps, and (for binaries)
//! content description. Sidecars are versioned members of the OCFL object,
//! so historical header states remain readable alongside historical bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;
use crate::model::InteractionModel;
use crate::resource::ResourceId;

/// Sidecar metadata for one resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceHeaders {
    /// The resource this sidecar describes.
    pub id: ResourceId,
    /// Parent resource id (the repository root for top-level resources).
    pub parent: ResourceId,
    /// Interaction model of the resource.
    pub interaction_model: InteractionModel,
    /// Whether this resource is an archival group root.
    pub archival_group: bool,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Last-modified timestamp.
    pub modified: DateTime<Utc>,
    /// Content size in bytes (binaries; containers record the body size).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_size: Option<u64>,
    /// MIME type (binaries only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
    /// Original filename (binaries only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    /// Content digests (binaries only).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub digests: Vec<ContentDigest>,
    /// Set when the resource has been deleted; the sidecar then acts as a
    /// tombstone while historical versions stay readable.
    #[serde(default)]
    pub deleted: bool,
}

impl ResourceHeaders {
    /// Headers for a new container resource.
    pub fn container(
        id: ResourceId,
        parent: ResourceId,
        interaction_model: InteractionModel,
        archival_group: bool,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            parent,
            interaction_model,
            archival_group,
            created,
            modified: created,
            content_size: None,
            mime_type: None,
            filename: None,
            digests: Vec::new(),
            deleted: false,
        }
    }

    /// Headers for a new binary resource.
    #[allow(clippy::too_many_arguments)]
    pub fn binary(
        id: ResourceId,
        parent: ResourceId,
        created: DateTime<Utc>,
        content_size: u64,
        mime_type: Option<String>,
        filename: Option<String>,
        digests: Vec<ContentDigest>,
    ) -> Self {
        Self {
            id,
            parent,
            interaction_model: InteractionModel::NonRdfSource,
            archival_group: false,
            created,
            modified: created,
            content_size: Some(content_size),
            mime_type,
            filename,
            digests,
            deleted: false,
        }
    }

    /// Record a modification timestamp.
    pub fn touch(&mut self, modified: DateTime<Utc>) {
        self.modified = modified;
    }

    /// Turn these headers into a tombstone.
    pub fn mark_deleted(&mut self, when: DateTime<Utc>) {
        self.deleted = true;
        self.modified = when;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResourceHeaders {
        ResourceHeaders::container(
            ResourceId::new("group").unwrap(),
            ResourceId::root(),
            InteractionModel::BasicContainer,
            true,
            Utc::now(),
        )
    }

    #[test]
    fn container_headers() {
        let h = sample();
        assert!(h.archival_group);
        assert!(h.interaction_model.is_rdf());
        assert_eq!(h.created, h.modified);
        assert!(!h.deleted);
    }

    #[test]
    fn json_round_trip() {
        let h = sample();
        let json = serde_json::to_string_pretty(&h).unwrap();
        let back: ResourceHeaders = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
        // Binary-only fields are omitted for containers.
        assert!(!json.contains("mime_type"));
    }

    #[test]
    fn tombstone() {
        let mut h = sample();
        let later = h.created + chrono::Duration::seconds(5);
        h.mark_deleted(later);
        assert!(h.deleted);
        assert_eq!(h.modified, later);
    }

    #[test]
    fn binary_headers_carry_content_description() {
        use crate::digest::{ContentDigest, DigestAlgorithm};

        let digest = ContentDigest::compute(DigestAlgorithm::Sha512, b"payload");
        let h = ResourceHeaders::binary(
            ResourceId::new("file").unwrap(),
            ResourceId::root(),
            Utc::now(),
            7,
            Some("text/plain".into()),
            Some("notes.txt".into()),
            vec![digest.clone()],
        );
        assert_eq!(h.interaction_model, InteractionModel::NonRdfSource);
        assert_eq!(h.content_size, Some(7));
        assert_eq!(h.digests, vec![digest]);
    }
}
