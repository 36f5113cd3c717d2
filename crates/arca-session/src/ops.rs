//! Typed resource operations and their factories.
//!
//! Every mutation of the repository is expressed as one
//! [`ResourceOperation`] value and routed to the single persister that
//! stages it. The enum is the dispatch key: there is no runtime inspection
//! beyond matching the variant.

use chrono::{DateTime, Utc};

use arca_types::{ContentDigest, InteractionModel, ResourceId, ServerManagedPropsMode};

/// One logical mutation of the repository, staged via
/// [`crate::StorageSession::persist`].
#[derive(Clone, Debug)]
pub enum ResourceOperation {
    CreateRdfSource {
        rid: ResourceId,
        parent: ResourceId,
        interaction_model: InteractionModel,
        archival_group: bool,
        server_managed_props: ServerManagedPropsMode,
        triples: Vec<u8>,
        /// Caller-supplied creation time, honored in `Relaxed` mode only.
        created: Option<DateTime<Utc>>,
    },
    UpdateRdfSource {
        rid: ResourceId,
        server_managed_props: ServerManagedPropsMode,
        triples: Vec<u8>,
        /// Caller-supplied modification time, honored in `Relaxed` mode only.
        modified: Option<DateTime<Utc>>,
    },
    CreateNonRdfSource {
        rid: ResourceId,
        parent: ResourceId,
        content: Vec<u8>,
        mime_type: Option<String>,
        filename: Option<String>,
        /// Digests the payload must match; validated at persist time.
        expected_digests: Vec<ContentDigest>,
    },
    UpdateNonRdfSource {
        rid: ResourceId,
        content: Vec<u8>,
        mime_type: Option<String>,
        filename: Option<String>,
        expected_digests: Vec<ContentDigest>,
    },
    DeleteResource {
        rid: ResourceId,
    },
    PurgeResource {
        rid: ResourceId,
    },
    CreateVersion {
        rid: ResourceId,
    },
}

impl ResourceOperation {
    /// The resource this operation targets.
    pub fn rid(&self) -> &ResourceId {
        match self {
            Self::CreateRdfSource { rid, .. }
            | Self::UpdateRdfSource { rid, .. }
            | Self::CreateNonRdfSource { rid, .. }
            | Self::UpdateNonRdfSource { rid, .. }
            | Self::DeleteResource { rid }
            | Self::PurgeResource { rid }
            | Self::CreateVersion { rid } => rid,
        }
    }

    /// The operation kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateRdfSource { .. } => "create-rdf-source",
            Self::UpdateRdfSource { .. } => "update-rdf-source",
            Self::CreateNonRdfSource { .. } => "create-non-rdf-source",
            Self::UpdateNonRdfSource { .. } => "update-non-rdf-source",
            Self::DeleteResource { .. } => "delete-resource",
            Self::PurgeResource { .. } => "purge-resource",
            Self::CreateVersion { .. } => "create-version",
        }
    }

    /// Start building a create-RDF-source operation.
    pub fn create_rdf(rid: ResourceId) -> CreateRdfBuilder {
        CreateRdfBuilder {
            rid,
            parent: ResourceId::root(),
            interaction_model: InteractionModel::BasicContainer,
            archival_group: false,
            server_managed_props: ServerManagedPropsMode::Strict,
            triples: Vec::new(),
            created: None,
        }
    }

    /// Start building an update-RDF-source operation.
    pub fn update_rdf(rid: ResourceId) -> UpdateRdfBuilder {
        UpdateRdfBuilder {
            rid,
            server_managed_props: ServerManagedPropsMode::Strict,
            triples: Vec::new(),
            modified: None,
        }
    }

    /// Start building a create-non-RDF-source operation.
    pub fn create_binary(rid: ResourceId, content: Vec<u8>) -> CreateBinaryBuilder {
        CreateBinaryBuilder {
            rid,
            parent: ResourceId::root(),
            content,
            mime_type: None,
            filename: None,
            expected_digests: Vec::new(),
        }
    }

    /// Start building an update-non-RDF-source operation.
    pub fn update_binary(rid: ResourceId, content: Vec<u8>) -> UpdateBinaryBuilder {
        UpdateBinaryBuilder {
            rid,
            content,
            mime_type: None,
            filename: None,
            expected_digests: Vec::new(),
        }
    }

    /// A delete operation.
    pub fn delete(rid: ResourceId) -> Self {
        Self::DeleteResource { rid }
    }

    /// A purge operation.
    pub fn purge(rid: ResourceId) -> Self {
        Self::PurgeResource { rid }
    }

    /// A create-version operation.
    pub fn create_version(rid: ResourceId) -> Self {
        Self::CreateVersion { rid }
    }
}

/// Builder for [`ResourceOperation::CreateRdfSource`].
#[derive(Clone, Debug)]
pub struct CreateRdfBuilder {
    rid: ResourceId,
    parent: ResourceId,
    interaction_model: InteractionModel,
    archival_group: bool,
    server_managed_props: ServerManagedPropsMode,
    triples: Vec<u8>,
    created: Option<DateTime<Utc>>,
}

impl CreateRdfBuilder {
    pub fn parent(mut self, parent: ResourceId) -> Self {
        self.parent = parent;
        self
    }

    pub fn interaction_model(mut self, model: InteractionModel) -> Self {
        self.interaction_model = model;
        self
    }

    pub fn archival_group(mut self, flag: bool) -> Self {
        self.archival_group = flag;
        self
    }

    pub fn server_managed_props(mut self, mode: ServerManagedPropsMode) -> Self {
        self.server_managed_props = mode;
        self
    }

    pub fn triples(mut self, triples: Vec<u8>) -> Self {
        self.triples = triples;
        self
    }

    pub fn created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn build(self) -> ResourceOperation {
        ResourceOperation::CreateRdfSource {
            rid: self.rid,
            parent: self.parent,
            interaction_model: self.interaction_model,
            archival_group: self.archival_group,
            server_managed_props: self.server_managed_props,
            triples: self.triples,
            created: self.created,
        }
    }
}

/// Builder for [`ResourceOperation::UpdateRdfSource`].
#[derive(Clone, Debug)]
pub struct UpdateRdfBuilder {
    rid: ResourceId,
    server_managed_props: ServerManagedPropsMode,
    triples: Vec<u8>,
    modified: Option<DateTime<Utc>>,
}

impl UpdateRdfBuilder {
    pub fn server_managed_props(mut self, mode: ServerManagedPropsMode) -> Self {
        self.server_managed_props = mode;
        self
    }

    pub fn triples(mut self, triples: Vec<u8>) -> Self {
        self.triples = triples;
        self
    }

    pub fn modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn build(self) -> ResourceOperation {
        ResourceOperation::UpdateRdfSource {
            rid: self.rid,
            server_managed_props: self.server_managed_props,
            triples: self.triples,
            modified: self.modified,
        }
    }
}

/// Builder for [`ResourceOperation::CreateNonRdfSource`].
#[derive(Clone, Debug)]
pub struct CreateBinaryBuilder {
    rid: ResourceId,
    parent: ResourceId,
    content: Vec<u8>,
    mime_type: Option<String>,
    filename: Option<String>,
    expected_digests: Vec<ContentDigest>,
}

impl CreateBinaryBuilder {
    pub fn parent(mut self, parent: ResourceId) -> Self {
        self.parent = parent;
        self
    }

    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn expect_digest(mut self, digest: ContentDigest) -> Self {
        self.expected_digests.push(digest);
        self
    }

    pub fn build(self) -> ResourceOperation {
        ResourceOperation::CreateNonRdfSource {
            rid: self.rid,
            parent: self.parent,
            content: self.content,
            mime_type: self.mime_type,
            filename: self.filename,
            expected_digests: self.expected_digests,
        }
    }
}

/// Builder for [`ResourceOperation::UpdateNonRdfSource`].
#[derive(Clone, Debug)]
pub struct UpdateBinaryBuilder {
    rid: ResourceId,
    content: Vec<u8>,
    mime_type: Option<String>,
    filename: Option<String>,
    expected_digests: Vec<ContentDigest>,
}

impl UpdateBinaryBuilder {
    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn expect_digest(mut self, digest: ContentDigest) -> Self {
        self.expected_digests.push(digest);
        self
    }

    pub fn build(self) -> ResourceOperation {
        ResourceOperation::UpdateNonRdfSource {
            rid: self.rid,
            content: self.content,
            mime_type: self.mime_type,
            filename: self.filename,
            expected_digests: self.expected_digests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rdf_builder_defaults() {
        let rid = ResourceId::new("res").unwrap();
        let op = ResourceOperation::create_rdf(rid.clone()).build();

        match &op {
            ResourceOperation::CreateRdfSource {
                parent,
                interaction_model,
                archival_group,
                server_managed_props,
                ..
            } => {
                assert!(parent.is_root());
                assert_eq!(*interaction_model, InteractionModel::BasicContainer);
                assert!(!archival_group);
                assert_eq!(*server_managed_props, ServerManagedPropsMode::Strict);
            }
            other => panic!("unexpected operation: {other:?}"),
        }
        assert_eq!(op.rid(), &rid);
        assert_eq!(op.kind(), "create-rdf-source");
    }

    #[test]
    fn builder_overrides() {
        let group = ResourceId::new("group").unwrap();
        let child = group.resolve("member").unwrap();
        let op = ResourceOperation::create_rdf(child)
            .parent(group.clone())
            .archival_group(false)
            .server_managed_props(ServerManagedPropsMode::Relaxed)
            .triples(b"<a> <b> <c> .".to_vec())
            .build();

        match op {
            ResourceOperation::CreateRdfSource { parent, triples, .. } => {
                assert_eq!(parent, group);
                assert_eq!(triples, b"<a> <b> <c> .");
            }
            other => panic!("unexpected operation: {other:?}"),
        }
    }

    #[test]
    fn simple_factories() {
        let rid = ResourceId::new("res").unwrap();
        assert_eq!(ResourceOperation::delete(rid.clone()).kind(), "delete-resource");
        assert_eq!(ResourceOperation::purge(rid.clone()).kind(), "purge-resource");
        assert_eq!(
            ResourceOperation::create_version(rid).kind(),
            "create-version"
        );
    }
}
