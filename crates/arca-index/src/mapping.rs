//! The resource -> OCFL object mapping record.

use serde::{Deserialize, Serialize};

use arca_types::{OcflObjectId, ResourceId};

/// Where a logical resource is stored: the OCFL object holding it and the
/// root resource of that object.
///
/// For an atomic resource `root_resource` is the resource itself and the
/// object id mirrors the resource id. For an archival-group member,
/// `root_resource` is the group root and every member shares the group's
/// object id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcflMapping {
    pub ocfl_object_id: OcflObjectId,
    pub root_resource: ResourceId,
}

impl OcflMapping {
    /// The identity mapping of a resource that is its own storage root.
    pub fn atomic(rid: &ResourceId) -> Self {
        Self {
            ocfl_object_id: OcflObjectId::from_resource(rid),
            root_resource: rid.clone(),
        }
    }

    /// A mapping into an archival group.
    pub fn in_group(ocfl_object_id: OcflObjectId, root: ResourceId) -> Self {
        Self {
            ocfl_object_id,
            root_resource: root,
        }
    }
}
