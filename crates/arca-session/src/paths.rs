//! Logical path conventions within an OCFL object.
//!
//! A resource with relative subpath `rel` (empty for the storage root)
//! stores up to three files:
//!
//! - `fcr-container.nt` -- the RDF body of a container
//! - `fcr-content` -- the payload of a binary
//! - `fcr-headers.json` -- the header sidecar, always present
//!
//! For archival-group members the files sit under the member's subpath,
//! e.g. `member/fcr-container.nt`.

use arca_index::OcflMapping;
use arca_types::{InteractionModel, ResourceId};

use crate::error::{SessionError, SessionResult};

const CONTAINER_BODY: &str = "fcr-container.nt";
const BINARY_BODY: &str = "fcr-content";
const SIDECAR: &str = "fcr-headers.json";

fn join(rel: &str, file: &str) -> String {
    if rel.is_empty() {
        file.to_string()
    } else {
        format!("{rel}/{file}")
    }
}

/// The RDF body path of a container resource.
pub fn container_body_subpath(rel: &str) -> String {
    join(rel, CONTAINER_BODY)
}

/// The payload path of a binary resource.
pub fn binary_body_subpath(rel: &str) -> String {
    join(rel, BINARY_BODY)
}

/// The body path for a resource of the given interaction model.
pub fn body_subpath(rel: &str, model: InteractionModel) -> String {
    if model.is_rdf() {
        container_body_subpath(rel)
    } else {
        binary_body_subpath(rel)
    }
}

/// The header sidecar path of a resource.
pub fn sidecar_subpath(rel: &str) -> String {
    join(rel, SIDECAR)
}

/// The resource's subpath within its storage object: empty for the storage
/// root, the slash-separated suffix for archival-group members.
pub fn relative_subpath(rid: &ResourceId, mapping: &OcflMapping) -> SessionResult<String> {
    rid.relative_to(&mapping.root_resource).ok_or_else(|| {
        SessionError::InvalidState(format!(
            "resource {rid} is not under its mapped root {}",
            mapping.root_resource
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_resource_paths() {
        assert_eq!(container_body_subpath(""), "fcr-container.nt");
        assert_eq!(binary_body_subpath(""), "fcr-content");
        assert_eq!(sidecar_subpath(""), "fcr-headers.json");
    }

    #[test]
    fn member_paths_sit_under_subpath() {
        assert_eq!(container_body_subpath("child"), "child/fcr-container.nt");
        assert_eq!(sidecar_subpath("a/b"), "a/b/fcr-headers.json");
        assert_eq!(
            body_subpath("bin", InteractionModel::NonRdfSource),
            "bin/fcr-content"
        );
    }
}
