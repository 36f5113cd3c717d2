//! Per-session pending changes, shared by the index implementations.

use std::collections::{HashMap, HashSet};

use arca_types::ResourceId;

use crate::mapping::OcflMapping;

/// Staged index mutations for one session.
///
/// Within a delta, the most recent staging wins per resource: an `add`
/// cancels a prior `remove` of the same resource and vice versa.
#[derive(Debug, Default)]
pub(crate) struct Delta {
    adds: HashMap<ResourceId, OcflMapping>,
    removes: HashSet<ResourceId>,
    /// Storage roots whose entire mapping set is being removed (purges).
    root_removes: HashSet<ResourceId>,
}

impl Delta {
    pub fn add(&mut self, rid: ResourceId, mapping: OcflMapping) {
        self.removes.remove(&rid);
        self.adds.insert(rid, mapping);
    }

    pub fn remove(&mut self, rid: ResourceId) {
        self.adds.remove(&rid);
        self.removes.insert(rid);
    }

    pub fn remove_by_root(&mut self, root: ResourceId) {
        self.adds.retain(|_, m| m.root_resource != root);
        self.root_removes.insert(root);
    }

    /// Resolve `rid` through this delta: `Some(Some(..))` when the delta
    /// maps it, `Some(None)` when the delta removes it, `None` when the
    /// delta is silent and the committed map decides.
    pub fn resolve(
        &self,
        rid: &ResourceId,
        committed: &HashMap<ResourceId, OcflMapping>,
    ) -> Option<Option<OcflMapping>> {
        if let Some(mapping) = self.adds.get(rid) {
            return Some(Some(mapping.clone()));
        }
        if self.removes.contains(rid) {
            return Some(None);
        }
        if let Some(mapping) = committed.get(rid) {
            if self.root_removes.contains(&mapping.root_resource) {
                return Some(None);
            }
        }
        None
    }

    /// Fold this delta into the committed map.
    pub fn apply(self, committed: &mut HashMap<ResourceId, OcflMapping>) {
        for root in &self.root_removes {
            committed.retain(|_, m| m.root_resource != *root);
        }
        for rid in self.removes {
            committed.remove(&rid);
        }
        for (rid, mapping) in self.adds {
            committed.insert(rid, mapping);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_types::OcflObjectId;

    fn rid(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    #[test]
    fn add_then_remove_cancels() {
        let mut delta = Delta::default();
        let committed = HashMap::new();

        delta.add(rid("a"), OcflMapping::atomic(&rid("a")));
        delta.remove(rid("a"));
        assert_eq!(delta.resolve(&rid("a"), &committed), Some(None));

        delta.add(rid("a"), OcflMapping::atomic(&rid("a")));
        assert!(matches!(delta.resolve(&rid("a"), &committed), Some(Some(_))));
    }

    #[test]
    fn root_removal_hides_members() {
        let mut committed = HashMap::new();
        let group = rid("group");
        let member = rid("group/member");
        committed.insert(
            member.clone(),
            OcflMapping::in_group(OcflObjectId::from("group"), group.clone()),
        );
        committed.insert(group.clone(), OcflMapping::atomic(&group));

        let mut delta = Delta::default();
        delta.remove_by_root(group.clone());

        assert_eq!(delta.resolve(&member, &committed), Some(None));
        assert_eq!(delta.resolve(&group, &committed), Some(None));

        delta.apply(&mut committed);
        assert!(committed.is_empty());
    }
}
