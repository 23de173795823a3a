//! Pending-key index grouped by project and asset.
//!
//! Producers [`add`](Grouper::add) keys as files land in the buffer. Workers
//! [`extract`](Grouper::extract) one whole `(project, asset)` group at a time
//! and [`release_project`](Grouper::release_project) when they are done with it.
//! While a project is claimed no other group of that project is handed out,
//! even groups for a different asset.

use std::sync::{Arc, Mutex};

use indexmap::{IndexMap, IndexSet};
use tagbuffer_core::{AssetId, BufferKey, ProjectId};
use tracing::debug;

use crate::avoid::AvoidSet;

/// Keys for one `(project, asset)` pair handed out by a single extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub project_id: ProjectId,
    pub asset_id: AssetId,
    pub keys: Vec<BufferKey>,
}

impl Group {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

type GroupId = (ProjectId, AssetId);

/// In-memory index over pending buffer keys.
///
/// All operations are safe to call from any thread. The scan-and-remove in
/// `extract` and the project claim happen under one lock, so a key has at most
/// one owner and a project at most one worker.
#[derive(Debug)]
pub struct Grouper {
    pending: Mutex<IndexMap<GroupId, IndexSet<BufferKey>>>,
    avoid: Arc<AvoidSet>,
}

impl Grouper {
    pub fn new(avoid: Arc<AvoidSet>) -> Self {
        Self {
            pending: Mutex::new(IndexMap::new()),
            avoid,
        }
    }

    /// The avoid set this grouper claims projects in.
    pub fn avoid_set(&self) -> &Arc<AvoidSet> {
        &self.avoid
    }

    /// Queue a key. Adding a key that is already pending is a no-op.
    ///
    /// Returns `true` if the key was newly queued.
    pub fn add(&self, key: BufferKey) -> bool {
        let mut pending = self.pending.lock().expect("grouper lock poisoned");
        pending
            .entry((key.project_id, key.asset_id))
            .or_default()
            .insert(key)
    }

    /// Hand out every pending key of one group whose project is not claimed.
    ///
    /// Groups are considered oldest first. The chosen project is claimed in the
    /// avoid set before this returns; the caller owns the claim and must call
    /// [`release_project`](Self::release_project) exactly once.
    pub fn extract(&self) -> Option<Group> {
        let mut pending = self.pending.lock().expect("grouper lock poisoned");

        let index = pending.iter().position(|((project_id, _), keys)| {
            !keys.is_empty() && self.avoid.insert(*project_id)
        })?;

        let ((project_id, asset_id), keys) = pending.shift_remove_index(index)?;
        let keys: Vec<BufferKey> = keys.into_iter().collect();

        debug!(%project_id, %asset_id, keys = keys.len(), "extracted group");

        Some(Group {
            project_id,
            asset_id,
            keys,
        })
    }

    /// Make a project eligible for extraction again.
    ///
    /// Returns `false` (and does nothing) if the project was not claimed.
    pub fn release_project(&self, project_id: ProjectId) -> bool {
        let released = self.avoid.remove(&project_id);
        if released {
            debug!(%project_id, "released project");
        }
        released
    }

    /// Total number of pending keys across all groups.
    pub fn pending_keys(&self) -> usize {
        self.pending
            .lock()
            .expect("grouper lock poisoned")
            .values()
            .map(IndexSet::len)
            .sum()
    }

    /// Number of non-empty pending groups.
    pub fn pending_groups(&self) -> usize {
        self.pending
            .lock()
            .expect("grouper lock poisoned")
            .values()
            .filter(|keys| !keys.is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_keys() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn grouper() -> Grouper {
        Grouper::new(Arc::new(AvoidSet::new()))
    }

    fn key(project: ProjectId, asset: AssetId, name: &str) -> BufferKey {
        BufferKey::new(project, asset, name)
    }

    #[test]
    fn extract_returns_all_keys_of_a_group() {
        let g = grouper();
        let (p, a) = (Uuid::new_v4(), Uuid::new_v4());
        let added: HashSet<BufferKey> = (0..5)
            .map(|i| key(p, a, &format!("f{i}.tag")))
            .inspect(|k| {
                g.add(k.clone());
            })
            .collect();

        let group = g.extract().expect("group should be available");
        assert_eq!(group.project_id, p);
        assert_eq!(group.asset_id, a);
        assert_eq!(group.len(), 5);

        let returned: HashSet<BufferKey> = group.keys.into_iter().collect();
        assert_eq!(returned, added);
        assert_eq!(g.pending_keys(), 0);
        assert!(g.is_empty());
    }

    #[test]
    fn duplicate_add_is_noop() {
        let g = grouper();
        let k = key(Uuid::new_v4(), Uuid::new_v4(), "dup.tag");

        assert!(g.add(k.clone()));
        assert!(!g.add(k.clone()));
        assert_eq!(g.pending_keys(), 1);

        let group = g.extract().unwrap();
        assert_eq!(group.keys, vec![k]);
    }

    #[test]
    fn extract_empty_returns_none() {
        let g = grouper();
        assert!(g.extract().is_none());
        assert!(g.avoid_set().is_empty());
    }

    #[test]
    fn extract_claims_project() {
        let g = grouper();
        let p = Uuid::new_v4();
        g.add(key(p, Uuid::new_v4(), "a.tag"));

        let group = g.extract().unwrap();
        assert!(g.avoid_set().contains(&group.project_id));
    }

    #[test]
    fn claimed_project_is_skipped_even_for_other_assets() {
        let g = grouper();
        let p = Uuid::new_v4();
        g.add(key(p, Uuid::new_v4(), "a1.tag"));
        g.add(key(p, Uuid::new_v4(), "a2.tag"));

        let first = g.extract().unwrap();
        assert_eq!(first.project_id, p);
        assert!(g.extract().is_none(), "second asset group of a claimed project must wait");
        assert_eq!(g.pending_groups(), 1);

        assert!(g.release_project(p));
        let second = g.extract().unwrap();
        assert_eq!(second.project_id, p);
        assert_ne!(second.asset_id, first.asset_id);
    }

    #[test]
    fn skips_avoided_project_and_picks_another() {
        let g = grouper();
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        g.add(key(p1, Uuid::new_v4(), "x.tag"));
        g.add(key(p2, Uuid::new_v4(), "y.tag"));

        g.avoid_set().insert(p1);
        let group = g.extract().unwrap();
        assert_eq!(group.project_id, p2);
        assert!(g.extract().is_none());
    }

    #[test]
    fn debug_output_lists_pending_keys() {
        let g = grouper();
        g.add(key(Uuid::new_v4(), Uuid::new_v4(), "visible.tag"));
        let rendered = format!("{g:?}");
        assert!(rendered.starts_with("Grouper"));
        assert!(rendered.contains("visible.tag"));
    }

    #[test]
    fn release_unclaimed_project_is_noop() {
        let g = grouper();
        assert!(!g.release_project(Uuid::new_v4()));
    }

    #[test]
    fn key_added_after_extract_forms_new_group() {
        let g = grouper();
        let (p, a) = (Uuid::new_v4(), Uuid::new_v4());
        g.add(key(p, a, "f1.tag"));
        let first = g.extract().unwrap();
        assert_eq!(first.len(), 1);

        g.add(key(p, a, "f2.tag"));
        assert_eq!(g.pending_keys(), 1);
        assert!(g.extract().is_none());

        g.release_project(p);
        let second = g.extract().unwrap();
        assert_eq!(second.keys, vec![key(p, a, "f2.tag")]);
    }

    #[test]
    fn concurrent_extract_never_shares_a_project() {
        let avoid = Arc::new(AvoidSet::new());
        let g = Arc::new(Grouper::new(avoid));
        let projects: Vec<ProjectId> = (0..4).map(|_| Uuid::new_v4()).collect();
        for (i, p) in projects.iter().enumerate() {
            for asset in 0..3 {
                g.add(key(*p, Uuid::from_u128(asset), &format!("{i}-{asset}.tag")));
            }
        }

        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let g = g.clone();
                let in_flight = in_flight.clone();
                std::thread::spawn(move || {
                    let mut taken = 0;
                    loop {
                        match g.extract() {
                            Some(group) => {
                                assert!(
                                    in_flight.lock().unwrap().insert(group.project_id),
                                    "project handed out twice"
                                );
                                taken += group.len();
                                std::thread::yield_now();
                                in_flight.lock().unwrap().remove(&group.project_id);
                                g.release_project(group.project_id);
                            }
                            None if g.is_empty() => break,
                            None => std::thread::yield_now(),
                        }
                    }
                    taken
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 12);
        assert!(g.is_empty());
        assert!(g.avoid_set().is_empty());
    }
}
