//! Process-wide set of projects currently claimed by a worker.

use std::collections::HashSet;
use std::sync::Mutex;

use tagbuffer_core::ProjectId;

/// Thread-safe set of [`ProjectId`]s that must not be handed out.
///
/// One instance is shared by every worker of a pool and injected into the
/// [`Grouper`](crate::grouper::Grouper). A project is a member from the moment
/// a group for it is extracted until the matching release.
#[derive(Debug, Default)]
pub struct AvoidSet {
    projects: Mutex<HashSet<ProjectId>>,
}

impl AvoidSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a project. Returns `false` if it was already claimed.
    pub fn insert(&self, project_id: ProjectId) -> bool {
        self.projects
            .lock()
            .expect("avoid set lock poisoned")
            .insert(project_id)
    }

    /// Release a project. Returns `false` if it was not claimed.
    pub fn remove(&self, project_id: &ProjectId) -> bool {
        self.projects
            .lock()
            .expect("avoid set lock poisoned")
            .remove(project_id)
    }

    pub fn contains(&self, project_id: &ProjectId) -> bool {
        self.projects
            .lock()
            .expect("avoid set lock poisoned")
            .contains(project_id)
    }

    pub fn len(&self) -> usize {
        self.projects.lock().expect("avoid set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the currently claimed projects.
    pub fn snapshot(&self) -> Vec<ProjectId> {
        self.projects
            .lock()
            .expect("avoid set lock poisoned")
            .iter()
            .copied()
            .collect()
    }
}
