//! Profile Registry and Task Table (`spec.md` §4.G, §3 Task State).
//!
//! Keyed maps from `ProfileKey`/`tid` to their mutable state, implemented
//! with `dashmap::DashMap` the way `cognitod::context::ContextStore` keeps
//! its live-process map — except sharded instead of behind one `Mutex`, so
//! calls against distinct profiles (or distinct tasks) never contend with
//! each other. `DashMap::get_mut` on a single key gives the one-owner
//! critical section `spec.md` §5 asks for: holding the guard is holding
//! that profile's (or task's) exclusive write access.

use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use ebph_common::ProfileKey;

use crate::profile::Profile;
use crate::task::TaskState;

/// `profile_key → Profile`. New keys are never created implicitly by a
/// lookup; callers must go through [`ProfileRegistry::get_or_create`] and
/// observe whether the profile was freshly minted so they can emit
/// `new_profile`.
#[derive(Default)]
pub struct ProfileRegistry {
    profiles: DashMap<ProfileKey, Profile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn contains(&self, key: ProfileKey) -> bool {
        self.profiles.contains_key(&key)
    }

    /// Exclusive access to an existing profile. `None` if `key` has never
    /// been observed; per `spec.md` §7 this is the `UnknownProfile` case
    /// when the caller has no executable identity to create one with.
    pub fn get_mut(&self, key: ProfileKey) -> Option<RefMut<'_, ProfileKey, Profile>> {
        self.profiles.get_mut(&key)
    }

    /// Look up `key`, creating a fresh `TRAINING` profile (zeroed LPTs and
    /// counters) on first observation. Returns the profile handle plus
    /// whether it was just created, so the caller can emit `new_profile`
    /// exactly once per key (`spec.md` §4.G).
    pub fn get_or_create(
        &self,
        key: ProfileKey,
        exe_path: &str,
        call_space: usize,
    ) -> (RefMut<'_, ProfileKey, Profile>, bool) {
        let mut created = false;
        let entry = self.profiles.entry(key).or_insert_with(|| {
            created = true;
            Profile::new(key, exe_path, call_space)
        });
        if !created {
            // Advisory only (`spec.md` §3): pathname may legitimately drift
            // across bind mounts without the profile's identity changing.
            entry.exe_path.clear();
            entry.exe_path.push_str(exe_path);
        }
        (entry, created)
    }

    /// Remove a profile entirely, e.g. when the registry is cleared or an
    /// executable is uninstalled. Not exercised by the per-call hot path.
    pub fn remove(&self, key: ProfileKey) -> Option<Profile> {
        self.profiles.remove(&key).map(|(_, profile)| profile)
    }

    pub fn keys(&self) -> Vec<ProfileKey> {
        self.profiles.iter().map(|entry| *entry.key()).collect()
    }
}

/// `tid → TaskState`. Task States are created on task start (or fork) and
/// destroyed on task exit (`spec.md` §3 Lifecycles); the per-call path
/// additionally synthesizes one on first sight of an unrecognized `tid`
/// (`spec.md` §7 `UnknownTask`) rather than erroring, since the Event
/// Source's task-lifecycle callbacks are best-effort.
#[derive(Default)]
pub struct TaskTable {
    tasks: DashMap<u32, TaskState>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Exclusive access to a task, synthesizing a fresh one (all-`EMPTY`
    /// window) if `tid` hasn't been seen. Returns whether it was
    /// synthesized, for callers that want to log the `UnknownTask` path.
    pub fn get_or_synthesize(
        &self,
        tid: u32,
        pid: u32,
        profile_key: ProfileKey,
    ) -> (RefMut<'_, u32, TaskState>, bool) {
        let mut synthesized = false;
        let entry = self.tasks.entry(tid).or_insert_with(|| {
            synthesized = true;
            TaskState::new(tid, pid, profile_key)
        });
        (entry, synthesized)
    }

    /// Register a task created by fork, inheriting the parent's window.
    /// No-op (returns `false`) if the parent has already exited.
    pub fn fork(&self, parent_tid: u32, child_tid: u32, child_pid: u32) -> bool {
        let Some(parent) = self.tasks.get(&parent_tid) else {
            return false;
        };
        let child = TaskState::fork_from(&parent, child_tid, child_pid);
        drop(parent);
        self.tasks.insert(child_tid, child);
        true
    }

    /// Remove a task on exit. `spec.md` §3 Lifecycles: the profile
    /// outlives every Task State that referenced it.
    pub fn remove(&self, tid: u32) -> Option<TaskState> {
        self.tasks.remove(&tid).map(|(_, task)| task)
    }
}
