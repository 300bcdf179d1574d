//! Cancellable timed tasks owned by a room.
//!
//! The room polls [`Scheduler::take_due`] from its tick, so every timer fires
//! on the room's own logical thread and dies with the room.

use arena_shared::SessionId;
use std::collections::BTreeMap;

pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomTask {
    /// End of the pre-match countdown.
    CountdownGo,
    /// Level-up offer deadline; picks the first option.
    AutoPick { session: SessionId, offer_id: u64 },
    /// Tear the room down after the match ended.
    Dispose,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: TaskId,
    tasks: BTreeMap<TaskId, (u64, RoomTask)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_at: u64, task: RoomTask) -> TaskId {
        self.next_id += 1;
        let id = self.next_id;
        self.tasks.insert(id, (due_at, task));
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.tasks.remove(&id).is_some()
    }

    /// Cancels every task matching `predicate`, returning how many went.
    pub fn cancel_where(&mut self, predicate: impl Fn(&RoomTask) -> bool) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, (_, task)| !predicate(task));
        before - self.tasks.len()
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    /// Removes and returns the tasks due at `now`, earliest first.
    pub fn take_due(&mut self, now: u64) -> Vec<(TaskId, RoomTask)> {
        let mut due: Vec<(u64, TaskId)> = self
            .tasks
            .iter()
            .filter(|(_, (at, _))| *at <= now)
            .map(|(id, (at, _))| (*at, *id))
            .collect();
        due.sort();
        due.into_iter()
            .filter_map(|(_, id)| self.tasks.remove(&id).map(|(_, task)| (id, task)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
