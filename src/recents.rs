//! In-memory recent tasks list.
//!
//! Freezing keeps the order of the list stable while the recents surface is being interacted
//! with. The freeze is lifted by a timer on [`DelayQueue`] which is only ever rescheduled, so a
//! newer reset request replaces a pending one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::hierarchy::TaskId;
use crate::intent::Uid;
use crate::services::RecentTasks;
use crate::utils::delay_queue::DelayQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RecentsTimer {
    ResetFreeze,
}

#[derive(Debug)]
pub struct RecentTasksList {
    /// Most recent first.
    tasks: VecDeque<TaskId>,
    max_tasks: usize,
    recents_uid: Option<Uid>,
    freeze_timeout: Duration,
    frozen: bool,
    now: Duration,
    timers: DelayQueue<RecentsTimer>,
}

impl RecentTasksList {
    pub fn new(max_tasks: usize, freeze_timeout: Duration) -> Self {
        Self {
            tasks: VecDeque::new(),
            max_tasks: max_tasks.max(1),
            recents_uid: None,
            freeze_timeout,
            frozen: false,
            now: Duration::ZERO,
            timers: DelayQueue::new(),
        }
    }

    /// Sets the uid of the app hosting the recents surface.
    pub fn set_recents_uid(&mut self, uid: Option<Uid>) {
        self.recents_uid = uid;
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().copied()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Deadline of the pending freeze reset, if any.
    pub fn freeze_reset_deadline(&self) -> Option<Duration> {
        self.timers.deadline(&RecentsTimer::ResetFreeze)
    }

    /// Moves the clock forward and fires expired timers.
    pub fn advance(&mut self, now: Duration) {
        self.now = self.now.max(now);

        for timer in self.timers.poll_expired(self.now) {
            match timer {
                RecentsTimer::ResetFreeze => {
                    debug!("recent tasks reordering unfrozen");
                    self.frozen = false;
                }
            }
        }
    }
}

impl RecentTasks for RecentTasksList {
    fn is_caller_recents(&self, uid: Uid) -> bool {
        self.recents_uid == Some(uid)
    }

    fn add(&mut self, task: TaskId) {
        if let Some(idx) = self.tasks.iter().position(|&t| t == task) {
            if self.frozen {
                trace!("recents frozen, keeping {task} in place");
                return;
            }
            self.tasks.remove(idx);
        }

        self.tasks.push_front(task);
        self.tasks.truncate(self.max_tasks);
    }

    fn set_freeze_task_list_reordering(&mut self) {
        self.frozen = true;
        self.timers.cancel(&RecentsTimer::ResetFreeze);
    }

    fn is_freeze_task_list_reordering_set(&self) -> bool {
        self.frozen
    }

    fn reset_freeze_task_list_reordering_on_timeout(&mut self) {
        let deadline = self.now + self.freeze_timeout;
        if let Some(old) = self.timers.schedule(RecentsTimer::ResetFreeze, deadline) {
            trace!("replacing freeze reset at {old:?} with {deadline:?}");
        }
    }
}

impl RecentTasks for Arc<Mutex<RecentTasksList>> {
    fn is_caller_recents(&self, uid: Uid) -> bool {
        self.lock().is_caller_recents(uid)
    }

    fn add(&mut self, task: TaskId) {
        self.lock().add(task);
    }

    fn set_freeze_task_list_reordering(&mut self) {
        self.lock().set_freeze_task_list_reordering();
    }

    fn is_freeze_task_list_reordering_set(&self) -> bool {
        self.lock().is_freeze_task_list_reordering_set()
    }

    fn reset_freeze_task_list_reordering_on_timeout(&mut self) {
        self.lock().reset_freeze_task_list_reordering_on_timeout();
    }
}
