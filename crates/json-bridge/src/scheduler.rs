//! Single-threaded scheduler of cancelable delayed tasks.
//!
//! Time is logical: it only moves when the host calls [`Scheduler::advance`]
//! or [`Scheduler::run_until_idle`]. Tasks are ordered by `(deadline,
//! sequence)`, so tasks sharing a deadline run in scheduling order.
//!
//! A *cycle* runs every task that was due when it started. Tasks scheduled
//! while a cycle runs wait for the next cycle, even with a zero delay.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, debug_span, warn};

/// Handle of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId {
    deadline: Duration,
    seq: u64,
}

impl TimerId {
    /// Logical time at which the task becomes due.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

type Task = Box<dyn FnOnce()>;

struct SchedulerInner {
    now: Duration,
    next_seq: u64,
    queue: BTreeMap<TimerId, Task>,
    cycle_limit: usize,
}

/// Cheaply clonable handle; clones share one queue and one clock.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("now", &inner.now)
            .field("pending", &inner.queue.len())
            .field("cycle_limit", &inner.cycle_limit)
            .finish()
    }
}

impl Scheduler {
    pub const DEFAULT_CYCLE_LIMIT: usize = 1024;

    pub fn new() -> Self {
        Self::with_cycle_limit(Self::DEFAULT_CYCLE_LIMIT)
    }

    /// `limit` bounds the cycles run back-to-back at one instant, and the
    /// total cycles of one [`run_until_idle`](Self::run_until_idle).
    pub fn with_cycle_limit(limit: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                now: Duration::ZERO,
                next_seq: 0,
                queue: BTreeMap::new(),
                cycle_limit: limit.max(1),
            })),
        }
    }

    pub fn now(&self) -> Duration {
        self.inner.borrow().now
    }

    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let id = TimerId {
            deadline: inner.now + delay,
            seq: inner.next_seq,
        };
        inner.next_seq += 1;
        inner.queue.insert(id, Box::new(task));
        debug!(deadline_ms = id.deadline.as_millis() as u64, seq = id.seq, "task scheduled");
        id
    }

    /// Returns `true` if the task was still pending.
    pub fn cancel(&self, id: TimerId) -> bool {
        let task = self.inner.borrow_mut().queue.remove(&id);
        task.is_some()
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.inner.borrow().queue.contains_key(&id)
    }

    pub fn pending_tasks(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner.borrow().queue.keys().next().map(|id| id.deadline)
    }

    /// Drop every pending task without running it.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut self.inner.borrow_mut().queue);
        debug!(dropped = dropped.len(), "scheduler cleared");
    }

    /// Run one cycle at the current time. Returns how many tasks ran.
    pub fn run_cycle(&self) -> usize {
        let due: Vec<TimerId> = {
            let inner = self.inner.borrow();
            let (now, boundary) = (inner.now, inner.next_seq);
            inner
                .queue
                .keys()
                .take_while(|id| id.deadline <= now)
                .filter(|id| id.seq < boundary)
                .copied()
                .collect()
        };
        if due.is_empty() {
            return 0;
        }

        let span = debug_span!("scheduler.cycle", now_ms = self.now().as_millis() as u64, due = due.len());
        let _guard = span.enter();
        let mut ran = 0;
        for id in due {
            // An earlier task in this cycle may have cancelled this one.
            let task = self.inner.borrow_mut().queue.remove(&id);
            if let Some(task) = task {
                task();
                ran += 1;
            }
        }
        ran
    }

    /// Move the clock forward by `by`, running tasks as their deadlines pass.
    /// Returns how many tasks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;
        loop {
            ran += self.drain_now();
            match self.next_deadline() {
                Some(deadline) if deadline > self.now() && deadline <= target => {
                    self.inner.borrow_mut().now = deadline;
                }
                _ => break,
            }
        }
        self.inner.borrow_mut().now = target;
        ran + self.drain_now()
    }

    /// Run cycles, jumping the clock to each next deadline, until no task is
    /// pending or the cycle limit is reached. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        let limit = self.inner.borrow().cycle_limit;
        let mut ran = 0;
        for _ in 0..limit {
            let Some(deadline) = self.next_deadline() else {
                return ran;
            };
            {
                let mut inner = self.inner.borrow_mut();
                inner.now = inner.now.max(deadline);
            }
            ran += self.run_cycle();
        }
        if self.pending_tasks() > 0 {
            warn!(limit, pending = self.pending_tasks(), "run_until_idle hit the cycle limit");
        }
        ran
    }

    fn drain_now(&self) -> usize {
        let limit = self.inner.borrow().cycle_limit;
        let mut ran = 0;
        for _ in 0..limit {
            let n = self.run_cycle();
            if n == 0 {
                return ran;
            }
            ran += n;
        }
        warn!(limit, now_ms = self.now().as_millis() as u64, "cycle limit reached at one instant");
        ran
    }
}
