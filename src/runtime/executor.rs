//! Single-threaded cooperative executor.
//!
//! The executor owns every spawned task and polls exactly one at a time.
//! Control transfers only at explicit suspension points: a task runs until
//! it returns `Poll::Pending` (parked in a bus wait queue, or yielding), and
//! resumes when some other task's wake reaches the ready queue. Scheduling
//! is strictly FIFO, so wake order is execution order.
//!
//! The ready queue sits behind `Arc<Mutex<..>>` only because
//! `std::task::Waker` demands `Send + Sync`; nothing in this crate ever
//! contends for the lock from a second thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use super::config::RuntimeConfig;
use super::scheduler::Scheduler;
use super::TaskId;
use crate::util::Arena;

type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

/// The cooperative single-threaded runtime.
#[derive(Default)]
pub struct Runtime {
    tasks: Arena<TaskFuture>,
    scheduler: Arc<Mutex<Scheduler>>,
    config: RuntimeConfig,
    steps: u64,
}

impl Runtime {
    /// Creates a runtime with the given configuration.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            tasks: Arena::new(),
            scheduler: Arc::new(Mutex::new(Scheduler::new())),
            config,
            steps: 0,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of steps executed so far.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Number of spawned tasks that have not yet completed.
    ///
    /// A non-zero count with a quiescent runtime means those tasks are
    /// suspended waiting for a wake that has not arrived.
    #[must_use]
    pub const fn live_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task is ready to run.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.scheduler.lock().expect("scheduler lock poisoned").is_empty()
    }

    /// Stores a future as a task and schedules it to run.
    pub fn spawn(&mut self, future: impl Future<Output = ()> + 'static) -> TaskId {
        let task = TaskId::from_arena(self.tasks.insert(Box::pin(future)));
        self.scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .schedule(task);
        tracing::trace!(task = %task, "task spawned");
        task
    }

    /// Polls the next ready task once. Returns false when none is ready.
    pub fn step(&mut self) -> bool {
        let Some(task) = self
            .scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .pop()
        else {
            return false;
        };

        // A waker can outlive its task; a wake delivered after completion
        // schedules a dead id, which the arena generation filters out here.
        let Some(future) = self.tasks.get_mut(task.arena_index()) else {
            return true;
        };
        self.steps += 1;

        let waker = Waker::from(Arc::new(TaskWaker {
            task,
            scheduler: Arc::clone(&self.scheduler),
        }));
        let mut cx = Context::from_waker(&waker);

        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                self.tasks.remove(task.arena_index());
                tracing::trace!(task = %task, "task completed");
            }
            Poll::Pending => {}
        }
        true
    }

    /// Runs ready tasks until none is left or the step cap is hit.
    ///
    /// Returns the number of steps executed by this call. Suspended tasks
    /// waiting for wakes that never come do not count as ready; use
    /// [`live_tasks`](Self::live_tasks) to detect them.
    pub fn run_until_quiescent(&mut self) -> u64 {
        let start = self.steps;
        loop {
            if let Some(max) = self.config.max_steps {
                if self.steps >= max {
                    tracing::debug!(steps = self.steps, "step cap reached");
                    break;
                }
            }
            if !self.step() {
                break;
            }
        }
        self.steps - start
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("live_tasks", &self.tasks.len())
            .field("steps", &self.steps)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct TaskWaker {
    task: TaskId,
    scheduler: Arc<Mutex<Scheduler>>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .schedule(self.task);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .schedule(self.task);
    }
}

/// Reschedules the current task to the back of the ready queue once.
///
/// The explicit cooperation point: every other ready task runs before the
/// yielding task resumes.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future of [`yield_now`].
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
