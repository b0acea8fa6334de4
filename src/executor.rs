//! Executors decide *when* an armed flush runs.
//!
//! The scheduler never owns a thread or an event loop. When work is
//! scheduled it hands a flush task to an [`Executor`] through one of two
//! queues:
//!
//! - **Immediate**: zero-delay work that should run at the next tick
//!   boundary (used for [`Priority::Immediate`](crate::Priority::Immediate)).
//! - **Frame**: work batched onto the next animation-frame-equivalent tick
//!   (every other priority).
//!
//! Hosts plug their event loop in by implementing [`Executor`]. For tests
//! and for hosts that drive their own loop, [`ManualExecutor`] just queues
//! the tasks until it is told to run them.
//!
//! ## Usage
//!
//! ```ignore
//! let executor = ManualExecutor::new();
//! let engine = Engine::new(executor.clone());
//!
//! // ... render, call setters ...
//!
//! executor.run_immediate();   // next tick boundary
//! executor.run_frame();       // next frame
//! executor.run_until_idle();  // everything, including work queued meanwhile
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Host integration point for deferred work.
///
/// Implementations must not run the task synchronously inside the call:
/// the engine may call these from inside a render pass.
pub trait Executor: Send + Sync + 'static {
    /// Run `task` at the next tick boundary.
    fn defer_immediate(&self, task: Task);

    /// Run `task` on the next frame.
    fn defer_frame(&self, task: Task);
}

/// Queue lengths of a [`ManualExecutor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingTasks {
    /// Tasks waiting for the next tick boundary.
    pub immediate: usize,
    /// Tasks waiting for the next frame.
    pub frame: usize,
}

impl PendingTasks {
    /// True when both queues are empty.
    pub fn is_empty(&self) -> bool {
        self.immediate == 0 && self.frame == 0
    }
}

#[derive(Default)]
struct Queues {
    immediate: Mutex<VecDeque<Task>>,
    frame: Mutex<VecDeque<Task>>,
}

/// Executor that only runs tasks when asked to.
///
/// Cloning yields another handle to the same queues, so a test can keep one
/// handle while the engine owns the other.
#[derive(Clone, Default)]
pub struct ManualExecutor {
    queues: Arc<Queues>,
}

impl ManualExecutor {
    /// Create an executor with two empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current queue lengths.
    pub fn pending(&self) -> PendingTasks {
        PendingTasks {
            immediate: self.queues.immediate.lock().len(),
            frame: self.queues.frame.lock().len(),
        }
    }

    /// Run immediate tasks until the queue is empty.
    ///
    /// Tasks queued by running tasks are included. Returns the number run.
    pub fn run_immediate(&self) -> usize {
        let mut ran = 0;
        loop {
            // Lock is released before the task runs so it can queue more work
            let Some(task) = self.queues.immediate.lock().pop_front() else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Run one frame.
    ///
    /// Pending immediate work runs first, then every frame task that was
    /// queued when the frame started. Immediate work queued by a frame task
    /// runs before the next frame task. Frame tasks queued during the frame
    /// wait for the next one. Returns the number of tasks run.
    pub fn run_frame(&self) -> usize {
        let mut ran = self.run_immediate();
        let batch: Vec<Task> = self.queues.frame.lock().drain(..).collect();
        for task in batch {
            task();
            ran += 1;
            ran += self.run_immediate();
        }
        ran
    }

    /// Run frames until both queues are empty. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while !self.pending().is_empty() {
            ran += self.run_frame();
        }
        ran
    }
}

impl Executor for ManualExecutor {
    fn defer_immediate(&self, task: Task) {
        self.queues.immediate.lock().push_back(task);
    }

    fn defer_frame(&self, task: Task) {
        self.queues.frame.lock().push_back(task);
    }
}
