//! Module `queue` implement the task queue serializing view operations.
//!
//! One process hosts one queue, started on first use, with a single
//! worker thread draining tasks in submission order. Updates, queries and
//! index removal all travel through it, so a reader can never observe a
//! half-written index batch, whichever index it targets. Submission is
//! non-blocking, completion comes back on a per-task reply channel, and
//! in-flight tasks always run to completion, there is no cancellation.

use lazy_static::lazy_static;
use parking_lot::Mutex;

use std::{sync::mpsc, thread};

use crate::{Error, Result};

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

lazy_static! {
    static ref TASK_QUEUE: TaskQueue = TaskQueue::start();
}

/// Handle to the process wide task queue.
pub(crate) fn task_queue() -> &'static TaskQueue {
    &TASK_QUEUE
}

pub(crate) struct TaskQueue {
    tx: Mutex<mpsc::Sender<Task>>,
}

impl TaskQueue {
    // the worker thread lives for the rest of the process, the global
    // queue is never dropped, so its handle is not retained.
    fn start() -> TaskQueue {
        let (tx, rx) = mpsc::channel::<Task>();
        thread::spawn(move || {
            for task in rx.iter() {
                task()
            }
        });

        TaskQueue { tx: Mutex::new(tx) }
    }

    /// Submit a task and return immediately.
    pub(crate) fn post(&self, task: Task) -> Result<()> {
        let tx = self.tx.lock();
        err_at!(IPCFail, tx.send(task))
    }

    /// Submit a job and wait for its result.
    pub(crate) fn request<T, F>(&self, name: &str, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.post(Box::new(move || {
            tx.send(job()).ok();
        }))?;
        err_at!(IPCFail, rx.recv(), "task {:?}", name)?
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
