//! Multi-consumer task queue for offloading parse work off the reactor.

use std::io;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

/// A unit of work. Implemented for free by any `FnOnce() + Send`.
pub trait Task: Send {
    fn run(self: Box<Self>);
}

impl<F: FnOnce() + Send> Task for F {
    fn run(self: Box<Self>) {
        (*self)()
    }
}

/// A FIFO of tasks consumed by a fixed set of worker threads.
///
/// `push` wakes one idle worker. Dropping the queue disconnects the channel;
/// workers finish the tasks already queued, then exit, and `Drop` joins
/// them. Tasks run to completion — there is no cancellation.
pub struct WorkQueue {
    tx: Option<Sender<Box<dyn Task>>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkQueue {
    pub fn new(threads: usize) -> io::Result<WorkQueue> {
        let (tx, rx) = crossbeam_channel::unbounded::<Box<dyn Task>>();
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx: Receiver<Box<dyn Task>> = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("netpool-worker-{i}"))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        task.run();
                    }
                })?;
            workers.push(handle);
        }
        Ok(WorkQueue {
            tx: Some(tx),
            workers,
        })
    }

    pub fn push(&self, task: Box<dyn Task>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(task);
        }
    }

    pub fn push_fn<F: FnOnce() + Send + 'static>(&self, f: F) {
        self.push(Box::new(f));
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.tx = None; // disconnect; workers drain and exit
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn tasks_run_to_completion() {
        let queue = WorkQueue::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            queue.push_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(queue); // drains, then joins
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn drop_with_no_tasks_joins_cleanly() {
        let queue = WorkQueue::new(2).unwrap();
        drop(queue);
    }

    #[test]
    fn single_worker_preserves_order() {
        let queue = WorkQueue::new(1).unwrap();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..10 {
            let log = log.clone();
            queue.push_fn(move || log.lock().unwrap().push(i));
        }
        drop(queue);
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }
}
