use std::any::Any;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

struct JobQueueInner<T> {
    jobs: VecDeque<T>,
    closed: bool,
}

/**
    Thread-safe unbounded FIFO feeding the session worker.

    Producers never block. Once closed, pending jobs are dropped and
    `pop` returns `None` right away.
*/
pub struct JobQueue<T> {
    inner: Mutex<JobQueueInner<T>>,
    not_empty: Condvar,
}

impl<T> JobQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(JobQueueInner {
                jobs: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /**
        Append a job. Returns false if the queue was closed.
    */
    pub fn push(&self, job: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.jobs.push_back(job);
        self.not_empty.notify_one();
        true
    }

    /**
        Take the next job, blocking while the queue is empty.
        Returns None once the queue is closed.
    */
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        while inner.jobs.is_empty() && !inner.closed {
            self.not_empty.wait(&mut inner);
        }
        if inner.closed {
            return None;
        }
        inner.jobs.pop_front()
    }

    /**
        Close the queue, dropping pending jobs and waking the consumer.
    */
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.jobs.clear();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().jobs.is_empty()
    }
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/**
    A named background thread draining a [`JobQueue`], one job at a time.
*/
pub struct Worker<T> {
    queue: Arc<JobQueue<T>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F>(name: &str, mut handler: F) -> io::Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let queue = Arc::new(JobQueue::new());
        let jobs = queue.clone();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                while let Some(job) = jobs.pop() {
                    handler(job);
                }
                trace!("worker queue closed");
            })?;
        debug!(name, "worker started");

        Ok(Self {
            queue,
            handle: Some(handle),
        })
    }

    pub fn push(&self, job: T) -> bool {
        self.queue.push(job)
    }

    pub fn is_running(&self) -> bool {
        !self.queue.is_closed() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|h| h.thread().id())
    }

    /**
        Stop the worker.

        Never waits for a job in progress: the thread is joined only if it
        has already exited, otherwise it is detached and ends after its
        current job.
    */
    pub fn stop(mut self) {
        self.queue.close();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.is_finished() && handle.thread().id() != thread::current().id() {
            if let Err(payload) = handle.join() {
                warn!(panic = %panic_message(payload.as_ref()), "worker thread panicked");
            }
        } else {
            trace!("detaching busy worker");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
