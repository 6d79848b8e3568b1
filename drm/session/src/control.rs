use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/**
    Global counter for control thread identities.
*/
static CONTROL_THREAD_COUNTER: AtomicU64 = AtomicU64::new(1);

type Task = Box<dyn FnOnce() + Send + 'static>;

/**
    Handle to the single thread that owns session state.

    Cloning yields another handle to the same thread. Work posted through any
    handle runs, in posting order, when the owner drives its [`ControlLoop`].
*/
#[derive(Clone)]
pub struct ControlThread {
    id: u64,
    tx: mpsc::UnboundedSender<Task>,
}

impl ControlThread {
    pub fn id(&self) -> u64 {
        self.id
    }

    /**
        Queue `task` on the control thread. Returns `false` if the loop
        has been dropped.
    */
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(task)).is_ok()
    }
}

impl PartialEq for ControlThread {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ControlThread {}

impl fmt::Debug for ControlThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ControlThread").field(&self.id).finish()
    }
}

/**
    Receiving end of a control thread's task queue.
*/
pub struct ControlLoop {
    id: u64,
    rx: mpsc::UnboundedReceiver<Task>,
}

/**
    Create a new control thread identity and the loop that services it.
*/
pub fn control_thread() -> (ControlThread, ControlLoop) {
    let id = CONTROL_THREAD_COUNTER.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlThread { id, tx }, ControlLoop { id, rx })
}

impl ControlLoop {
    pub fn id(&self) -> u64 {
        self.id
    }

    /**
        Run queued tasks, including ones they post, until the queue is
        empty. Returns the number of tasks run.
    */
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /**
        Block until one task is available and run it. Returns `false` once
        every [`ControlThread`] handle has been dropped.

        Must not be called from within an async runtime.
    */
    pub fn run_one(&mut self) -> bool {
        match self.rx.blocking_recv() {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /**
        Run tasks until every handle is dropped.
    */
    pub fn run(&mut self) {
        while self.run_one() {}
    }
}
