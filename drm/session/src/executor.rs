use std::io;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, trace};

/**
    A blocking unit of work, typically one license or provisioning exchange.
*/
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/**
    Runs key and provisioning requests away from the control thread.

    Jobs post their results back to the control thread themselves, so an
    executor only needs to run them, in submission order.
*/
pub trait RequestExecutor: Send + Sync {
    fn execute(&self, job: Job);
}

/**
    Runs each job immediately on the submitting thread.

    Results still reach sessions through the control thread queue, which
    keeps state changes off the submitting call stack. Useful for tests and
    for callbacks that never block.
*/
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl RequestExecutor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/**
    A dedicated worker thread that runs jobs one at a time.

    The thread exits once the worker is dropped and its queue drains.
*/
pub struct RequestWorker {
    tx: mpsc::UnboundedSender<Job>,
}

impl RequestWorker {
    pub fn spawn() -> io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        thread::Builder::new()
            .name("drm-requests".into())
            .spawn(move || {
                debug!("request worker started");
                while let Some(job) = rx.blocking_recv() {
                    trace!("running request job");
                    job();
                }
                debug!("request worker stopped");
            })?;
        Ok(Self { tx })
    }
}

impl RequestExecutor for RequestWorker {
    fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            debug!("request worker is gone, dropping job");
        }
    }
}
