// The thread-and-connection runtime: per-worker contexts with cooperative
// suspend/wake, the bounded request-worker pool, and the fixed daemons
// (deadlock scan, checkpoint, page flush, log flush). A worker runs one
// request start to finish; the only suspension points are the blocking seams
// (locks, pages, queues) and a context's own condition variable.

mod context;
mod daemon;
mod pool;

pub use context::{
    BoundInfo, ResumeReason, ScratchHeap, SuspendCause, ThreadContext, ThreadKind, ThreadStatus,
};
pub use daemon::Daemons;
pub use pool::WorkerPool;

/// Wake-the-workers capability, for callers (the HA machine) that must not
/// care what job type a pool carries.
pub trait WorkerHerd: Send + Sync {
    fn start_all_workers(&self) -> usize;
}

impl<J: Send + 'static> WorkerHerd for WorkerPool<J> {
    fn start_all_workers(&self) -> usize {
        self.start_all()
    }
}

#[cfg(test)]
mod test;
