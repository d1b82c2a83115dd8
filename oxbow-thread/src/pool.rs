use crate::context::{ResumeReason, ThreadContext, ThreadKind, ThreadStatus};
use crossbeam_channel::{unbounded, Receiver, Sender};
use oxbow_base::{err, Result, SystemParams};
use oxbow_txn::{LockManager, TranIndex};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

enum PoolMsg<J> {
    Work(J),
    Shutdown,
}

/// A bounded set of request workers sharing one job queue. The job type is
/// the caller's; the pool only schedules. A worker binds a job, runs the
/// handler, then unbinds, resets its per-request heap and goes back to FREE.
pub struct WorkerPool<J> {
    contexts: Vec<Arc<ThreadContext>>,
    sender: Sender<PoolMsg<J>>,
    params: Arc<SystemParams>,
}

impl<J: Send + 'static> WorkerPool<J> {
    pub fn start(
        params: Arc<SystemParams>,
        handler: Arc<dyn Fn(&ThreadContext, J) + Send + Sync>,
    ) -> Arc<WorkerPool<J>> {
        let (sender, receiver) = unbounded::<PoolMsg<J>>();
        let mut contexts = Vec::with_capacity(params.workers);
        // index 0 is reserved for the system thread
        for i in 1..=params.workers {
            let ctx = Arc::new(ThreadContext::new(i, ThreadKind::Worker));
            contexts.push(ctx.clone());
            let receiver = receiver.clone();
            let handler = handler.clone();
            thread::spawn(move || worker_main(ctx, receiver, handler));
        }
        info!(target: "oxbow", "started {} request workers", params.workers);
        Arc::new(WorkerPool {
            contexts,
            sender,
            params,
        })
    }

    pub fn submit(&self, job: J) -> Result<()> {
        self.sender
            .send(PoolMsg::Work(job))
            .map_err(|_| err("job queue closed"))
    }

    pub fn contexts(&self) -> &[Arc<ThreadContext>] {
        &self.contexts
    }

    /// How many workers are currently executing for (tran, client). The
    /// drain path polls this to zero before freeing a connection.
    pub fn count_workers_for(&self, tran: TranIndex, client_id: i32) -> usize {
        self.contexts
            .iter()
            .filter(|c| c.is_working_for(tran, client_id))
            .count()
    }

    /// First suspended worker bound to `tran`, excluding `except`. The
    /// caller decides whether its wait cause permits waking it.
    pub fn find_waiter_for(
        &self,
        tran: TranIndex,
        except: usize,
    ) -> Option<Arc<ThreadContext>> {
        self.contexts
            .iter()
            .find(|c| {
                c.index() != except
                    && c.status() == ThreadStatus::Wait
                    && c.bound().tran == Some(tran)
            })
            .cloned()
    }

    /// HA promotion hook: resume whatever is resumable so a post-failover
    /// flood of work finds warm threads.
    pub fn start_all(&self) -> usize {
        let mut woken = 0;
        for ctx in &self.contexts {
            if ctx.wake_normal() {
                woken += 1;
            }
        }
        woken
    }

    /// Shutdown phase 1: mark every worker interrupted and shutting down,
    /// broadcast the job queue so dequeuers unblock, force lock waits to
    /// time out, then drain with a bounded retry. Exceeding the bound exits
    /// the process; a worker that never dies cannot be safely left behind.
    pub fn stop_workers(&self, locks: &dyn LockManager) {
        for ctx in &self.contexts {
            ctx.set_shutdown();
            ctx.interrupt(false);
        }
        for _ in 0..self.contexts.len() {
            let _ = self.sender.send(PoolMsg::Shutdown);
        }
        let mut retries = 0;
        loop {
            for ctx in &self.contexts {
                if ctx.status() == ThreadStatus::Wait {
                    ctx.wake(ResumeReason::Shutdown);
                }
            }
            locks.force_timeout_all();
            if self
                .contexts
                .iter()
                .all(|c| c.status() == ThreadStatus::Dead)
            {
                return;
            }
            retries += 1;
            if retries > self.params.shutdown_worker_retries {
                warn!(target: "oxbow", "workers did not drain; exiting process");
                std::process::exit(0);
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
}

fn worker_main<J>(
    ctx: Arc<ThreadContext>,
    receiver: Receiver<PoolMsg<J>>,
    handler: Arc<dyn Fn(&ThreadContext, J) + Send + Sync>,
) {
    loop {
        ctx.set_status(ThreadStatus::Free);
        let msg = match receiver.recv() {
            Ok(msg) => msg,
            Err(_) => break,
        };
        match msg {
            PoolMsg::Work(job) => {
                if ctx.is_shutdown() {
                    break;
                }
                ctx.set_status(ThreadStatus::Run);
                handler(&ctx, job);
                ctx.unbind();
                ctx.heap_reset();
            }
            PoolMsg::Shutdown => break,
        }
        if ctx.is_shutdown() {
            break;
        }
    }
    ctx.set_status(ThreadStatus::Dead);
}
