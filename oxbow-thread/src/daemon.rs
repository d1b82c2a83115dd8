use crate::context::{SuspendCause, ThreadContext, ThreadKind, ThreadStatus};
use oxbow_base::SystemParams;
use oxbow_txn::{LockManager, LogManager, PageBuffer};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// The fixed daemons. Each owns a monitor (mutex + condvar + running latch)
// that external code signals; the running latch suppresses redundant wakeups
// while a pass is already in flight.

struct MonitorState {
    running: bool,
    signalled: bool,
    /// Log-flush only: the signaller wants a direct (non-background) flush.
    force_flush: bool,
}

struct DaemonMonitor {
    state: Mutex<MonitorState>,
    cond: Condvar,
}

impl DaemonMonitor {
    fn new() -> DaemonMonitor {
        DaemonMonitor {
            state: Mutex::new(MonitorState {
                running: false,
                signalled: false,
                force_flush: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wake(&self) {
        let mut st = self.lock();
        if !st.running {
            st.signalled = true;
            self.cond.notify_one();
        }
    }

    fn wake_force(&self) {
        let mut st = self.lock();
        st.force_flush = true;
        if !st.running {
            st.signalled = true;
            self.cond.notify_one();
        }
    }

    /// Wait for a signal; `timeout` of zero waits indefinitely. Returns
    /// (timed_out, force_flush).
    fn wait(&self, timeout: Duration, shutdown: &ThreadContext) -> (bool, bool) {
        let mut st = self.lock();
        st.running = false;
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };
        let mut timed_out = false;
        while !st.signalled && !shutdown.is_shutdown() {
            match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        timed_out = true;
                        break;
                    }
                    let (guard, wt) = self
                        .cond
                        .wait_timeout(st, left)
                        .unwrap_or_else(|e| e.into_inner());
                    st = guard;
                    if wt.timed_out() {
                        timed_out = true;
                        break;
                    }
                }
                None => {
                    st = self.cond.wait(st).unwrap_or_else(|e| e.into_inner());
                }
            }
        }
        st.signalled = false;
        st.running = true;
        let force = st.force_flush;
        st.force_flush = false;
        (timed_out, force)
    }
}

struct DaemonSeat {
    ctx: Arc<ThreadContext>,
    monitor: Arc<DaemonMonitor>,
}

/// The four fixed daemons: deadlock scan, checkpoint, page flush, log
/// flush. `stop` is shutdown phase 2.
pub struct Daemons {
    deadlock: DaemonSeat,
    checkpoint: DaemonSeat,
    page_flush: DaemonSeat,
    log_flush: DaemonSeat,
    params: Arc<SystemParams>,
}

impl Daemons {
    pub fn start(
        params: Arc<SystemParams>,
        log: Arc<dyn LogManager>,
        locks: Arc<dyn LockManager>,
        pages: Arc<dyn PageBuffer>,
        workers: Vec<Arc<ThreadContext>>,
    ) -> Daemons {
        let base = workers.iter().map(|w| w.index()).max().unwrap_or(0) + 1;

        let deadlock = seat(base, |ctx, monitor| {
            let params = params.clone();
            let locks = locks.clone();
            thread::spawn(move || deadlock_main(ctx, monitor, params, locks, workers));
        });
        let checkpoint = seat(base + 1, |ctx, monitor| {
            let params = params.clone();
            let log = log.clone();
            thread::spawn(move || checkpoint_main(ctx, monitor, params, log));
        });
        let page_flush = seat(base + 2, |ctx, monitor| {
            let pages = pages.clone();
            thread::spawn(move || page_flush_main(ctx, monitor, pages));
        });
        let log_flush = seat(base + 3, |ctx, monitor| {
            let params = params.clone();
            let log = log.clone();
            thread::spawn(move || log_flush_main(ctx, monitor, params, log));
        });

        Daemons {
            deadlock,
            checkpoint,
            page_flush,
            log_flush,
            params,
        }
    }

    pub fn wake_deadlock_detector(&self) {
        self.deadlock.monitor.wake();
    }

    pub fn wake_checkpoint(&self) {
        self.checkpoint.monitor.wake();
    }

    pub fn wake_page_flush(&self) {
        self.page_flush.monitor.wake();
    }

    pub fn wake_log_flush(&self) {
        self.log_flush.monitor.wake();
    }

    /// Ask for an immediate direct flush (commit coalescing).
    pub fn wake_log_flush_force(&self) {
        self.log_flush.monitor.wake_force();
    }

    /// Shutdown phase 2: mark daemons down, wake each, drain with a bounded
    /// retry, exit the process if one refuses to die.
    pub fn stop(&self) {
        for seat in self.seats() {
            seat.ctx.set_shutdown();
        }
        for seat in self.seats() {
            seat.monitor.wake();
        }
        let mut retries = 0;
        loop {
            if self
                .seats()
                .iter()
                .all(|s| s.ctx.status() == ThreadStatus::Dead)
            {
                return;
            }
            retries += 1;
            if retries > self.params.shutdown_daemon_retries {
                warn!(target: "oxbow", "daemons did not drain; exiting process");
                std::process::exit(0);
            }
            for seat in self.seats() {
                seat.monitor.wake();
            }
            thread::sleep(Duration::from_millis(100));
        }
    }

    fn seats(&self) -> [&DaemonSeat; 4] {
        [
            &self.deadlock,
            &self.checkpoint,
            &self.page_flush,
            &self.log_flush,
        ]
    }
}

fn seat(index: usize, spawn: impl FnOnce(Arc<ThreadContext>, Arc<DaemonMonitor>)) -> DaemonSeat {
    let ctx = Arc::new(ThreadContext::new(index, ThreadKind::Daemon));
    ctx.set_status(ThreadStatus::Run);
    let monitor = Arc::new(DaemonMonitor::new());
    spawn(ctx.clone(), monitor.clone());
    DaemonSeat { ctx, monitor }
}

/// Wakes on demand; scans lock waiters. Interrupt-flagged waiters that still
/// honor interrupts are woken with INTERRUPT; if two or more waiters remain
/// active, local deadlock detection runs.
fn deadlock_main(
    ctx: Arc<ThreadContext>,
    monitor: Arc<DaemonMonitor>,
    params: Arc<SystemParams>,
    locks: Arc<dyn LockManager>,
    workers: Vec<Arc<ThreadContext>>,
) {
    while !ctx.is_shutdown() {
        let waiters: Vec<&Arc<ThreadContext>> = workers
            .iter()
            .filter(|w| w.suspended_on(SuspendCause::Lock))
            .collect();
        if waiters.is_empty() {
            monitor.wait(Duration::ZERO, &ctx);
            continue;
        }
        let mut active = 0;
        for w in &waiters {
            if w.check_interrupt() && w.is_interrupted() {
                w.wake(crate::context::ResumeReason::Interrupt);
            } else {
                active += 1;
            }
        }
        if active >= 2 && locks.deadlock_detection_enabled() {
            locks.detect_local_deadlock();
        }
        thread::sleep(Duration::from_millis(params.deadlock_scan_interval_ms));
    }
    ctx.set_status(ThreadStatus::Dead);
}

/// Periodic plus on-demand checkpoints through the log manager.
fn checkpoint_main(
    ctx: Arc<ThreadContext>,
    monitor: Arc<DaemonMonitor>,
    params: Arc<SystemParams>,
    log: Arc<dyn LogManager>,
) {
    while !ctx.is_shutdown() {
        let period = Duration::from_secs(params.checkpoint_interval_min * 60);
        monitor.wait(period, &ctx);
        if ctx.is_shutdown() {
            break;
        }
        debug!(target: "oxbow", "checkpoint daemon firing");
        log.checkpoint();
    }
    ctx.set_status(ThreadStatus::Dead);
}

/// On-demand victim flushing through the page buffer.
fn page_flush_main(ctx: Arc<ThreadContext>, monitor: Arc<DaemonMonitor>, pages: Arc<dyn PageBuffer>) {
    while !ctx.is_shutdown() {
        monitor.wait(Duration::ZERO, &ctx);
        if ctx.is_shutdown() {
            break;
        }
        pages.flush_victim_candidates();
    }
    ctx.set_status(ThreadStatus::Dead);
}

/// The log flusher: timer is min(group-commit, background) interval rebased
/// on the time the previous pass took. A timed-out pass decides between a
/// background flush and a direct flush (commit coalescing); only a direct
/// flush releases commit waiters, and it releases all of them exactly once.
fn log_flush_main(
    ctx: Arc<ThreadContext>,
    monitor: Arc<DaemonMonitor>,
    params: Arc<SystemParams>,
    log: Arc<dyn LogManager>,
) {
    let min_wait = params.log_flush_wait_ms();
    let mut last = Instant::now();
    let mut gc_elapsed = Duration::ZERO;
    let mut repl_elapsed = Duration::ZERO;

    while !ctx.is_shutdown() {
        let work_elapsed = last.elapsed();
        let wait = if min_wait == 0 {
            Duration::ZERO // signal-only
        } else {
            Duration::from_millis(min_wait).saturating_sub(work_elapsed).max(Duration::from_millis(1))
        };
        let (timed_out, force) = monitor.wait(wait, &ctx);
        if ctx.is_shutdown() {
            break;
        }
        let elapsed = last.elapsed();
        gc_elapsed += elapsed;
        repl_elapsed += elapsed;
        last = Instant::now();

        let gc_interval = Duration::from_millis(params.group_commit_interval_ms);
        let mut background = false;
        if timed_out {
            if force {
                background = false;
            } else if !params.group_commit_active() {
                background = true;
            } else if params.async_commit {
                background = gc_elapsed < gc_interval;
            } else {
                background = !(gc_elapsed >= gc_interval && log.commit_waiters() > 0);
            }
            if params.replication_mode
                && repl_elapsed >= Duration::from_secs(params.log_header_flush_interval_s)
            {
                log.flush_header();
                repl_elapsed = Duration::ZERO;
            }
        }

        if background {
            log.flush_background();
        } else {
            let flushed = log.flush_direct();
            if flushed > 0 {
                gc_elapsed = Duration::ZERO;
            }
            log.broadcast_commit_done();
        }
    }
    ctx.set_status(ThreadStatus::Dead);
}
