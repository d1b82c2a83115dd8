use oxbow_txn::TranIndex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ThreadKind {
    System,
    Worker,
    Daemon,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ThreadStatus {
    Run,
    Wait,
    /// Running, but transaction wait predicates must not trust it: the
    /// connection-down path parks a worker here while it drains peers.
    Check,
    Free,
    Dead,
}

/// Why a worker is suspended. The partition into interruptible and
/// uninterruptible causes decides who the connection-drain path may wake:
/// waking a thread out of a lock or critical-section wait would corrupt the
/// owner's bookkeeping, so those always resume through their own manager.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SuspendCause {
    ConnQueue,
    HeapClsRepr,
    LogWriter,
    AllocBuffer,
    DeadWait,
    CsectReader,
    CsectWriter,
    CsectPromoter,
    Lock,
    PageBuffer,
    JobQueue,
}

impl SuspendCause {
    pub fn interruptible(self) -> bool {
        use SuspendCause::*;
        matches!(self, ConnQueue | HeapClsRepr | LogWriter | AllocBuffer | DeadWait)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ResumeReason {
    None,
    Normal(SuspendCause),
    Interrupt,
    Shutdown,
    Timeout,
}

/// Identity of the work a context is currently bound to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BoundInfo {
    pub client_id: i32,
    pub request_id: u32,
    pub tran: Option<TranIndex>,
    /// Raw operation code; -1 between requests. Kept opaque here so the
    /// runtime does not depend on the request table.
    pub op_code: i32,
}

impl BoundInfo {
    fn unbound() -> BoundInfo {
        BoundInfo {
            client_id: -1,
            request_id: 0,
            tran: None,
            op_code: -1,
        }
    }
}

#[derive(Debug)]
struct CtxState {
    status: ThreadStatus,
    bound: BoundInfo,
    suspend_cause: Option<SuspendCause>,
    resume: ResumeReason,
}

type Release = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TrackFrame {
    releases: Vec<Release>,
}

/// Per-request private heap: buffers parked here live until the dispatch
/// epilogue resets the context.
#[derive(Debug, Default)]
pub struct ScratchHeap {
    bufs: Vec<Vec<u8>>,
    bytes: usize,
}

/// Per-worker scratch and scheduling state. Owned by one OS thread; other
/// threads only touch it through the interrupt flag and the wake paths.
pub struct ThreadContext {
    index: usize,
    kind: ThreadKind,
    state: Mutex<CtxState>,
    wakeup: Condvar,
    interrupted: AtomicBool,
    check_interrupt: AtomicBool,
    shutdown: AtomicBool,
    tracks: Mutex<Vec<TrackFrame>>,
    heap: Mutex<ScratchHeap>,
}

fn lock_state(ctx: &ThreadContext) -> MutexGuard<'_, CtxState> {
    ctx.state.lock().unwrap_or_else(|e| e.into_inner())
}

impl ThreadContext {
    pub fn new(index: usize, kind: ThreadKind) -> ThreadContext {
        ThreadContext {
            index,
            kind,
            state: Mutex::new(CtxState {
                status: ThreadStatus::Free,
                bound: BoundInfo::unbound(),
                suspend_cause: None,
                resume: ResumeReason::None,
            }),
            wakeup: Condvar::new(),
            interrupted: AtomicBool::new(false),
            check_interrupt: AtomicBool::new(true),
            shutdown: AtomicBool::new(false),
            tracks: Mutex::new(Vec::new()),
            heap: Mutex::new(ScratchHeap::default()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> ThreadKind {
        self.kind
    }

    /// Bind this context to a request. Clears the interrupt flag and any
    /// stale resume state.
    pub fn bind(&self, client_id: i32, request_id: u32, tran: Option<TranIndex>, op_code: i32) {
        let mut st = lock_state(self);
        st.bound = BoundInfo {
            client_id,
            request_id,
            tran,
            op_code,
        };
        st.resume = ResumeReason::None;
        self.interrupted.store(false, Ordering::Release);
    }

    /// Between requests: no transaction, no connection identity.
    pub fn unbind(&self) {
        let mut st = lock_state(self);
        st.bound = BoundInfo::unbound();
        self.interrupted.store(false, Ordering::Release);
    }

    pub fn bound(&self) -> BoundInfo {
        lock_state(self).bound
    }

    pub fn status(&self) -> ThreadStatus {
        lock_state(self).status
    }

    pub fn set_status(&self, status: ThreadStatus) {
        lock_state(self).status = status;
    }

    pub fn is_working_for(&self, tran: TranIndex, client_id: i32) -> bool {
        let st = lock_state(self);
        st.status != ThreadStatus::Free
            && st.status != ThreadStatus::Dead
            && st.bound.tran == Some(tran)
            && st.bound.client_id == client_id
    }

    pub fn suspended_on(&self, cause: SuspendCause) -> bool {
        let st = lock_state(self);
        st.status == ThreadStatus::Wait && st.suspend_cause == Some(cause)
    }

    /// Cooperative interrupt. A hard interrupt also wakes the target if it
    /// is parked on an interruptible cause; a soft one only sets the flag
    /// for the next explicit check.
    pub fn interrupt(&self, soft: bool) {
        self.interrupted.store(true, Ordering::Release);
        if !soft {
            self.wake_if_interruptible();
        }
    }

    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn set_check_interrupt(&self, on: bool) {
        self.check_interrupt.store(on, Ordering::Release);
    }

    pub fn check_interrupt(&self) -> bool {
        self.check_interrupt.load(Ordering::Acquire)
    }

    pub fn set_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Park on this context's condition variable until a waker passes a
    /// resume reason. Must be called by the owning thread.
    pub fn suspend_until(&self, cause: SuspendCause) -> ResumeReason {
        let mut st = lock_state(self);
        st.status = ThreadStatus::Wait;
        st.suspend_cause = Some(cause);
        st.resume = ResumeReason::None;
        while st.resume == ResumeReason::None && !self.is_shutdown() {
            st = self
                .wakeup
                .wait(st)
                .unwrap_or_else(|e| e.into_inner());
        }
        let reason = if st.resume == ResumeReason::None {
            ResumeReason::Shutdown
        } else {
            st.resume
        };
        st.status = ThreadStatus::Run;
        st.suspend_cause = None;
        st.resume = ResumeReason::None;
        reason
    }

    /// Like [`suspend_until`], with a timeout.
    pub fn suspend_timeout(&self, cause: SuspendCause, timeout: Duration) -> ResumeReason {
        let mut st = lock_state(self);
        st.status = ThreadStatus::Wait;
        st.suspend_cause = Some(cause);
        st.resume = ResumeReason::None;
        let deadline = std::time::Instant::now() + timeout;
        let mut timed_out = false;
        while st.resume == ResumeReason::None && !self.is_shutdown() && !timed_out {
            let now = std::time::Instant::now();
            let left = deadline.saturating_duration_since(now);
            if left.is_zero() {
                timed_out = true;
                break;
            }
            let (guard, wt) = self
                .wakeup
                .wait_timeout(st, left)
                .unwrap_or_else(|e| e.into_inner());
            st = guard;
            if wt.timed_out() {
                timed_out = true;
            }
        }
        let reason = if st.resume != ResumeReason::None {
            st.resume
        } else if timed_out {
            ResumeReason::Timeout
        } else {
            ResumeReason::Shutdown
        };
        st.status = ThreadStatus::Run;
        st.suspend_cause = None;
        st.resume = ResumeReason::None;
        reason
    }

    /// Hand a resume reason to a waiting context. Returns whether anything
    /// was actually waiting.
    pub fn wake(&self, reason: ResumeReason) -> bool {
        let mut st = lock_state(self);
        if st.status != ThreadStatus::Wait || st.resume != ResumeReason::None {
            return false;
        }
        st.resume = reason;
        self.wakeup.notify_all();
        true
    }

    /// Resume a waiter as if its own cause completed.
    pub fn wake_normal(&self) -> bool {
        let mut st = lock_state(self);
        if st.status != ThreadStatus::Wait || st.resume != ResumeReason::None {
            return false;
        }
        let cause = match st.suspend_cause {
            Some(c) => c,
            None => return false,
        };
        st.resume = ResumeReason::Normal(cause);
        self.wakeup.notify_all();
        true
    }

    /// The connection-drain probe: wake only if parked on an interruptible
    /// cause with interrupt checking enabled. Lock and critical-section
    /// waiters are left for their own managers to release.
    pub fn wake_if_interruptible(&self) -> bool {
        let mut st = lock_state(self);
        if st.status != ThreadStatus::Wait || st.resume != ResumeReason::None {
            return false;
        }
        if !self.check_interrupt() {
            return false;
        }
        match st.suspend_cause {
            Some(cause) if cause.interruptible() => {
                st.resume = ResumeReason::Interrupt;
                self.wakeup.notify_all();
                true
            }
            _ => false,
        }
    }

    // Resource tracks. Everything registered between push and pop is
    // released by pop at the latest; the epilogue counts on this.

    pub fn push_tracks(&self) {
        self.tracks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(TrackFrame::default());
    }

    /// Pop the current frame, running any release not already consumed.
    /// Returns how many leaked releases were run.
    pub fn pop_tracks(&self) -> usize {
        let frame = self
            .tracks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        match frame {
            Some(mut frame) => {
                let leaked = frame.releases.len();
                if leaked > 0 {
                    warn!(target: "oxbow",
                          "worker {} leaked {} tracked resources; releasing",
                          self.index, leaked);
                }
                while let Some(release) = frame.releases.pop() {
                    release();
                }
                leaked
            }
            None => {
                debug!(target: "oxbow", "pop_tracks with no frame on worker {}", self.index);
                0
            }
        }
    }

    /// Register a release to run when the current frame pops (unless the
    /// resource is released earlier by the handler itself).
    pub fn track(&self, release: Release) {
        let mut tracks = self.tracks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(frame) = tracks.last_mut() {
            frame.releases.push(release);
            return;
        }
        // No frame: nothing will ever pop this, release now.
        drop(tracks);
        warn!(target: "oxbow", "track outside a frame on worker {}", self.index);
        release();
    }

    pub fn track_depth(&self) -> usize {
        self.tracks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    // Per-request private heap.

    pub fn heap_keep(&self, buf: Vec<u8>) {
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        heap.bytes += buf.len();
        heap.bufs.push(buf);
    }

    pub fn heap_bytes(&self) -> usize {
        self.heap.lock().unwrap_or_else(|e| e.into_inner()).bytes
    }

    pub fn heap_reset(&self) {
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        heap.bufs.clear();
        heap.bytes = 0;
    }
}
