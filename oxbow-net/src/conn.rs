use crate::frame::Frame;
use oxbow_base::{err, Result};
use oxbow_txn::TranIndex;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Where a connection's outbound frames go. Implementations wrap a socket;
/// the in-memory queue below serves tests and in-process clients.
pub trait Peer: Send + Sync {
    fn send(&self, frame: Frame) -> Result<()>;
    fn is_valid(&self) -> bool;
}

/// Frame sink backed by a deque: the in-process rendition of the transport's
/// outgoing byte queue.
pub struct QueuePeer {
    frames: Mutex<VecDeque<Frame>>,
    valid: AtomicBool,
}

impl QueuePeer {
    pub fn new() -> Arc<QueuePeer> {
        Arc::new(QueuePeer {
            frames: Mutex::new(VecDeque::new()),
            valid: AtomicBool::new(true),
        })
    }

    pub fn take(&self) -> Option<Frame> {
        self.frames.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<Frame> {
        self.frames.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Simulate the peer going away mid-flight.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }
}

impl Peer for QueuePeer {
    fn send(&self, frame: Frame) -> Result<()> {
        if !self.is_valid() {
            return Err(err("send on invalid peer"));
        }
        self.frames.lock().push_back(frame);
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

/// Client session attached to a connection. The interesting part for the
/// core is being able to stop its attached threads during drain.
pub struct Session {
    pub id: u64,
    stop: AtomicBool,
}

impl Session {
    pub fn new(id: u64) -> Arc<Session> {
        Arc::new(Session {
            id,
            stop: AtomicBool::new(false),
        })
    }

    pub fn stop_attached_threads(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConnStatus {
    Open,
    Closing,
}

/// Per accepted client. Once CLOSING, no new request is dispatched; the
/// pending-request counter is what the drain path watches to zero.
pub struct Connection {
    client_id: i32,
    peer: Arc<dyn Peer>,
    status: Mutex<ConnStatus>,
    tran: Mutex<Option<TranIndex>>,
    in_transaction: AtomicBool,
    pending_requests: AtomicUsize,
    requests_served: AtomicU64,
    invalidate_snapshot: AtomicBool,
    session: Mutex<Option<Arc<Session>>>,
    /// Requests on one connection are serialized; the dispatcher holds this
    /// for the duration of each request.
    serial: Mutex<()>,
}

impl Connection {
    pub fn new(client_id: i32, peer: Arc<dyn Peer>) -> Arc<Connection> {
        Arc::new(Connection {
            client_id,
            peer,
            status: Mutex::new(ConnStatus::Open),
            tran: Mutex::new(None),
            in_transaction: AtomicBool::new(false),
            pending_requests: AtomicUsize::new(0),
            requests_served: AtomicU64::new(0),
            invalidate_snapshot: AtomicBool::new(false),
            session: Mutex::new(None),
            serial: Mutex::new(()),
        })
    }

    pub fn request_serial(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.serial.lock()
    }

    pub fn client_id(&self) -> i32 {
        self.client_id
    }

    pub fn status(&self) -> ConnStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: ConnStatus) {
        *self.status.lock() = status;
    }

    pub fn peer_valid(&self) -> bool {
        self.peer.is_valid()
    }

    pub fn tran(&self) -> Option<TranIndex> {
        *self.tran.lock()
    }

    pub fn set_tran(&self, tran: Option<TranIndex>) {
        *self.tran.lock() = tran;
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    pub fn set_in_transaction(&self, on: bool) {
        self.in_transaction.store(on, Ordering::SeqCst);
    }

    pub fn set_invalidate_snapshot(&self) {
        self.invalidate_snapshot.store(true, Ordering::SeqCst);
    }

    pub fn take_invalidate_snapshot(&self) -> bool {
        self.invalidate_snapshot.swap(false, Ordering::SeqCst)
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    pub fn set_session(&self, session: Arc<Session>) {
        *self.session.lock() = Some(session);
    }

    pub fn add_pending_request(&self) {
        self.pending_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub fn finish_pending_request(&self) {
        let prev = self.pending_requests.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "pending-request underflow");
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending_requests.load(Ordering::SeqCst) > 0
    }

    pub fn note_request_served(&self) {
        self.requests_served.fetch_add(1, Ordering::SeqCst);
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::SeqCst)
    }

    /// Send, or drop with a debug log when the client is already gone; an
    /// unreachable peer must never take the worker down with it.
    pub fn send_frame(&self, frame: Frame) {
        if let Err(e) = self.peer.send(frame) {
            debug!(target: "oxbow",
                   "dropping frame for client {}: {}", self.client_id, e);
        }
    }

    pub fn send_reply(&self, rid: u32, payload: impl Into<Vec<u8>>) {
        self.send_frame(Frame::reply(rid, payload));
    }

    pub fn send_error(&self, rid: u32, code: crate::frame::ErrorCode, message: impl Into<String>) {
        self.send_frame(Frame::error(rid, code, message));
    }

    pub fn send_abort(&self, rid: u32) {
        self.send_frame(Frame::abort(rid));
    }
}
