use oxbow_base::{err, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

// Outbound connections to the satellite runtime that executes stored
// methods. Spawning one is expensive, so retired-but-healthy connections go
// back into a bounded pool; claim never blocks, it dials a fresh connection
// when the pool is empty.

/// One live callout channel. Implementations wrap the real socket; the
/// loopback transport below stands in for it in-process.
pub trait MethodTransport: Send {
    fn is_valid(&self) -> bool;
    fn invoke(&mut self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Dials the satellite runtime.
pub trait Dialer: Send + Sync {
    fn dial(&self) -> Result<Box<dyn MethodTransport>>;
}

pub struct MethodConnection {
    transport: Box<dyn MethodTransport>,
}

impl MethodConnection {
    pub fn is_valid(&self) -> bool {
        self.transport.is_valid()
    }

    pub fn invoke(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.transport.invoke(payload)
    }
}

pub struct MethodPool {
    capacity: usize,
    queue: Mutex<VecDeque<MethodConnection>>,
    dialer: Arc<dyn Dialer>,
}

impl MethodPool {
    pub fn new(capacity: usize, dialer: Arc<dyn Dialer>) -> Arc<MethodPool> {
        Arc::new(MethodPool {
            capacity,
            queue: Mutex::new(VecDeque::new()),
            dialer,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pooled(&self) -> usize {
        self.queue.lock().len()
    }

    /// A ready connection: pooled if available (re-dialed in place when the
    /// pooled one went stale), freshly dialed otherwise. Never blocks on
    /// exhaustion.
    pub fn claim(&self) -> Result<MethodConnection> {
        let pooled = self.queue.lock().pop_front();
        if let Some(conn) = pooled {
            if conn.is_valid() {
                return Ok(conn);
            }
            debug!(target: "oxbow", "pooled method connection went stale; re-dialing");
            return Ok(MethodConnection {
                transport: self.dialer.dial()?,
            });
        }
        Ok(MethodConnection {
            transport: self.dialer.dial()?,
        })
    }

    /// Return a connection to the pool, or destroy it: on explicit kill, on
    /// invalidity, or on overflow past capacity.
    pub fn retire(&self, conn: MethodConnection, kill: bool) {
        if !kill && conn.is_valid() {
            let mut queue = self.queue.lock();
            if queue.len() < self.capacity {
                queue.push_back(conn);
                return;
            }
            // overflow
        }
        // dropped here; the transport closes with it
    }
}

/// In-process stand-in for the satellite runtime: echoes payloads, counts
/// dials, and can wedge the transports it handed out so the re-dial path is
/// exercisable.
pub struct LoopbackDialer {
    pub dials: AtomicU64,
    handed_out: Mutex<Vec<Arc<AtomicBool>>>,
}

impl LoopbackDialer {
    pub fn new() -> Arc<LoopbackDialer> {
        Arc::new(LoopbackDialer {
            dials: AtomicU64::new(0),
            handed_out: Mutex::new(Vec::new()),
        })
    }

    /// Sever every transport dialed so far, as if the satellite died.
    pub fn wedge_all(&self) {
        for valid in self.handed_out.lock().iter() {
            valid.store(false, Ordering::SeqCst);
        }
    }
}

struct LoopbackTransport {
    valid: Arc<AtomicBool>,
}

impl MethodTransport for LoopbackTransport {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn invoke(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        if !self.is_valid() {
            return Err(err("method transport is down"));
        }
        let mut out = Vec::with_capacity(payload.len() + 3);
        out.extend_from_slice(b"ok:");
        out.extend_from_slice(payload);
        Ok(out)
    }
}

impl Dialer for LoopbackDialer {
    fn dial(&self) -> Result<Box<dyn MethodTransport>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let valid = Arc::new(AtomicBool::new(true));
        self.handed_out.lock().push(valid.clone());
        Ok(Box::new(LoopbackTransport { valid }))
    }
}
