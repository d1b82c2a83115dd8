use crate::conn::{ConnStatus, Connection};
use crate::frame::{ErrorCode, Frame, FrameBody, HandshakeReply, HandshakeRequest, SERVER_VERSION};
use crate::method_pool::MethodPool;
use crate::opcode::Opcode;
use crate::table::RequestTable;
use oxbow_base::{err, Result, SessionTz, SystemParams};
use oxbow_ha::HaState;
use oxbow_lang::DomainRegistry;
use oxbow_thread::{Daemons, ThreadContext, ThreadStatus, WorkerPool};
use oxbow_txn::{LockManager, LogManager, PageBuffer};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispatchStatus {
    NoErrors,
    UnplannedShutdown,
}

#[derive(Default)]
pub struct ServerStats {
    pub requests: AtomicU64,
    pub diagnostic_requests: AtomicU64,
}

/// Everything a handler may reach: the collaborator seams plus the runtime
/// pieces wired in after construction (worker pool, daemons).
pub struct ServerDeps {
    pub params: Arc<SystemParams>,
    pub tz: SessionTz,
    pub registry: Arc<DomainRegistry>,
    pub log: Arc<dyn LogManager>,
    pub locks: Arc<dyn LockManager>,
    pub pages: Arc<dyn PageBuffer>,
    pub ha: Arc<HaState>,
    pub methods: Arc<MethodPool>,
    pub stats: ServerStats,
    pub shutdown: AtomicBool,
    pub pool: RwLock<Option<Arc<WorkerPool<RequestJob>>>>,
    pub daemons: RwLock<Option<Arc<Daemons>>>,
}

/// One queued request: the connection it arrived on, its request id, raw
/// opcode and payload. `payload: None` models a receive-buffer allocation
/// failure with `size` bytes expected.
pub struct RequestJob {
    pub conn: Arc<Connection>,
    pub rid: u32,
    pub op: i32,
    pub payload: Option<Vec<u8>>,
    pub size: usize,
}

pub struct Dispatcher {
    pub deps: ServerDeps,
    table: RequestTable,
}

/// The job closure handed to the worker pool: bind, dispatch, done.
pub fn request_worker(
    dispatcher: Arc<Dispatcher>,
) -> Arc<dyn Fn(&ThreadContext, RequestJob) + Send + Sync> {
    Arc::new(move |ctx, job| {
        let payload = job.payload.as_deref();
        dispatcher.dispatch(ctx, &job.conn, job.rid, job.op, payload, job.size);
    })
}

impl Dispatcher {
    pub fn new(deps: ServerDeps) -> Arc<Dispatcher> {
        Arc::new(Dispatcher {
            deps,
            table: RequestTable::build(),
        })
    }

    pub fn is_shutting_down(&self) -> bool {
        self.deps.shutdown.load(Ordering::SeqCst)
    }

    pub fn start_shutdown(&self) {
        self.deps.shutdown.store(true, Ordering::SeqCst);
    }

    /// Queue a request for the worker pool. Counts it against the
    /// connection so the drain path can see in-flight work.
    pub fn submit(&self, job: RequestJob) -> Result<()> {
        let pool = self
            .deps
            .pool
            .read()
            .clone()
            .ok_or_else(|| err("no worker pool wired"))?;
        job.conn.add_pending_request();
        pool.submit(job)
    }

    /// The per-request pipeline. Mirrors the preamble/handler/epilogue
    /// contract: every path out of here has freed the payload (by value),
    /// reset the per-request heap and balanced the pending-request counter.
    pub fn dispatch(
        &self,
        ctx: &ThreadContext,
        conn: &Arc<Connection>,
        rid: u32,
        request: i32,
        payload: Option<&[u8]>,
        size: usize,
    ) -> DispatchStatus {
        // one request at a time per connection
        let serial = conn.request_serial();
        let status = self.dispatch_inner(ctx, conn, rid, request, payload, size);
        ctx.heap_reset();
        drop(serial);
        conn.finish_pending_request();
        status
    }

    fn dispatch_inner(
        &self,
        ctx: &ThreadContext,
        conn: &Arc<Connection>,
        rid: u32,
        request: i32,
        payload: Option<&[u8]>,
        size: usize,
    ) -> DispatchStatus {
        let deps = &self.deps;

        // Receive buffer allocation failed upstream.
        if payload.is_none() && size > 0 {
            conn.send_error(rid, ErrorCode::NetCantAllocBuffer, "cannot allocate buffer");
            return DispatchStatus::UnplannedShutdown;
        }
        let payload = payload.unwrap_or(&[]);

        // Special requests outrun the table.
        if request == Opcode::PingWithHandshake.code() {
            return self.handshake(conn, rid, payload);
        }
        if request == Opcode::Shutdown.code() {
            warn!(target: "oxbow", "shutdown requested by client {}", conn.client_id());
            self.start_shutdown();
            return DispatchStatus::UnplannedShutdown;
        }

        let op = match Opcode::from_code(request) {
            Some(op) => op,
            None => {
                conn.send_error(rid, ErrorCode::NetUnknownRequest, "unknown request");
                return DispatchStatus::NoErrors;
            }
        };

        // Client already gone: nothing to do, nobody to tell. Kept silent
        // on purpose; the debug line is the only trace.
        if !conn.peer_valid() || conn.status() != ConnStatus::Open {
            debug!(target: "oxbow",
                   "dropping {:?} on dead connection {}", op, conn.client_id());
            return DispatchStatus::NoErrors;
        }

        ctx.bind(conn.client_id(), rid, conn.tran(), request);
        let tran = conn.tran();
        let entry = self.table.get(op);

        if entry.attrs.has(crate::table::ActionAttrs::CHECK_MODIFICATION) {
            // Commits only face the gate when the transaction wrote.
            let check = match (op, tran) {
                (Opcode::TranServerCommit, Some(t)) => deps.log.has_updated(t),
                (Opcode::TranServerCommit, None) => false,
                _ => true,
            };
            if check && !deps.log.is_update_allowed() {
                debug!(target: "oxbow",
                       "dispatch: CHECK_MODIFICATION refused {:?}", op);
                conn.send_error(rid, ErrorCode::ModificationDisabled, "database is read-only");
                conn.send_abort(rid);
                return DispatchStatus::NoErrors;
            }
        }

        if entry.attrs.has(crate::table::ActionAttrs::CHECK_AUTHORIZATION) {
            let is_dba = tran.map(|t| deps.log.is_dba(t)).unwrap_or(false);
            if !is_dba {
                debug!(target: "oxbow",
                       "dispatch: CHECK_AUTHORIZATION refused {:?}", op);
                conn.send_error(rid, ErrorCode::DbaOnly, "request requires DBA");
                conn.send_abort(rid);
                return DispatchStatus::NoErrors;
            }
        }

        if entry.attrs.has(crate::table::ActionAttrs::IN_TRANSACTION) {
            conn.set_in_transaction(true);
        }

        conn.note_request_served();
        deps.stats.requests.fetch_add(1, Ordering::Relaxed);
        if entry.attrs.has(crate::table::ActionAttrs::SET_DIAGNOSTICS) {
            deps.stats.diagnostic_requests.fetch_add(1, Ordering::Relaxed);
        }

        ctx.push_tracks();

        if conn.take_invalidate_snapshot() {
            if let Some(t) = tran {
                deps.log.reset_snapshot(t);
            }
        }

        if deps.params.track_requests {
            debug!(target: "oxbow", "dispatch: request {:?}", op);
        }
        let outcome = (entry.handler)(self, ctx, conn, rid, payload);

        ctx.pop_tracks();
        // defence: let other threads at the pages this request pinned
        deps.pages.unfix_all(ctx.index());

        if let Err(service_err) = outcome {
            debug!(target: "oxbow",
                   "handler {:?} failed: {:?}", op, service_err.err);
            conn.send_error(rid, service_err.code, format!("{}", service_err.err));
            let wrote = tran.map(|t| deps.log.has_updated(t)).unwrap_or(false);
            if wrote {
                conn.send_abort(rid);
            }
        }

        if entry.attrs.has(crate::table::ActionAttrs::OUT_TRANSACTION) {
            conn.set_in_transaction(false);
        }

        DispatchStatus::NoErrors
    }

    /// Protocol negotiation: version, timezone checksum, capability bits.
    fn handshake(&self, conn: &Arc<Connection>, rid: u32, payload: &[u8]) -> DispatchStatus {
        let request: HandshakeRequest = match rmp_serde::from_slice(payload) {
            Ok(r) => r,
            Err(e) => {
                conn.send_error(rid, ErrorCode::HandshakeMismatch, format!("bad handshake: {}", e));
                conn.send_abort(rid);
                return DispatchStatus::NoErrors;
            }
        };
        if request.tz_checksum != self.deps.tz.checksum() {
            conn.send_error(
                rid,
                ErrorCode::HandshakeMismatch,
                "timezone data differs between client and server",
            );
            conn.send_abort(rid);
            return DispatchStatus::NoErrors;
        }
        let reply = HandshakeReply {
            version: SERVER_VERSION.to_string(),
            tz_checksum: self.deps.tz.checksum(),
            server_state: self.deps.ha.current().name().to_string(),
            bits: request.bits & 0x1,
        };
        conn.send_frame(Frame {
            rid,
            body: FrameBody::HandshakeReply(reply),
        });
        DispatchStatus::NoErrors
    }

    /// Connection-down callback: the transport noticed the peer is gone.
    /// Drain the connection's in-flight work without deadlocking on it,
    /// then unregister its transaction and free the connection.
    pub fn conn_down(&self, ctx: &ThreadContext, conn: &Arc<Connection>) {
        let deps = &self.deps;
        let saved = ctx.bound();
        let client_id = conn.client_id();
        let mut tran = conn.tran();

        ctx.bind(client_id, 0, tran, Opcode::Shutdown.code());
        conn.set_status(ConnStatus::Closing);

        // Park in CHECK so transaction wait predicates skip this worker
        // while it busy-drains its peers.
        ctx.set_status(ThreadStatus::Check);

        if let Some(session) = conn.session() {
            session.stop_attached_threads();
        }

        let pool = deps.pool.read().clone();
        let mut pending_passes: u32 = 0;
        if let Some(pool) = pool {
            loop {
                if tran.is_none() {
                    // client dropped before finishing registration
                    std::thread::sleep(Duration::from_millis(50));
                    tran = conn.tran();
                }
                let t = match tran {
                    Some(t) => t,
                    None => break,
                };

                let prev = pool.count_workers_for(t, client_id);
                if prev > 0 {
                    if !deps.log.is_interrupted(t) {
                        deps.log.set_interrupt(t, true);
                    }
                    // Probe the first eligible waiter; interruptible causes
                    // are woken, lock-like causes are left to time out via
                    // their managers.
                    if let Some(waiter) = pool.find_waiter_for(t, ctx.index()) {
                        let woke = waiter.wake_if_interruptible();
                        debug!(target: "oxbow",
                               "conn_down: probed worker {} (woke: {})",
                               waiter.index(), woke);
                    }
                }

                let mut cnt = pool.count_workers_for(t, client_id);
                while cnt >= prev && cnt > 0 {
                    std::thread::sleep(Duration::from_millis(50));
                    cnt = pool.count_workers_for(t, client_id);
                }
                if cnt > 0 {
                    continue;
                }

                if conn.has_pending_request() && !self.is_shutting_down() {
                    std::thread::sleep(Duration::from_millis(50));
                    pending_passes += 1;
                    if pending_passes >= deps.params.pending_request_retries {
                        // Source intent is unclear on whether to recover
                        // here; mirror the assertion and move on in release.
                        debug_assert!(
                            false,
                            "connection drain exhausted pending-request retries"
                        );
                        error!(target: "oxbow",
                               "conn_down: client {} still has pending requests after {} passes",
                               client_id, pending_passes);
                        break;
                    }
                    continue;
                }
                break;
            }
        }

        if let Some(t) = tran {
            deps.log.set_interrupt(t, false);
            deps.log.unregister_client(t);
        }
        conn.set_tran(None);

        // restore the worker's own context
        ctx.bind(-1, 0, saved.tran, -1);
        ctx.set_status(ThreadStatus::Run);
    }
}
