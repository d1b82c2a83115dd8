// Boot and shutdown wiring for the server. Everything interesting lives in
// the subsystem crates; this one constructs them in dependency order, ties
// the knots that cannot be tied at construction time (pool into dispatcher,
// daemons into dispatcher, herd into the HA machine), and runs the lifecycle
// that `net_server_start`-shaped callers expect: block until someone asks
// for termination, then stop workers first and daemons second.

use oxbow_base::{Result, SessionTz, SystemParams};
use oxbow_ha::{HaState, LoopbackReplication};
use oxbow_lang::DomainRegistry;
use oxbow_net::{
    Connection, Dispatcher, LoopbackDialer, MethodPool, QueuePeer, RequestJob, ServerDeps,
    ServerStats,
};
use oxbow_thread::{Daemons, ThreadContext, ThreadKind, WorkerPool};
use oxbow_txn::{MemLockManager, MemLogManager, MemPageBuffer};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct Server {
    name: String,
    dispatcher: Arc<Dispatcher>,
    pool: Arc<WorkerPool<RequestJob>>,
    daemons: Arc<Daemons>,
    log: Arc<MemLogManager>,
    locks: Arc<MemLockManager>,
    pages: Arc<MemPageBuffer>,
    ha: Arc<HaState>,
    registry: Arc<DomainRegistry>,
    next_client: AtomicI32,
    sys_ctx: ThreadContext,
}

impl Server {
    /// Construct and start every subsystem. Failure here is fatal to the
    /// process (exit code 2 from [`server_start`]).
    pub fn boot(name: &str, params: SystemParams) -> Result<Server> {
        let params = Arc::new(params);
        let registry = DomainRegistry::new();
        let log = Arc::new(MemLogManager::new());
        let locks = Arc::new(MemLockManager::new());
        let pages = Arc::new(MemPageBuffer::new());

        let ha = HaState::new(log.clone(), true);
        ha.set_replication(Arc::new(LoopbackReplication));

        let methods = MethodPool::new(params.method_pool_size, LoopbackDialer::new());

        let deps = ServerDeps {
            params: params.clone(),
            tz: SessionTz::utc(),
            registry: registry.clone(),
            log: log.clone(),
            locks: locks.clone(),
            pages: pages.clone(),
            ha: ha.clone(),
            methods,
            stats: ServerStats::default(),
            shutdown: AtomicBool::new(false),
            pool: RwLock::new(None),
            daemons: RwLock::new(None),
        };
        let dispatcher = Dispatcher::new(deps);

        let pool = WorkerPool::start(params.clone(), oxbow_net::request_worker(dispatcher.clone()));
        *dispatcher.deps.pool.write() = Some(pool.clone());
        ha.set_worker_herd(pool.clone());

        let daemons = Arc::new(Daemons::start(
            params,
            log.clone(),
            locks.clone(),
            pages.clone(),
            pool.contexts().to_vec(),
        ));
        *dispatcher.deps.daemons.write() = Some(daemons.clone());

        info!(target: "oxbow", "server {:?} is up", name);
        Ok(Server {
            name: name.to_string(),
            dispatcher,
            pool,
            daemons,
            log,
            locks,
            pages,
            ha,
            registry,
            next_client: AtomicI32::new(1),
            sys_ctx: ThreadContext::new(0, ThreadKind::System),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn ha(&self) -> &Arc<HaState> {
        &self.ha
    }

    pub fn log(&self) -> &Arc<MemLogManager> {
        &self.log
    }

    pub fn pages(&self) -> &Arc<MemPageBuffer> {
        &self.pages
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    /// Accept an in-process client: a fresh connection plus the peer queue
    /// its reply frames land in.
    pub fn accept(&self) -> (Arc<Connection>, Arc<QueuePeer>) {
        let client_id = self.next_client.fetch_add(1, Ordering::SeqCst);
        let peer = QueuePeer::new();
        let conn = Connection::new(client_id, peer.clone());
        (conn, peer)
    }

    /// Queue one request for the worker pool.
    pub fn submit(
        &self,
        conn: &Arc<Connection>,
        rid: u32,
        op: i32,
        payload: Vec<u8>,
    ) -> Result<()> {
        let size = payload.len();
        self.dispatcher.submit(RequestJob {
            conn: conn.clone(),
            rid,
            op,
            payload: Some(payload),
            size,
        })
    }

    /// The transport lost this client; drain and free its state.
    pub fn connection_down(&self, conn: &Arc<Connection>) {
        self.dispatcher.conn_down(&self.sys_ctx, conn);
    }

    pub fn request_shutdown(&self) {
        self.dispatcher.start_shutdown();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.dispatcher.is_shutting_down()
    }

    /// Block until a shutdown is requested (by a DBA client or by
    /// [`Server::request_shutdown`]).
    pub fn wait_for_shutdown(&self) {
        while !self.dispatcher.is_shutting_down() {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    /// Two-phase stop: drain the request workers, then the daemons.
    pub fn stop(&self) {
        info!(target: "oxbow", "server {:?} stopping", self.name);
        self.pool.stop_workers(self.locks.as_ref());
        self.daemons.stop();
    }
}

/// The whole lifecycle, with the classic exit codes: 0 for a clean
/// shutdown, 2 when initialization fails.
pub fn server_start(name: &str, params: SystemParams) -> i32 {
    let server = match Server::boot(name, params) {
        Ok(server) => server,
        Err(e) => {
            error!(target: "oxbow", "server {:?} failed to initialize: {}", name, e);
            return 2;
        }
    };
    server.wait_for_shutdown();
    server.stop();
    0
}

#[cfg(test)]
mod test;
