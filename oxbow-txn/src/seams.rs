use crate::TranIndex;
use oxbow_base::Result;
use std::time::SystemTime;

/// What the log manager knows about a registered client.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClientInfo {
    pub client_id: i32,
    pub user: String,
    pub host: String,
    pub is_dba: bool,
    /// Whether this client may stay connected while the server is in
    /// maintenance mode.
    pub maintenance_allowed: bool,
}

impl ClientInfo {
    pub fn normal(client_id: i32, user: &str) -> ClientInfo {
        ClientInfo {
            client_id,
            user: user.to_string(),
            host: String::from("localhost"),
            is_dba: false,
            maintenance_allowed: false,
        }
    }

    pub fn dba(client_id: i32, user: &str) -> ClientInfo {
        ClientInfo {
            is_dba: true,
            maintenance_allowed: true,
            ..ClientInfo::normal(client_id, user)
        }
    }
}

/// The transaction table and WAL surface the core consumes. Registration can
/// fail (table pressure); everything else is infallible bookkeeping from the
/// core's point of view.
pub trait LogManager: Send + Sync {
    fn register_client(&self, client: ClientInfo) -> Result<TranIndex>;
    fn unregister_client(&self, t: TranIndex);
    fn find_client(&self, t: TranIndex) -> Option<ClientInfo>;
    fn active_trans(&self) -> Vec<TranIndex>;
    fn count_non_maintenance_clients(&self) -> usize;

    fn commit(&self, t: TranIndex) -> Result<()>;
    fn abort(&self, t: TranIndex) -> Result<()>;
    /// Record that `t` performed an update in its current transaction.
    fn note_update(&self, t: TranIndex);
    fn has_updated(&self, t: TranIndex) -> bool;

    /// The modification gate. HA demotion closes it; promotion and
    /// maintenance open it.
    fn is_update_allowed(&self) -> bool;
    fn enable_update(&self);
    fn disable_update(&self);

    fn set_interrupt(&self, t: TranIndex, on: bool);
    fn is_interrupted(&self, t: TranIndex) -> bool;
    /// Drop any snapshot data `t` accumulated; the next request rebuilds it.
    fn reset_snapshot(&self, t: TranIndex);
    /// Kill a transaction outright: interrupt it and mark it for abort.
    fn slam_transaction(&self, t: TranIndex);
    fn is_dba(&self, t: TranIndex) -> bool;
    fn set_promotion_time(&self, at: SystemTime);

    // WAL operations driven by the daemons.
    fn checkpoint(&self);
    fn flush_background(&self);
    /// Direct (group-commit) flush; returns the number of pages flushed.
    fn flush_direct(&self) -> usize;
    fn flush_header(&self);
    fn commit_waiters(&self) -> usize;
    /// Release every commit waiter. Called exactly once per effective flush.
    fn broadcast_commit_done(&self);
}

pub trait LockManager: Send + Sync {
    /// Time out `t`'s expired lock waits; true if anything was released.
    fn force_timeout_expired_waiters(&self, t: TranIndex) -> bool;
    /// Shutdown path: time out every lock wait unconditionally.
    fn force_timeout_all(&self);
    fn detect_local_deadlock(&self);
    fn deadlock_detection_enabled(&self) -> bool {
        true
    }
    /// Human-readable lock table state, for the diagnostics dump.
    fn dump_state(&self) -> String;
}

pub trait PageBuffer: Send + Sync {
    /// Drop every page fix still held by `worker`. The dispatch epilogue
    /// calls this unconditionally.
    fn unfix_all(&self, worker: usize);
    fn flush_victim_candidates(&self);
}
