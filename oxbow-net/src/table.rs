use crate::conn::Connection;
use crate::dispatch::Dispatcher;
use crate::frame::ErrorCode;
use crate::handlers;
use crate::opcode::Opcode;
use oxbow_thread::ThreadContext;
use std::ops::BitOr;
use std::sync::Arc;
use strum::IntoEnumIterator;

/// Per-opcode policy bits applied by the dispatcher preamble and epilogue.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ActionAttrs(u8);

impl ActionAttrs {
    pub const NONE: ActionAttrs = ActionAttrs(0);
    /// Verify the database accepts modifications before running.
    pub const CHECK_MODIFICATION: ActionAttrs = ActionAttrs(1 << 0);
    /// Caller must be a DBA.
    pub const CHECK_AUTHORIZATION: ActionAttrs = ActionAttrs(1 << 1);
    /// Collect per-request diagnostics.
    pub const SET_DIAGNOSTICS: ActionAttrs = ActionAttrs(1 << 2);
    /// The request puts its connection inside a transaction bracket.
    pub const IN_TRANSACTION: ActionAttrs = ActionAttrs(1 << 3);
    /// The request closes its connection's transaction bracket.
    pub const OUT_TRANSACTION: ActionAttrs = ActionAttrs(1 << 4);

    pub fn has(self, other: ActionAttrs) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ActionAttrs {
    type Output = ActionAttrs;

    fn bitor(self, rhs: ActionAttrs) -> ActionAttrs {
        ActionAttrs(self.0 | rhs.0)
    }
}

/// A handler failure the dispatcher turns into an error frame.
#[derive(Debug)]
pub struct ServiceError {
    pub code: ErrorCode,
    pub err: oxbow_base::Error,
}

impl ServiceError {
    pub fn new(code: ErrorCode, msg: impl Into<std::borrow::Cow<'static, str>>) -> ServiceError {
        ServiceError {
            code,
            err: oxbow_base::err(msg),
        }
    }
}

impl From<oxbow_base::Error> for ServiceError {
    fn from(err: oxbow_base::Error) -> ServiceError {
        ServiceError {
            code: ErrorCode::Internal,
            err,
        }
    }
}

pub type HandlerResult = std::result::Result<(), ServiceError>;

pub type RequestHandler =
    fn(&Dispatcher, &ThreadContext, &Arc<Connection>, u32, &[u8]) -> HandlerResult;

pub struct RequestDescriptor {
    pub attrs: ActionAttrs,
    pub handler: RequestHandler,
}

/// Flat array of (attribute bitset, handler) indexed by opcode. Built once
/// at server init; every opcode is known at build time, so the table is
/// total by construction.
pub struct RequestTable {
    entries: Vec<RequestDescriptor>,
}

impl RequestTable {
    pub fn build() -> RequestTable {
        use ActionAttrs as A;
        let mut entries = Vec::with_capacity(Opcode::count());
        for op in Opcode::iter() {
            let (attrs, handler): (ActionAttrs, RequestHandler) = match op {
                Opcode::Ping => (A::NONE, handlers::server_ping),
                // handled before the table applies; wired for totality
                Opcode::PingWithHandshake => (A::NONE, handlers::server_ping),
                Opcode::Shutdown => (A::NONE, handlers::server_ping),

                Opcode::BoRegisterClient => (A::NONE, handlers::boot_register_client),
                Opcode::BoUnregisterClient => (A::NONE, handlers::boot_unregister_client),
                Opcode::BoBackup => (
                    A::CHECK_AUTHORIZATION | A::IN_TRANSACTION,
                    handlers::boot_backup,
                ),
                Opcode::BoAddVolumeExtension => (
                    A::CHECK_AUTHORIZATION | A::IN_TRANSACTION,
                    handlers::boot_add_volume_extension,
                ),
                Opcode::BoChangeHaMode => (A::CHECK_AUTHORIZATION, handlers::boot_change_ha_mode),
                Opcode::BoNotifyLogApplierState => (
                    A::CHECK_AUTHORIZATION,
                    handlers::boot_notify_log_applier_state,
                ),

                Opcode::TranServerCommit => (
                    A::CHECK_MODIFICATION | A::SET_DIAGNOSTICS | A::OUT_TRANSACTION,
                    handlers::tran_server_commit,
                ),
                Opcode::TranServerAbort => (
                    A::SET_DIAGNOSTICS | A::OUT_TRANSACTION,
                    handlers::tran_server_abort,
                ),
                Opcode::TranServerSavepoint => (
                    A::CHECK_MODIFICATION | A::IN_TRANSACTION,
                    handlers::tran_server_savepoint,
                ),
                Opcode::TranServerHasUpdated => (A::NONE, handlers::tran_server_has_updated),
                Opcode::TranLocalTranId => (A::NONE, handlers::tran_local_tran_id),

                Opcode::LogCheckpoint => (A::NONE, handlers::log_checkpoint),
                Opcode::LogSetInterrupt => (A::IN_TRANSACTION, handlers::log_set_interrupt),
                Opcode::LogDumpStat => (A::NONE, handlers::log_dump_stat),

                Opcode::LocFetch => (A::IN_TRANSACTION, handlers::loc_fetch),
                Opcode::LocForce => (
                    A::CHECK_MODIFICATION | A::SET_DIAGNOSTICS | A::IN_TRANSACTION,
                    handlers::loc_force,
                ),

                Opcode::HaServerState => (A::NONE, handlers::ha_server_state),

                Opcode::SessionEnd => (A::NONE, handlers::session_end),

                Opcode::MethodInvoke => (A::IN_TRANSACTION, handlers::method_invoke),
            };
            entries.push(RequestDescriptor { attrs, handler });
        }
        RequestTable { entries }
    }

    pub fn get(&self, op: Opcode) -> &RequestDescriptor {
        &self.entries[op.code() as usize]
    }
}
