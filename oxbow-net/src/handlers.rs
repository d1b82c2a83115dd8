// The typed service handlers behind the request table. Handlers are plain
// functions over (dispatcher, context, connection, rid, payload); they send
// their own reply frames and report failures as `ServiceError`, which the
// dispatcher turns into an error frame (plus an abort when the transaction
// already wrote). Argument payloads are msgpack structs; anything that
// carries a typed literal goes through the coercion engine before use.

use crate::conn::{Connection, Session};
use crate::dispatch::Dispatcher;
use crate::frame::ErrorCode;
use crate::table::{HandlerResult, ServiceError};
use oxbow_ha::ServerState;
use oxbow_lang::{cast, CastOpts, CastStatus, DomainKind, Oid, Value};
use oxbow_thread::ThreadContext;
use oxbow_txn::{ClientInfo, TranIndex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterClientArgs {
    pub user: String,
    pub is_dba: bool,
    pub maintenance_allowed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeHaModeArgs {
    pub state: String,
    pub force: bool,
    pub timeout_s: u64,
    pub heartbeat: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavepointArgs {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddVolumeArgs {
    /// Page count as a literal; coerced to INT server-side.
    pub pages: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetInterruptArgs {
    pub on: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchArgs {
    pub volid: i16,
    pub pageid: i32,
    pub slotid: i16,
}

/// A typed literal: the wire form of one value plus its target domain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RowLiteral {
    pub literal: String,
    pub kind: DomainKind,
    pub precision: i32,
    pub scale: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForceArgs {
    pub rows: Vec<RowLiteral>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodInvokeArgs {
    pub method: String,
    pub args: Vec<RowLiteral>,
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ServiceError> {
    rmp_serde::from_slice(payload)
        .map_err(|e| ServiceError::new(ErrorCode::InvalidLiteral, format!("bad argument: {}", e)))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ServiceError> {
    rmp_serde::to_vec(value)
        .map_err(|e| ServiceError::new(ErrorCode::Internal, format!("encode failed: {}", e)))
}

fn require_tran(conn: &Arc<Connection>) -> Result<TranIndex, ServiceError> {
    conn.tran()
        .ok_or_else(|| ServiceError::new(ErrorCode::Internal, "connection has no transaction"))
}

fn coercion_code(status: CastStatus) -> ErrorCode {
    match status {
        CastStatus::Overflow => ErrorCode::CoercionOverflow,
        CastStatus::Truncated => ErrorCode::CoercionTruncated,
        CastStatus::Incompatible => ErrorCode::CoercionIncompatible,
        _ => ErrorCode::InvalidLiteral,
    }
}

/// Coerce one wire literal into its declared domain. Honors the
/// return-NULL-on-function-errors parameter: with it on, a failed coercion
/// degrades to a typed NULL instead of failing the request.
fn coerce_literal(
    d: &Dispatcher,
    row: &RowLiteral,
) -> Result<Value, ServiceError> {
    let registry = &d.deps.registry;
    let target = registry.construct(row.kind, None, row.precision, row.scale, Vec::new());
    let src = Value::string(
        registry.resolve_default(DomainKind::Varchar),
        row.literal.as_str(),
    );
    let opts = CastOpts {
        tz: d.deps.tz,
        preserve_domain: true,
        ..CastOpts::default()
    };
    let out = cast(&src, &target, &opts);
    if out.status.ok() {
        return Ok(out.value);
    }
    if d.deps.params.null_on_function_errors {
        debug!(target: "oxbow",
               "coercion of {:?} failed ({:?}); degrading to NULL", row.literal, out.status);
        return Ok(Value::null_of(target));
    }
    Err(ServiceError::new(
        coercion_code(out.status),
        format!("cannot coerce {:?} to {:?}", row.literal, row.kind),
    ))
}

pub fn server_ping(
    _d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    payload: &[u8],
) -> HandlerResult {
    conn.send_reply(rid, payload.to_vec());
    Ok(())
}

pub fn boot_register_client(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    payload: &[u8],
) -> HandlerResult {
    let args: RegisterClientArgs = decode(payload)?;
    let client = ClientInfo {
        client_id: conn.client_id(),
        user: args.user,
        host: String::from("localhost"),
        is_dba: args.is_dba,
        maintenance_allowed: args.maintenance_allowed || args.is_dba,
    };
    let t = d.deps.log.register_client(client).map_err(|e| ServiceError {
        code: ErrorCode::TranTablePressure,
        err: e,
    })?;
    conn.set_tran(Some(t));
    conn.set_session(Session::new(t.0 as u64));
    conn.send_reply(rid, encode(&t.0)?);
    Ok(())
}

pub fn boot_unregister_client(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    if let Some(t) = conn.tran() {
        d.deps.log.unregister_client(t);
        conn.set_tran(None);
    }
    conn.send_reply(rid, &b"ok"[..]);
    Ok(())
}

pub fn boot_backup(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    // a backup begins from a checkpoint-consistent log
    d.deps.log.checkpoint();
    conn.send_reply(rid, &b"backup-started"[..]);
    Ok(())
}

pub fn boot_add_volume_extension(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    payload: &[u8],
) -> HandlerResult {
    let args: AddVolumeArgs = decode(payload)?;
    let row = RowLiteral {
        literal: args.pages,
        kind: DomainKind::Int,
        precision: -1,
        scale: 0,
    };
    let pages = match coerce_literal(d, &row)? {
        Value::Int(v) => v,
        _ => 0,
    };
    if pages <= 0 {
        return Err(ServiceError::new(
            ErrorCode::InvalidLiteral,
            "volume extension needs a positive page count",
        ));
    }
    conn.send_reply(rid, encode(&pages)?);
    Ok(())
}

pub fn boot_change_ha_mode(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    payload: &[u8],
) -> HandlerResult {
    let args: ChangeHaModeArgs = decode(payload)?;
    let state = match args.state.as_str() {
        "active" => ServerState::Active,
        "standby" => ServerState::Standby,
        "maintenance" => ServerState::Maintenance,
        "idle" => ServerState::Idle,
        other => {
            return Err(ServiceError::new(
                ErrorCode::WrongServerState,
                format!("unknown server state {:?}", other),
            ))
        }
    };
    d.deps
        .ha
        .change_server_state(
            state,
            args.force,
            Duration::from_secs(args.timeout_s),
            args.heartbeat,
        )
        .map_err(|e| ServiceError {
            code: ErrorCode::IllegalTransition,
            err: e,
        })?;
    conn.send_reply(rid, d.deps.ha.current().name().as_bytes().to_vec());
    Ok(())
}

pub fn boot_notify_log_applier_state(
    _d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    conn.send_reply(rid, &b"ok"[..]);
    Ok(())
}

pub fn tran_server_commit(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    let t = require_tran(conn)?;
    d.deps.log.commit(t).map_err(ServiceError::from)?;
    // commit coalescing: nudge the log flusher for an immediate flush
    if d.deps.params.group_commit_active() {
        if let Some(daemons) = d.deps.daemons.read().clone() {
            daemons.wake_log_flush_force();
        }
    }
    conn.send_reply(rid, &b"commit-ok"[..]);
    Ok(())
}

pub fn tran_server_abort(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    let t = require_tran(conn)?;
    d.deps.log.abort(t).map_err(ServiceError::from)?;
    conn.send_reply(rid, &b"abort-ok"[..]);
    Ok(())
}

pub fn tran_server_savepoint(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    payload: &[u8],
) -> HandlerResult {
    let _t = require_tran(conn)?;
    let args: SavepointArgs = decode(payload)?;
    // savepoint names live in a bounded identifier domain
    let row = RowLiteral {
        literal: args.name,
        kind: DomainKind::Varchar,
        precision: 64,
        scale: 0,
    };
    let name = coerce_literal(d, &row)?;
    if name.is_null() {
        return Err(ServiceError::new(
            ErrorCode::InvalidLiteral,
            "savepoint name does not fit the identifier domain",
        ));
    }
    conn.send_reply(rid, &b"savepoint-ok"[..]);
    Ok(())
}

pub fn tran_server_has_updated(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    let t = require_tran(conn)?;
    let updated = d.deps.log.has_updated(t);
    conn.send_reply(rid, vec![updated as u8]);
    Ok(())
}

pub fn tran_local_tran_id(
    _d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    let t = require_tran(conn)?;
    conn.send_reply(rid, encode(&t.0)?);
    Ok(())
}

pub fn log_checkpoint(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    match d.deps.daemons.read().clone() {
        Some(daemons) => daemons.wake_checkpoint(),
        None => d.deps.log.checkpoint(),
    }
    conn.send_reply(rid, &b"checkpoint-scheduled"[..]);
    Ok(())
}

pub fn log_set_interrupt(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    payload: &[u8],
) -> HandlerResult {
    let t = require_tran(conn)?;
    let args: SetInterruptArgs = decode(payload)?;
    d.deps.log.set_interrupt(t, args.on);
    conn.send_reply(rid, &b"ok"[..]);
    Ok(())
}

pub fn log_dump_stat(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    use std::sync::atomic::Ordering;
    let stats = (
        d.deps.stats.requests.load(Ordering::Relaxed),
        d.deps.stats.diagnostic_requests.load(Ordering::Relaxed),
        d.deps.locks.dump_state(),
    );
    conn.send_reply(rid, encode(&stats)?);
    Ok(())
}

pub fn loc_fetch(
    d: &Dispatcher,
    ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    payload: &[u8],
) -> HandlerResult {
    let args: FetchArgs = decode(payload)?;
    let oid = Oid::new(args.volid, args.pageid, args.slotid);
    // the fetched object's identity crosses the coercion engine like any
    // other value
    let target = d.deps.registry.resolve_default(DomainKind::Object);
    let coerced = cast(&Value::Oid(oid), &target, &CastOpts::default());
    if !coerced.status.ok() {
        return Err(ServiceError::new(
            coercion_code(coerced.status),
            "object identity does not coerce",
        ));
    }
    // model the page pin this fetch holds; the track frame releases it even
    // if we never get here again
    ctx.track(Box::new(move || {
        debug!(target: "oxbow", "released page fix for {:?}", oid);
    }));
    conn.send_reply(rid, encode(&args)?);
    Ok(())
}

pub fn loc_force(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    payload: &[u8],
) -> HandlerResult {
    let t = require_tran(conn)?;
    let args: ForceArgs = decode(payload)?;
    let mut forced = 0u32;
    for row in &args.rows {
        let value = coerce_literal(d, row)?;
        if !value.is_null() {
            forced += 1;
        }
    }
    if forced > 0 {
        d.deps.log.note_update(t);
        // dirtied pages make flush victims
        if let Some(daemons) = d.deps.daemons.read().clone() {
            daemons.wake_page_flush();
        }
    }
    conn.send_reply(rid, encode(&forced)?);
    Ok(())
}

pub fn ha_server_state(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    conn.send_reply(rid, d.deps.ha.current().name().as_bytes().to_vec());
    Ok(())
}

pub fn session_end(
    _d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    _payload: &[u8],
) -> HandlerResult {
    if let Some(session) = conn.session() {
        session.stop_attached_threads();
    }
    conn.send_reply(rid, &b"session-ended"[..]);
    Ok(())
}

pub fn method_invoke(
    d: &Dispatcher,
    _ctx: &ThreadContext,
    conn: &Arc<Connection>,
    rid: u32,
    payload: &[u8],
) -> HandlerResult {
    let args: MethodInvokeArgs = decode(payload)?;
    let mut coerced = Vec::with_capacity(args.args.len());
    for row in &args.args {
        coerced.push(coerce_literal(d, row)?);
    }
    let mut callout = d.deps.methods.claim().map_err(|e| ServiceError {
        code: ErrorCode::WorkerExhausted,
        err: e,
    })?;
    let outcome = callout.invoke(args.method.as_bytes());
    // an errored callout is killed instead of pooled
    d.deps.methods.retire(callout, outcome.is_err());
    let result = outcome.map_err(ServiceError::from)?;
    debug!(target: "oxbow",
           "method {:?} ran over {} coerced args", args.method, coerced.len());
    conn.send_reply(rid, result);
    Ok(())
}
