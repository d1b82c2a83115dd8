use crate::dispatch::RequestJob;
use crate::opcode::Opcode;
use crate::test::{connect, rig, rig_with_params};
use oxbow_base::SystemParams;
use oxbow_thread::{ResumeReason, SuspendCause, ThreadContext, ThreadKind, ThreadStatus, WorkerPool};
use oxbow_txn::LogManager;
use std::sync::Arc;
use std::time::Duration;
use test_log::test;

/// Connection-down runs on the transport's system context, never on a pool
/// worker's.
fn sys_ctx() -> ThreadContext {
    ThreadContext::new(0, ThreadKind::System)
}

/// A pool whose handler parks the worker in a chosen wait, so drain paths
/// can be exercised against real suspended workers.
fn parked_pool(
    workers: usize,
    cause: SuspendCause,
) -> Arc<WorkerPool<RequestJob>> {
    let mut p = SystemParams::default();
    p.workers = workers;
    WorkerPool::start(
        Arc::new(p),
        Arc::new(move |ctx, job: RequestJob| {
            ctx.bind(
                job.conn.client_id(),
                job.rid,
                job.conn.tran(),
                job.op,
            );
            ctx.suspend_until(cause);
            job.conn.finish_pending_request();
        }),
    )
}

#[test]
fn test_conn_down_waits_out_lock_waiters() {
    let rig = rig();
    let (conn, _peer, tran) = connect(&rig, 30, false);
    let pool = parked_pool(2, SuspendCause::Lock);
    *rig.dispatcher.deps.pool.write() = Some(pool.clone());

    // one in-flight request, its worker parked in an uninterruptible
    // lock wait
    rig.dispatcher
        .submit(RequestJob {
            conn: conn.clone(),
            rid: 50,
            op: Opcode::Ping.code(),
            payload: Some(Vec::new()),
            size: 0,
        })
        .expect("submits");
    while pool.count_workers_for(tran, 30) == 0 {
        std::thread::yield_now();
    }
    let waiter = pool
        .find_waiter_for(tran, usize::MAX)
        .expect("worker parked");

    let drain_conn = conn.clone();
    let dispatcher = rig.dispatcher.clone();
    let drain = std::thread::spawn(move || {
        let c = sys_ctx();
        dispatcher.conn_down(&c, &drain_conn);
    });

    // the drain sets the interrupt but must not wake a lock waiter
    std::thread::sleep(Duration::from_millis(150));
    assert!(rig.log.is_interrupted(tran));
    assert_eq!(waiter.status(), ThreadStatus::Wait, "lock wait left alone");
    assert!(!drain.is_finished(), "drain still waiting on the worker");

    // the lock manager times the wait out; drain completes
    waiter.wake(ResumeReason::Timeout);
    drain.join().expect("drain joins");

    assert_eq!(pool.count_workers_for(tran, 30), 0);
    assert!(rig.log.find_client(tran).is_none(), "client unregistered");
    assert!(!rig.log.is_interrupted(tran), "interrupt cleared at the end");
}

#[test]
fn test_conn_down_wakes_interruptible_waiters() {
    let rig = rig();
    let (conn, _peer, tran) = connect(&rig, 31, false);
    let pool = parked_pool(2, SuspendCause::LogWriter);
    *rig.dispatcher.deps.pool.write() = Some(pool.clone());

    rig.dispatcher
        .submit(RequestJob {
            conn: conn.clone(),
            rid: 51,
            op: Opcode::Ping.code(),
            payload: Some(Vec::new()),
            size: 0,
        })
        .expect("submits");
    while pool.count_workers_for(tran, 31) == 0 {
        std::thread::yield_now();
    }

    // interruptible wait: the drain path wakes it on its own
    let c = sys_ctx();
    rig.dispatcher.conn_down(&c, &conn);

    assert_eq!(pool.count_workers_for(tran, 31), 0);
    assert!(rig.log.find_client(tran).is_none());
    assert_eq!(c.status(), ThreadStatus::Run, "drain context restored");
    assert_eq!(c.bound().client_id, -1);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "pending-request")]
fn test_drain_pending_exhaustion_asserts() {
    let mut params = SystemParams::default();
    params.pending_request_retries = 3;
    let rig = rig_with_params(params);
    let (conn, _peer, _tran) = connect(&rig, 32, false);
    let pool = parked_pool(1, SuspendCause::LogWriter);
    *rig.dispatcher.deps.pool.write() = Some(pool);

    // a pending request that no worker will ever pick up
    conn.add_pending_request();
    let c = sys_ctx();
    rig.dispatcher.conn_down(&c, &conn);
}
