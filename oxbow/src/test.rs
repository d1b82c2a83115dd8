use crate::Server;
use oxbow_base::SystemParams;
use oxbow_ha::ServerState;
use oxbow_net::{FrameBody, Opcode, QueuePeer};
use oxbow_txn::LogManager;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use test_log::test;

fn small_server() -> Server {
    let mut p = SystemParams::default();
    p.workers = 2;
    Server::boot("unit", p).expect("boots")
}

fn mp<T: Serialize>(value: &T) -> Vec<u8> {
    rmp_serde::to_vec(value).expect("encodes")
}

#[derive(Serialize)]
struct RegisterArgs {
    user: String,
    is_dba: bool,
    maintenance_allowed: bool,
}

fn await_reply(peer: &Arc<QueuePeer>) -> FrameBody {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(frame) = peer.take() {
            return frame.body;
        }
        if Instant::now() > deadline {
            panic!("no frame arrived");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_end_to_end_request_flow() {
    let server = small_server();
    let (conn, peer) = server.accept();

    let register = mp(&RegisterArgs {
        user: String::from("e2e"),
        is_dba: false,
        maintenance_allowed: false,
    });
    server
        .submit(&conn, 1, Opcode::BoRegisterClient.code(), register)
        .expect("submits");
    assert!(matches!(await_reply(&peer), FrameBody::Reply(_)));
    let tran = conn.tran().expect("registered");

    server
        .submit(&conn, 2, Opcode::Ping.code(), b"hello".to_vec())
        .expect("submits");
    match await_reply(&peer) {
        FrameBody::Reply(p) => assert_eq!(p, b"hello"),
        other => panic!("expected reply, got {:?}", other),
    }

    server.connection_down(&conn);
    assert!(server.log().find_client(tran).is_none());

    server.request_shutdown();
    server.stop();
}

#[test]
fn test_shutdown_request_stops_lifecycle() {
    let server = Arc::new(small_server());
    let (conn, peer) = server.accept();

    let register = mp(&RegisterArgs {
        user: String::from("operator"),
        is_dba: false,
        maintenance_allowed: false,
    });
    server
        .submit(&conn, 1, Opcode::BoRegisterClient.code(), register)
        .expect("submits");
    assert!(matches!(await_reply(&peer), FrameBody::Reply(_)));

    let waiter = {
        let server = server.clone();
        std::thread::spawn(move || {
            server.wait_for_shutdown();
        })
    };
    server
        .submit(&conn, 2, Opcode::Shutdown.code(), Vec::new())
        .expect("submits");
    waiter.join().expect("lifecycle unblocks");
    assert!(server.is_shutting_down());
    server.stop();
}

#[test]
fn test_ha_promotion_through_server() {
    let server = small_server();
    assert_eq!(server.ha().current(), ServerState::Idle);
    server
        .ha()
        .change_server_state(ServerState::Standby, false, Duration::ZERO, true)
        .expect("to standby");
    assert!(!server.log().is_update_allowed());
    server
        .ha()
        .change_server_state(ServerState::Active, false, Duration::ZERO, true)
        .expect("to active");
    assert_eq!(server.ha().current(), ServerState::Active);
    assert!(server.log().is_update_allowed());
    server.request_shutdown();
    server.stop();
}
