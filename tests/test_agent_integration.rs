//! End-to-end tests over the real socket fabric
//!
//! Each test runs a full agent (router, dealer, worker pool, push
//! bridge, ZAP handler) against the engine simulator and talks to it
//! through authenticated Curve clients.


use otagent::constants::{settings as keys, version};
use otagent::keys::CurveKeys;
use otagent::rpc::{CommandPayload, PushKind, RpcCommand, RpcPush};
use otagent::types::{AccountId, ConnectionId, NymId};
use std::time::Duration;
use test_helpers::AgentFixture;

#[test]
fn test_add_client_session_increments_persisted_count() {
    let fixture = AgentFixture::start();
    let client = fixture.connect_client(b"client-a");

    client.send(&RpcCommand::bare(0, CommandPayload::AddClientSession));
    let reply = client.recv_reply().expect("reply");

    assert!(reply.succeeded());
    assert_eq!(fixture.agent.settings().client_sessions(), 1);
    assert_eq!(
        fixture
            .agent
            .settings()
            .get_int(keys::SECTION, keys::CLIENTS),
        1
    );

    // The new session joins the refresh rotation
    let schedules = fixture.engine.schedules();
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].client_index, 0);
    assert_eq!(fixture.engine.refreshed(), vec![0]);
}

#[test]
fn test_create_nym_then_nym_push_reaches_creator() {
    let fixture = AgentFixture::start();
    fixture.engine.queue_nym_id("N1");
    let client = fixture.connect_client(b"client-a");

    client.send(&RpcCommand::bare(
        0,
        CommandPayload::CreateNym {
            name: "alice".to_string(),
        },
    ));
    let reply = client.recv_reply().expect("reply");
    assert!(reply.succeeded());
    assert_eq!(reply.identifiers, vec!["N1".to_string()]);

    fixture
        .engine
        .emit_nym_event("N1", b"hello", b"inst-0")
        .expect("emit");

    let push = client.recv_push().expect("push");
    assert_eq!(push, vec![b"hello".to_vec(), b"inst-0".to_vec()]);
}

#[test]
fn test_send_payment_task_completion_push() {
    let fixture = AgentFixture::start();
    // Session 4 is client index 2
    fixture
        .engine
        .set_account_owner(2, AccountId::new("A"), NymId::new("NymX"));
    fixture.engine.queue_task_id("T1");

    let client = fixture.connect_client(b"client-a");
    client.send(&RpcCommand::bare(
        4,
        CommandPayload::SendPayment {
            source_account: AccountId::new("A"),
        },
    ));

    let reply = client.recv_reply().expect("reply");
    assert!(reply.queued());
    assert_eq!(reply.first_task().unwrap().id.as_str(), "T1");
    assert_eq!(fixture.agent.associations().pending_tasks(), 1);

    fixture.engine.complete_task("T1", true).expect("complete");

    let push = client.recv_push().expect("push");
    assert_eq!(push.len(), 1);
    let payload: RpcPush = otagent::rpc::decode("push", &push[0]).expect("decode push");
    assert_eq!(payload.version, version::RPC_PUSH);
    assert_eq!(payload.kind, PushKind::Task);
    assert_eq!(payload.id, "NymX");

    let complete = payload.task_complete.expect("task complete");
    assert_eq!(complete.version, version::TASK_COMPLETE);
    assert_eq!(complete.id.as_str(), "T1");
    assert!(complete.result);

    // Delivered exactly once, association gone
    assert_eq!(fixture.agent.associations().pending_tasks(), 0);
    fixture.engine.complete_task("T1", true).expect("complete");
    client.expect_silence(Duration::from_millis(300));
}

#[test]
fn test_push_for_unknown_task_is_dropped() {
    let fixture = AgentFixture::start();
    let client = fixture.connect_client(b"client-a");

    // Establish the connection so silence is meaningful
    client.send(&RpcCommand::bare(0, CommandPayload::ListNyms));
    client.recv_reply().expect("reply");

    fixture
        .engine
        .complete_task("T-unknown", true)
        .expect("complete");

    client.expect_silence(Duration::from_millis(300));
}

#[test]
fn test_wrong_curve_key_reaches_no_worker() {
    let fixture = AgentFixture::start();
    let intruder_keys = CurveKeys::generate().expect("keys");
    let intruder = fixture.connect_client_with_keys(b"intruder", &intruder_keys);

    intruder.send(&RpcCommand::bare(0, CommandPayload::ListNyms));
    intruder.expect_silence(Duration::from_millis(500));

    assert_eq!(fixture.engine.rpc_count(), 0);

    // The trusted key still gets through
    let client = fixture.connect_client(b"client-a");
    client.send(&RpcCommand::bare(0, CommandPayload::ListNyms));
    assert!(client.recv_reply().is_some());
    assert_eq!(fixture.engine.rpc_count(), 1);
}

#[test]
fn test_routing_identity_recorded_in_associations() {
    let fixture = AgentFixture::start();
    let client = fixture.connect_client(b"client-a");

    let mut command = RpcCommand::bare(0, CommandPayload::ListNyms);
    command.associate_nym.push(NymId::new("N-routed"));
    client.send(&command);
    client.recv_reply().expect("reply");

    // The identity the worker saw is the router's identity for this
    // client
    assert_eq!(
        fixture
            .agent
            .associations()
            .lookup_nym(&NymId::new("N-routed"))
            .expect("association"),
        ConnectionId::from(&b"client-a"[..])
    );
}

#[test]
fn test_each_client_receives_its_own_reply() {
    let fixture = AgentFixture::start();
    fixture.engine.queue_nym_id("NA");

    let client_a = fixture.connect_client(b"client-a");
    let client_b = fixture.connect_client(b"client-b");

    client_a.send(&RpcCommand::bare(
        0,
        CommandPayload::CreateNym {
            name: "a".to_string(),
        },
    ));
    client_b.send(&RpcCommand::bare(0, CommandPayload::ListNyms));

    let reply_a = client_a.recv_reply().expect("reply a");
    let reply_b = client_b.recv_reply().expect("reply b");

    assert_eq!(reply_a.identifiers, vec!["NA".to_string()]);
    assert!(reply_b.identifiers.is_empty());

    // Exactly one reply each
    client_a.expect_silence(Duration::from_millis(200));
    client_b.expect_silence(Duration::from_millis(200));
}

#[test]
fn test_nym_association_survives_second_connection() {
    let fixture = AgentFixture::start();

    let client_a = fixture.connect_client(b"client-a");
    let mut command = RpcCommand::bare(0, CommandPayload::ListNyms);
    command.associate_nym.push(NymId::new("N-shared"));
    client_a.send(&command);
    client_a.recv_reply().expect("reply a");

    // A second connection tries to claim the same nym
    let client_b = fixture.connect_client(b"client-b");
    let mut command = RpcCommand::bare(0, CommandPayload::ListNyms);
    command.associate_nym.push(NymId::new("N-shared"));
    client_b.send(&command);
    client_b.recv_reply().expect("reply b");

    fixture
        .engine
        .emit_nym_event("N-shared", b"payload", b"inst-1")
        .expect("emit");

    let push = client_a.recv_push().expect("push to first connection");
    assert_eq!(push[0], b"payload");
    client_b.expect_silence(Duration::from_millis(300));
}

#[test]
fn test_push_for_unknown_nym_is_dropped() {
    let fixture = AgentFixture::start();
    let client = fixture.connect_client(b"client-a");
    client.send(&RpcCommand::bare(0, CommandPayload::ListNyms));
    client.recv_reply().expect("reply");

    fixture
        .engine
        .emit_nym_event("N-nobody", b"payload", b"inst-2")
        .expect("emit");

    client.expect_silence(Duration::from_millis(300));
}

#[test]
fn test_startup_persists_key_material() {
    let fixture = AgentFixture::start();
    let settings = fixture.agent.settings();

    for key in [
        keys::SERVER_PRIVKEY,
        keys::SERVER_PUBKEY,
        keys::CLIENT_PRIVKEY,
        keys::CLIENT_PUBKEY,
    ] {
        let value = settings
            .get_string(keys::SECTION, key)
            .unwrap_or_else(|| panic!("{} missing", key));
        assert!(!value.is_empty());
    }

    assert_eq!(
        settings.get_string(keys::SECTION, keys::CLIENT_PUBKEY).unwrap(),
        fixture.keys.client.public_z85()
    );

    // And the file itself reflects it
    let raw = std::fs::read_to_string(fixture.settings_path()).expect("settings file");
    assert!(raw.contains("[otagent]"));
    assert!(raw.contains("client_pubkey"));
}

#[test]
fn test_session_counts_survive_restart_file() {
    let fixture = AgentFixture::with_sessions(2, 1);

    assert_eq!(fixture.engine.started_clients(), vec![0, 1]);
    assert_eq!(fixture.engine.started_servers(), vec![0]);
    assert_eq!(fixture.agent.settings().client_sessions(), 2);
    assert_eq!(fixture.agent.settings().server_sessions(), 1);

    // Both boot clients refresh and get scheduled
    assert_eq!(fixture.engine.refreshed(), vec![0, 1]);
    assert_eq!(fixture.engine.schedules().len(), 2);
}
