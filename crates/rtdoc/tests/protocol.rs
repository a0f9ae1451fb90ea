mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::TestServer;
use rtdoc::document::RejectOnExhaustion;
use rtdoc::json::{self, JsonValue};
use rtdoc::{DocumentStore, MemoryBudget, ServerConfig};

#[test]
fn add_then_get_on_one_connection() {
    let server = TestServer::start();
    let mut conn = server.connect();

    assert_eq!(conn.request(r#"add doc {"a":1}"#), "ok");
    assert_eq!(conn.request("get doc"), r#"{"a":1}"#);
}

#[test]
fn unknown_verb_keeps_connection_open() {
    let server = TestServer::start();
    let mut conn = server.connect();

    assert_eq!(conn.request("bogus"), "Invalid command bogus");
    assert_eq!(conn.request("ping"), "pong");
}

#[test]
fn document_lifecycle() {
    let server = TestServer::start();
    let mut conn = server.connect();

    assert_eq!(conn.request("get k"), "nil");
    assert_eq!(conn.request("add k {}"), "ok");
    assert_eq!(conn.request("get k"), "{}");
    assert_eq!(conn.request("exists k"), "true");
    assert_eq!(conn.request("remove k"), "ok");
    assert_eq!(conn.request("get k"), "nil");
    assert_eq!(conn.request("remove k"), "ok");
}

#[test]
fn malformed_json_is_nil() {
    let server = TestServer::start();
    let mut conn = server.connect();

    assert_eq!(conn.request(r#"add doc {"a":}"#), "nil");
    assert_eq!(conn.request("add doc [1, 2"), "nil");
    assert_eq!(conn.request("size"), "0");
}

#[test]
fn documents_are_shared_between_connections() {
    let server = TestServer::start();
    let mut writer = server.connect();
    let mut reader = server.connect();

    assert_eq!(writer.request(r#"add shared ["x", 2.5, null]"#), "ok");
    assert_eq!(reader.request("get shared"), r#"["x",2.5,null]"#);
    assert_eq!(reader.request("keys"), r#"["shared"]"#);
}

#[test]
fn collaborator_lifecycle() {
    let server = TestServer::start();
    let mut conn = server.connect();

    assert_eq!(conn.request("start k u1"), "nil");
    conn.request("add k {}");
    assert_eq!(conn.request("start k u1"), "ok");
    assert_eq!(conn.request("start k u2"), "ok");
    assert_eq!(conn.request("end k u1"), "ok");

    let collaborators = server.store.collaborators("k").unwrap();
    assert_eq!(collaborators.len(), 1);
    assert_eq!(collaborators[0].user_id(), "u2");

    // Re-adding the document resets its sessions
    conn.request("add k []");
    assert!(server.store.collaborators("k").unwrap().is_empty());
}

#[test]
fn wrong_arity_and_stubs() {
    let server = TestServer::start();
    let mut conn = server.connect();

    assert_eq!(conn.request("add doc"), "Wrong number of arguments for 'add'");
    assert_eq!(conn.request("end"), "Wrong number of arguments for 'end'");
    conn.request("add doc 1");
    assert_eq!(conn.request("modify doc u1 set a 2"), "ok");
    assert_eq!(conn.request("update doc u1 set a 3"), "ok");
    assert_eq!(conn.request("get doc"), "1");
    assert_eq!(conn.request("save"), "not implemented");
}

#[test]
fn line_endings_and_blank_lines() {
    let server = TestServer::start();
    let mut conn = server.connect();

    conn.send_raw(b"\n   \r\nping\r\nadd doc \"a\"\r\nget doc\n");
    assert_eq!(conn.recv(), "pong");
    assert_eq!(conn.recv(), "ok");
    assert_eq!(conn.recv(), r#""a""#);
}

#[test]
fn oversized_request_is_rejected_once() {
    let server = TestServer::start();
    let mut conn = server.connect();

    let payload = "x".repeat(10_000);
    conn.send(&format!("add big \"{payload}\""));
    assert_eq!(conn.recv(), "Request too large");
    assert_eq!(conn.request("ping"), "pong");
    assert_eq!(conn.request("exists big"), "false");
}

#[test]
fn request_split_across_packets() {
    let server = TestServer::start();
    let mut conn = server.connect();

    conn.send_raw(b"add doc {\"a\"");
    thread::sleep(Duration::from_millis(60));
    conn.send_raw(b": [1, 2]}\n");
    assert_eq!(conn.recv(), "ok");
    assert_eq!(conn.request("get doc"), r#"{"a":[1,2]}"#);
}

#[test]
fn client_list_and_kill() {
    let server = TestServer::start();
    let mut admin = server.connect();
    let mut victim = server.connect();
    assert_eq!(victim.request("ping"), "pong");

    let listed = json::parse(&admin.request("client-list")).unwrap();
    let peers: Vec<_> = listed
        .as_array()
        .unwrap()
        .iter()
        .filter_map(JsonValue::as_str)
        .map(str::to_string)
        .collect();
    let victim_addr = victim.local_addr();
    assert!(peers.contains(&victim_addr.to_string()));
    assert_eq!(peers.len(), 2);

    let kill = format!("client-kill {} {}", victim_addr.ip(), victim_addr.port());
    assert_eq!(admin.request(&kill), "ok");
    assert!(victim.is_closed());

    // The victim's worker unregisters it shortly after the socket closes
    let deadline = Instant::now() + Duration::from_secs(5);
    while admin.request("client-list").contains(',') {
        assert!(Instant::now() < deadline, "killed client still listed");
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(admin.request(&kill), "nil");
}

#[test]
fn concurrent_sessions_on_one_key() {
    let server = TestServer::with_config(ServerConfig {
        max_clients: 4,
        ..ServerConfig::default()
    });
    server.connect().request("add shared {}");

    let addr = server.addr;
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            thread::spawn(move || {
                let mut conn = common::Connection::open(addr);
                let user = format!("user-{worker}");
                for round in 0..50 {
                    assert_eq!(conn.request(&format!("start shared {user}")), "ok");
                    if round % 2 == 0 {
                        assert_eq!(conn.request(&format!("end shared {user}")), "ok");
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(server.store.collaborators("shared").unwrap().len(), 4 * 25);
}

#[test]
fn worker_pool_caps_concurrent_sessions() {
    let server = TestServer::with_config(ServerConfig {
        max_clients: 1,
        ..ServerConfig::default()
    });
    let mut first = server.connect();
    assert_eq!(first.request("ping"), "pong");

    // The only worker is busy with the first client
    let mut second = server.connect();
    second.send("ping");
    second
        .stream
        .set_read_timeout(Some(Duration::from_millis(150)))
        .unwrap();
    let mut buf = [0u8; 1];
    assert!(std::io::Read::read(&mut second.stream, &mut buf).is_err());

    drop(first);
    second
        .stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(second.recv(), "pong");
}

#[test]
fn idle_connections_are_closed() {
    let server = TestServer::with_config(ServerConfig {
        idle_timeout: Some(Duration::from_millis(100)),
        ..ServerConfig::default()
    });
    let mut conn = server.connect();
    assert_eq!(conn.request("ping"), "pong");

    let started = Instant::now();
    assert!(conn.is_closed());
    assert!(started.elapsed() >= Duration::from_millis(80));
}

#[test]
fn pause_delays_other_clients() {
    let server = TestServer::start();
    let mut admin = server.connect();
    let mut other = server.connect();

    assert_eq!(admin.request("pause 300"), "ok");
    let started = Instant::now();
    assert_eq!(other.request("ping"), "pong");
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[test]
fn rejected_allocation_is_nil() {
    let store = Arc::new(DocumentStore::with_budget(MemoryBudget::with_limit(
        512,
        RejectOnExhaustion,
    )));
    let server = TestServer::with_store(ServerConfig::default(), store);
    let mut conn = server.connect();

    let large = format!("add doc \"{}\"", "y".repeat(1024));
    assert_eq!(conn.request(&large), "nil");
    assert_eq!(conn.request("add doc 1"), "ok");
}

#[test]
fn shutdown_closes_connected_clients() {
    let mut server = TestServer::start();
    let mut conn = server.connect();
    assert_eq!(conn.request("ping"), "pong");

    server.stop();
    assert!(conn.is_closed());
}

#[tokio::test]
async fn tokio_client_session() {
    let server = TestServer::start();
    let stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();

    let input: &[u8] = b"ping\nadd doc {\"n\": 12e-1}\nget doc\nbogus\n";
    let mut output = Vec::new();
    rtdoc::client::run_session(stream, input, &mut output)
        .await
        .unwrap();

    assert_eq!(
        String::from_utf8(output).unwrap(),
        "pong\nok\n{\"n\":1.2}\nInvalid command bogus\n"
    );
}
