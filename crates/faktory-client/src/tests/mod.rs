//! Protocol client and worker tests against scripted and mocked transports.


use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::{Sequence, mock};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use self::support::{ManualClock, Script, ScriptedServer, block, ok};
use crate::protocol::PLAIN_GREETING;
use crate::{
    BeatOutcome, ClientError, ConnectionState, FailureReport, HandlerError, HandshakeError,
    IDLE_PAUSE, Job, Liveness, ProtocolClient, ProtocolError, TransportError, Worker,
    WorkerIdentity,
};

mock! {
    Wire {}
    impl crate::Transport for Wire {
        fn connect(&mut self) -> Result<(), TransportError>;
        fn read_line(&mut self) -> Result<String, TransportError>;
        fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
        fn close(&mut self);
    }
}

const COOLJOB: &str = r#"{"jid":"j1","jobtype":"cooljob","args":[1,2]}"#;

#[fixture]
fn clock() -> ManualClock {
    ManualClock::new()
}

fn worker_on(server: ScriptedServer, clock: ManualClock) -> Worker<ScriptedServer, ManualClock> {
    let client = ProtocolClient::new(server).with_worker(WorkerIdentity::new("w1"));
    Worker::new(client).with_clock(clock)
}

fn failing(message: &'static str) -> impl Fn(&Job) -> Result<(), HandlerError> + Send {
    move |_job: &Job| Err(HandlerError::from(message))
}

fn succeeding(_job: &Job) -> Result<(), HandlerError> {
    Ok(())
}

// ── Handshake ──────────────────────────────────────────────────────────────

#[test]
fn producer_hello_carries_only_the_version() {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server);

    client.connect().expect("connect");

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(recorder.commands(), vec![String::from(r#"HELLO {"v":2}"#)]);
}

#[test]
fn worker_hello_carries_the_worker_identity() {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let identity = WorkerIdentity::new("w1").with_labels(vec![String::from("rust")]);
    let mut client = ProtocolClient::new(server).with_worker(identity);

    client.connect().expect("connect");

    assert_eq!(
        recorder.payloads("HELLO"),
        vec![json!({"wid": "w1", "labels": ["rust"], "v": 2})]
    );
}

#[test]
fn challenge_is_answered_with_iterated_hash() {
    let server = Script::new()
        .into_server()
        .with_greeting("+HI {\"v\":2,\"s\":\"abc\",\"i\":3}\r\n");
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server).with_password("s3cret");

    client.connect().expect("connect");

    let first = Sha256::digest(b"s3cretabc");
    let second = Sha256::digest(first);
    let third = Sha256::digest(second);
    assert_eq!(
        recorder.payloads("HELLO"),
        vec![json!({"pwdhash": hex::encode(third), "v": 2})]
    );
}

#[test]
fn challenge_without_password_fails_before_hello() {
    let server = Script::new()
        .into_server()
        .with_greeting("+HI {\"v\":2,\"s\":\"abc\",\"i\":3}\r\n");
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server);

    let error = client.connect().expect_err("password is required");

    assert!(matches!(
        error,
        ClientError::Handshake(HandshakeError::PasswordRequired)
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(recorder.commands().is_empty());
    assert_eq!(recorder.closes(), 1);
}

#[test]
fn wrong_password_is_reported() {
    let server = ScriptedServer::new(Box::new(|_line: &str| {
        vec![String::from("-ERR Invalid password\r\n")]
    }))
    .with_greeting("+HI {\"v\":2,\"s\":\"abc\",\"i\":3}\r\n");
    let mut client = ProtocolClient::new(server).with_password("wrong");

    let error = client.connect().expect_err("password is wrong");

    assert!(matches!(
        error,
        ClientError::Handshake(HandshakeError::InvalidPassword)
    ));
    assert!(!client.is_connected());
}

#[rstest]
#[case::unknown_greeting("+HI {\"v\":3}\r\n", "+OK\r\n")]
#[case::negative_hello(PLAIN_GREETING, "-ERR not today\r\n")]
fn failed_handshake_leaves_client_disconnected(#[case] greeting: &str, #[case] hello_reply: &str) {
    let reply = hello_reply.to_owned();
    let server = ScriptedServer::new(Box::new(move |_line: &str| vec![reply.clone()]))
        .with_greeting(greeting);
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server);

    let error = client.connect().expect_err("handshake must fail");

    assert!(matches!(error, ClientError::Handshake(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.closes(), 1);
}

#[test]
fn connect_twice_performs_one_handshake() {
    let mut transport = MockWire::new();
    let mut sequence = Sequence::new();
    transport
        .expect_connect()
        .once()
        .in_sequence(&mut sequence)
        .returning(|| Ok(()));
    transport
        .expect_read_line()
        .once()
        .in_sequence(&mut sequence)
        .returning(|| Ok(String::from(PLAIN_GREETING)));
    transport
        .expect_write()
        .withf(|bytes: &[u8]| bytes == b"HELLO {\"v\":2}\r\n")
        .once()
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    transport
        .expect_read_line()
        .once()
        .in_sequence(&mut sequence)
        .returning(|| Ok(String::from("+OK\r\n")));
    let mut client = ProtocolClient::new(transport);

    client.connect().expect("first connect");
    client.connect().expect("second connect");

    assert!(client.is_connected());
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let mut transport = MockWire::new();
    transport.expect_connect().once().returning(|| {
        Err(TransportError::Connect {
            endpoint: String::from("tcp://localhost:7419"),
            source: Arc::new(io::Error::from(io::ErrorKind::ConnectionRefused)),
        })
    });
    transport.expect_close().once().return_const(());
    let mut client = ProtocolClient::new(transport);

    let error = client.connect().expect_err("connect must fail");

    assert!(matches!(
        error,
        ClientError::Transport(TransportError::Connect { .. })
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[test]
fn close_returns_to_disconnected() {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server);
    client.connect().expect("connect");

    client.close();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.closes(), 1);
}

// ── Commands ───────────────────────────────────────────────────────────────

#[test]
fn commands_connect_lazily() {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server);

    assert!(client.ack("j1").expect("ack"));

    assert_eq!(recorder.connects(), 1);
    assert_eq!(recorder.verbs(), vec!["HELLO", "ACK"]);
    assert_eq!(recorder.payloads("ACK"), vec![json!({"jid": "j1"})]);
}

#[test]
fn pushed_jobs_come_back_from_fetch() {
    let queue: Arc<Mutex<VecDeque<String>>> = Arc::default();
    let server_queue = Arc::clone(&queue);
    let server = ScriptedServer::new(Box::new(move |line: &str| {
        let mut jobs = server_queue.lock().expect("queue lock");
        if let Some(payload) = line.strip_prefix("PUSH ") {
            jobs.push_back(payload.to_owned());
            return ok();
        }
        if line.starts_with("FETCH") {
            return jobs
                .pop_front()
                .map_or_else(|| vec![String::from("$-1\r\n")], |job| block(&job));
        }
        ok()
    }));
    let mut client = ProtocolClient::new(server);
    let job = Job::new("cooljob", vec![json!(1), json!("two"), json!({"three": 3})])
        .with_extra("retry", json!(5));

    assert!(client.push(&job).expect("push"));
    let fetched = client
        .fetch(&[String::from("default")])
        .expect("fetch")
        .expect("job available");

    assert_eq!(fetched.jid(), job.jid());
    assert_eq!(fetched.jobtype(), job.jobtype());
    assert_eq!(fetched.args(), job.args());
    assert_eq!(fetched.extra().get("retry"), Some(&json!(5)));
    assert_eq!(client.fetch(&[]).expect("second fetch"), None);
}

#[test]
fn negative_push_reply_is_false() {
    let server = ScriptedServer::new(Box::new(|line: &str| {
        if line.starts_with("PUSH") {
            vec![String::from("-ERR duplicate jid\r\n")]
        } else {
            ok()
        }
    }));
    let mut client = ProtocolClient::new(server);

    assert!(!client.push(&Job::new("cooljob", Vec::new())).expect("push"));
}

#[test]
fn fetch_sends_queues_in_order() {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server);

    client
        .fetch(&[String::from("critical"), String::from("default")])
        .expect("fetch");
    client.fetch(&[]).expect("fetch default");

    assert_eq!(
        recorder.commands(),
        vec![
            String::from(r#"HELLO {"v":2}"#),
            String::from("FETCH critical default"),
            String::from("FETCH default"),
        ]
    );
}

#[rstest]
#[case::zero(vec![String::from("$0\r\n")])]
#[case::nil(vec![String::from("$-1\r\n")])]
#[case::not_a_number(vec![String::from("$many\r\n")])]
#[case::status_line(vec![String::from("+OK\r\n")])]
fn fetch_without_payload_is_none(#[case] reply: Vec<String>) {
    let server = ScriptedServer::new(Box::new(move |line: &str| {
        if line.starts_with("FETCH") {
            reply.clone()
        } else {
            ok()
        }
    }));
    let mut client = ProtocolClient::new(server);

    assert_eq!(client.fetch(&[]).expect("fetch"), None);
}

#[test]
fn truncated_job_payload_is_a_protocol_error() {
    let server = ScriptedServer::new(Box::new(|line: &str| {
        if line.starts_with("FETCH") {
            vec![String::from("$99\r\n"), format!("{COOLJOB}\r\n")]
        } else {
            ok()
        }
    }));
    let mut client = ProtocolClient::new(server);

    assert!(matches!(
        client.fetch(&[]),
        Err(ClientError::Protocol(ProtocolError::LengthMismatch {
            expected: 99,
            ..
        }))
    ));
}

#[test]
fn fail_reports_the_jid_and_optional_cause() {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server);

    assert!(client.fail("j1").expect("fail"));
    assert!(
        client
            .fail_with("j2", &FailureReport::new("HandlerError", "boom"))
            .expect("fail with report")
    );

    assert_eq!(
        recorder.payloads("FAIL"),
        vec![
            json!({"jid": "j1"}),
            json!({"jid": "j2", "errtype": "HandlerError", "message": "boom"}),
        ]
    );
}

#[test]
fn heartbeat_requires_a_worker_identity() {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server);

    assert!(matches!(
        client.heartbeat(""),
        Err(ClientError::Protocol(ProtocolError::MissingWorkerId))
    ));
    assert!(recorder.commands().is_empty());
}

#[test]
fn heartbeat_reports_identity_memory_and_state() {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server).with_worker(WorkerIdentity::new("w1"));

    assert_eq!(
        client.heartbeat("quiet").expect("beat"),
        BeatOutcome::Acknowledged
    );

    let beats = recorder.payloads("BEAT");
    let beat = beats.first().expect("one heartbeat");
    assert_eq!(beat.get("wid"), Some(&json!("w1")));
    assert_eq!(beat.get("current_state"), Some(&json!("quiet")));
    assert!(beat.get("rss_kb").is_some_and(Value::is_u64));
}

#[rstest]
#[case::state_change(block(r#"{"state":"quiet"}"#), Some("quiet"))]
#[case::error_line(vec![String::from("-ERR unknown worker\r\n")], None)]
#[case::block_without_state(block(r#"{"other":1}"#), None)]
fn heartbeat_replies(#[case] reply: Vec<String>, #[case] state: Option<&str>) {
    let server = Script::new().beat(reply).into_server();
    let mut client = ProtocolClient::new(server).with_worker(WorkerIdentity::new("w1"));

    let outcome = client.heartbeat("").expect("beat");

    match state {
        Some(expected) => match outcome {
            BeatOutcome::StateChange(reply) => assert_eq!(reply.state(), expected),
            other => panic!("expected a state change, got {other:?}"),
        },
        None => assert_eq!(outcome, BeatOutcome::Rejected),
    }
}

#[test]
fn end_expects_no_reply() {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let mut client = ProtocolClient::new(server);
    client.connect().expect("connect");

    client.end().expect("end");

    assert_eq!(recorder.verbs(), vec!["HELLO", "END"]);
}

// ── Worker ─────────────────────────────────────────────────────────────────

#[rstest]
fn cooljob_is_executed_and_acknowledged(clock: ManualClock) {
    let server = Script::new().job(COOLJOB).beat_state("terminate").into_server();
    let recorder = server.recorder();
    let observed: Arc<Mutex<Vec<Value>>> = Arc::default();
    let sink = Arc::clone(&observed);
    let mut worker = worker_on(server, clock).with_heartbeat_interval(Duration::from_millis(1));
    worker.register("cooljob", move |job: &Job| -> Result<(), HandlerError> {
        sink.lock().expect("observed lock").extend_from_slice(job.args());
        Ok(())
    });

    worker.run().expect("run");

    assert_eq!(*observed.lock().expect("observed lock"), vec![json!(1), json!(2)]);
    assert_eq!(recorder.payloads("ACK"), vec![json!({"jid": "j1"})]);
    assert_eq!(recorder.count("FAIL"), 0);
}

#[rstest]
fn heartbeats_respect_the_interval(clock: ManualClock) {
    let server = Script::new().beat(ok()).beat(ok()).beat_state("terminate").into_server();
    let recorder = server.recorder();
    let mut worker = worker_on(server, clock.clone())
        .with_heartbeat_interval(Duration::from_millis(1));

    worker.run().expect("run");

    // Five idle pauses fit before more than 1ms has passed.
    let fetches = vec!["FETCH"; 5];
    let mut expected = vec!["HELLO"];
    expected.extend(&fetches);
    expected.push("BEAT");
    expected.extend(&fetches);
    expected.push("BEAT");
    expected.extend(&fetches);
    expected.extend(["BEAT", "END"]);
    assert_eq!(recorder.verbs(), expected);
    assert_eq!(clock.elapsed(), Duration::from_micros(3750));
}

#[rstest]
fn no_heartbeat_at_exactly_the_interval(clock: ManualClock) {
    let server = Script::new().beat_state("terminate").into_server();
    let recorder = server.recorder();
    let mut worker =
        worker_on(server, clock.clone()).with_heartbeat_interval(IDLE_PAUSE.saturating_mul(2));

    worker.run().expect("run");

    // Fetches at 0, 250 and 500 microseconds; the beat waits until 750.
    assert_eq!(
        recorder.verbs(),
        vec!["HELLO", "FETCH", "FETCH", "FETCH", "BEAT", "END"]
    );
    assert_eq!(clock.elapsed(), IDLE_PAUSE.saturating_mul(3));
}

#[rstest]
fn rejected_heartbeat_is_retried_without_waiting(clock: ManualClock) {
    let server = Script::new()
        .beat(vec![String::from("-ERR unknown worker\r\n")])
        .beat_state("terminate")
        .into_server();
    let recorder = server.recorder();
    let mut worker =
        worker_on(server, clock.clone()).with_heartbeat_interval(IDLE_PAUSE.saturating_mul(2));

    worker.run().expect("run");

    let verbs = recorder.verbs();
    let beats: Vec<usize> = verbs
        .iter()
        .enumerate()
        .filter(|(_, verb)| *verb == "BEAT")
        .map(|(index, _)| index)
        .collect();
    assert_eq!(beats.len(), 2);
    // Only the fetch of the rejected beat's own iteration separates the two.
    assert_eq!(beats, vec![4, 6]);
    assert_eq!(clock.elapsed(), IDLE_PAUSE.saturating_mul(4));
    assert_eq!(worker.liveness(), &Liveness::Terminate);
}

#[rstest]
fn quiet_worker_heartbeats_without_fetching(clock: ManualClock) {
    let server = Script::new().beat_state("quiet").beat_state("terminate").into_server();
    let recorder = server.recorder();
    let mut worker =
        worker_on(server, clock.clone()).with_heartbeat_interval(Duration::from_millis(1));

    worker.run().expect("run");

    let mut expected = vec!["HELLO"];
    expected.extend(vec!["FETCH"; 5]);
    expected.extend(["BEAT", "BEAT", "END"]);
    assert_eq!(recorder.verbs(), expected);
    let states: Vec<Value> = recorder
        .payloads("BEAT")
        .iter()
        .filter_map(|beat| beat.get("current_state").cloned())
        .collect();
    assert_eq!(states, vec![json!(""), json!("quiet")]);
    // Quiet at 1.25ms, then asleep until the next beat is overdue at 2.5ms.
    assert_eq!(clock.elapsed(), Duration::from_micros(2500));
    assert_eq!(worker.liveness(), &Liveness::Terminate);
}

#[rstest]
fn quiet_worker_resumes_when_server_clears_state(clock: ManualClock) {
    let server = Script::new()
        .beat_state("quiet")
        .beat_state("")
        .beat_state("terminate")
        .into_server();
    let recorder = server.recorder();
    let mut worker = worker_on(server, clock).with_heartbeat_interval(Duration::from_millis(1));

    worker.run().expect("run");

    let fetches = vec!["FETCH"; 5];
    let mut expected = vec!["HELLO"];
    expected.extend(&fetches);
    expected.extend(["BEAT", "BEAT"]);
    expected.extend(&fetches);
    expected.extend(["BEAT", "END"]);
    assert_eq!(recorder.verbs(), expected);
}

#[rstest]
fn every_job_gets_exactly_one_report(clock: ManualClock) {
    let server = Script::new()
        .job(r#"{"jid":"ok","jobtype":"fine","args":[]}"#)
        .job(r#"{"jid":"err","jobtype":"broken","args":[]}"#)
        .job(r#"{"jid":"panic","jobtype":"explodes","args":[]}"#)
        .job(r#"{"jid":"unknown","jobtype":"mystery","args":[]}"#)
        .beat(ok())
        .beat_state("terminate")
        .into_server();
    let recorder = server.recorder();
    let mut worker = worker_on(server, clock).with_heartbeat_interval(Duration::from_millis(1));
    worker.register("fine", succeeding);
    worker.register("broken", failing("broken on purpose"));
    worker.register("explodes", |_job: &Job| -> Result<(), HandlerError> {
        panic!("handler exploded")
    });

    worker.run().expect("run");

    assert_eq!(recorder.payloads("ACK"), vec![json!({"jid": "ok"})]);
    assert_eq!(
        recorder.payloads("FAIL"),
        vec![
            json!({"jid": "err", "errtype": "HandlerError", "message": "broken on purpose"}),
            json!({"jid": "panic", "errtype": "HandlerPanic", "message": "handler exploded"}),
            json!({
                "jid": "unknown",
                "errtype": "UnknownJobType",
                "message": "no handler registered for jobtype mystery"
            }),
        ]
    );
}

#[rstest]
fn local_shutdown_ends_the_session(clock: ManualClock) {
    let server = Script::new().job(COOLJOB).job(COOLJOB).into_server();
    let recorder = server.recorder();
    let mut worker = worker_on(server, clock);
    let handle = worker.shutdown_handle();
    worker.register("cooljob", move |_job: &Job| -> Result<(), HandlerError> {
        handle.request();
        Ok(())
    });

    worker.run().expect("run");

    assert_eq!(recorder.verbs(), vec!["HELLO", "FETCH", "ACK", "END"]);
    assert_eq!(recorder.closes(), 1);
}

#[rstest]
fn shutdown_before_connecting_sends_nothing(clock: ManualClock) {
    let server = Script::new().into_server();
    let recorder = server.recorder();
    let mut worker = worker_on(server, clock);
    worker.shutdown_handle().request();

    worker.run().expect("run");

    assert!(recorder.commands().is_empty());
}

#[rstest]
fn fatal_errors_close_the_connection(clock: ManualClock) {
    let server = ScriptedServer::new(Box::new(|line: &str| {
        if line.starts_with("FETCH") {
            Vec::new()
        } else {
            ok()
        }
    }));
    let recorder = server.recorder();
    let mut worker = worker_on(server, clock);

    let error = worker.run().expect_err("server hung up");

    assert!(matches!(
        error,
        ClientError::Transport(TransportError::Closed)
    ));
    assert_eq!(recorder.count("END"), 0);
    assert_eq!(recorder.closes(), 1);
}

#[rstest]
fn handshake_failure_stops_before_any_job(clock: ManualClock) {
    let server = Script::new()
        .job(COOLJOB)
        .into_server()
        .with_greeting("-ERR shutting down\r\n");
    let recorder = server.recorder();
    let mut worker = worker_on(server, clock);
    worker.register("cooljob", succeeding);

    let error = worker.run().expect_err("handshake must fail");

    assert!(matches!(error, ClientError::Handshake(_)));
    assert!(recorder.commands().is_empty());
}

#[test]
fn generated_worker_ids_are_bound_to_the_client() {
    let server = Script::new().beat_state("terminate").into_server();
    let recorder = server.recorder();
    let mut worker = Worker::new(ProtocolClient::new(server))
        .with_clock(ManualClock::new())
        .with_heartbeat_interval(Duration::from_millis(1));
    worker.set_queues(vec![String::from("critical")]);

    worker.run().expect("run");

    assert_eq!(worker.wid().len(), 8);
    assert_eq!(worker.queues(), &[String::from("critical")]);
    let hellos = recorder.payloads("HELLO");
    let hello = hellos.first().expect("one hello");
    assert_eq!(hello.get("wid"), Some(&json!(worker.wid())));
}
