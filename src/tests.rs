use super::app::RequestHandler;
use super::classified;
use super::client::Client;
use super::codec;
use super::conf;
use super::jsonpath;
use super::message;
use super::message::Message;
use super::message::MessageStatus;
use super::message::MessageType;
use super::message::Payload;
use super::session::{PendingRequest, RequestTable, SessionHandle, SessionState};
use super::stack;
use super::transport::{Frame, Transport};
use json::JsonValue;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TEST_CONFIG: &str = r#"
<config>
  <client>
    <domain>localhost</domain>
    <port>6379</port>
    <username>tester</username>
    <passwd>testpass</passwd>
    <loglevel>1</loglevel>
  </client>
  <shared>
    <log_protect>
      <match_string>test.service.login</match_string>
    </log_protect>
  </shared>
</config>
"#;

const CLIENT_ADDR: &str = "busrpc:client:tester:localhost:testhost:1:000001";
const CALLER_ADDR: &str = "busrpc:client:caller:localhost:testhost:2:000002";
const WORKER_A_ADDR: &str = "busrpc:client:workera:localhost:testhost:3:000003";
const WORKER_B_ADDR: &str = "busrpc:client:workerb:localhost:testhost:4:000004";
const ECHO_SERVICE_ADDR: &str = "busrpc:service:_:_:test.echo";

/// The far side of the fake fabric.
///
/// Tests queue frames for delivery, inspect everything sent, and
/// script automatic replies keyed on the kind of message being sent.
struct TestPeer {
    /// (requires_blocking_recv, frame) pairs awaiting delivery.
    inbound: VecDeque<(bool, JsonValue)>,

    /// Every frame sent through the transport, in order.
    sent: Vec<JsonValue>,

    /// When a frame whose first message matches the front entry's
    /// type is sent, a reply frame built from (sender, messages) is
    /// queued for delivery.
    autoreplies: VecDeque<(MessageType, String, Vec<Message>)>,
}

impl TestPeer {
    fn new() -> Rc<RefCell<TestPeer>> {
        Rc::new(RefCell::new(TestPeer {
            inbound: VecDeque::new(),
            sent: Vec::new(),
            autoreplies: VecDeque::new(),
        }))
    }
}

struct TestTransport {
    address: String,
    peer: Rc<RefCell<TestPeer>>,
}

impl Transport for TestTransport {
    fn address(&self) -> &str {
        &self.address
    }

    fn recv(&mut self, timeout: i32, _recipient: Option<&str>) -> Result<Option<Frame>, String> {
        let mut peer = self.peer.borrow_mut();

        let requires_block = match peer.inbound.front() {
            Some((block, _)) => *block,
            None => return Ok(None),
        };

        if requires_block {
            if timeout == 0 {
                return Ok(None);
            }
            // Emulate waiting on the wire.
            thread::sleep(Duration::from_secs(1));
        }

        let (_, jv) = peer.inbound.pop_front().unwrap();

        Ok(Frame::from_json_value(&jv))
    }

    fn send(&mut self, frame: &Frame) -> Result<(), String> {
        let mut peer = self.peer.borrow_mut();

        peer.sent.push(frame.to_json_value());

        let msgs = codec::decode_batch(frame.body());

        let matched = match (msgs.get(0), peer.autoreplies.front()) {
            (Some(first), Some((mtype, _, _))) => first.mtype() == mtype,
            _ => false,
        };

        if matched {
            let (_, sender, reply_msgs) = peer.autoreplies.pop_front().unwrap();

            let reply = Frame::with_body_value(
                frame.from(),
                &sender,
                frame.thread(),
                codec::encode_batch(&reply_msgs),
            );

            peer.inbound.push_back((false, reply.to_json_value()));
        }

        Ok(())
    }

    fn connected(&mut self) -> bool {
        true
    }

    fn error(&self) -> bool {
        false
    }

    fn clear(&mut self) -> Result<(), String> {
        self.peer.borrow_mut().inbound.clear();
        Ok(())
    }
}

fn test_client() -> (Client, Rc<RefCell<TestPeer>>) {
    let config = conf::ConfigBuilder::from_xml_string(TEST_CONFIG)
        .unwrap()
        .build()
        .unwrap()
        .into_shared();

    let peer = TestPeer::new();

    let transport = TestTransport {
        address: CLIENT_ADDR.to_string(),
        peer: peer.clone(),
    };

    (Client::with_transport(config, Box::new(transport)), peer)
}

fn status_msg(trace: usize, status: MessageStatus, name: &str, text: &str) -> Message {
    Message::new(
        MessageType::Status,
        trace,
        Payload::Status(message::Status::new(status, text, name)),
    )
}

fn result_msg(trace: usize, content: JsonValue) -> Message {
    Message::new(
        MessageType::Result,
        trace,
        Payload::Result(message::Result::new(
            MessageStatus::Ok,
            "OK",
            message::RESULT_CLASS,
            content,
        )),
    )
}

fn push_inbound(peer: &Rc<RefCell<TestPeer>>, frame: &Frame) {
    peer.borrow_mut()
        .inbound
        .push_back((false, frame.to_json_value()));
}

fn push_inbound_blocking(peer: &Rc<RefCell<TestPeer>>, frame: &Frame) {
    peer.borrow_mut()
        .inbound
        .push_back((true, frame.to_json_value()));
}

fn sent_frames(peer: &Rc<RefCell<TestPeer>>) -> Vec<(JsonValue, Vec<Message>)> {
    peer.borrow()
        .sent
        .iter()
        .map(|jv| {
            let frame = Frame::from_json_value(jv).unwrap();
            let msgs = codec::decode_batch(frame.body());
            (jv.clone(), msgs)
        })
        .collect()
}

// ------------------------------------------------------------------
// Codec
// ------------------------------------------------------------------

#[test]
fn request_round_trip() {
    let mut msg = Message::new(
        MessageType::Request,
        42,
        Payload::Method(message::Method::new(
            "test.echo",
            vec![json::from("Hello"), json::from(7)],
        )),
    );
    msg.set_locale("fr-CA");

    let encoded = codec::encode_batch(&[msg]);

    // Wire compatibility: stringified integers, classed wrappers.
    assert_eq!(encoded[0]["__c"].as_str().unwrap(), "osrfMessage");
    assert!(encoded[0]["__p"]["threadTrace"].is_string());
    assert_eq!(encoded[0]["__p"]["payload"]["__c"].as_str().unwrap(), "osrfMethod");

    let decoded = codec::decode_batch(&encoded);
    assert_eq!(decoded.len(), 1);

    let msg = &decoded[0];
    assert_eq!(*msg.mtype(), MessageType::Request);
    assert_eq!(msg.thread_trace(), 42);
    assert_eq!(msg.locale(), Some("fr-CA"));
    assert!(!msg.is_exception());

    if let Payload::Method(method) = msg.payload() {
        assert_eq!(method.method(), "test.echo");
        assert_eq!(method.params()[0].as_str().unwrap(), "Hello");
        assert_eq!(method.params()[1].as_u8().unwrap(), 7);
    } else {
        panic!("REQUEST failed to decode as a method call");
    }
}

#[test]
fn result_and_status_round_trip() {
    let msgs = vec![
        result_msg(1, json::object! {ok: true}),
        status_msg(1, MessageStatus::Complete, message::CONNECT_STATUS_CLASS, "Request Complete"),
    ];

    let encoded = codec::encode_batch(&msgs);

    // statusCode rides as a stringified integer.
    assert_eq!(encoded[0]["__p"]["payload"]["__p"]["statusCode"].as_str().unwrap(), "200");

    let decoded = codec::decode_batch(&encoded);
    assert_eq!(decoded.len(), 2);

    if let Payload::Result(res) = decoded[0].payload() {
        assert_eq!(*res.status(), MessageStatus::Ok);
        assert!(res.content()["ok"].as_bool().unwrap());
    } else {
        panic!("RESULT failed to decode");
    }

    if let Payload::Status(stat) = decoded[1].payload() {
        assert_eq!(*stat.status(), MessageStatus::Complete);
        assert_eq!(stat.status_name(), message::CONNECT_STATUS_CLASS);
    } else {
        panic!("STATUS failed to decode");
    }
}

#[test]
fn decode_tolerates_numeric_scalars() {
    // statusCode and threadTrace may arrive as numbers or strings.
    let body = json::array![json::object! {
        __c: "osrfMessage",
        __p: json::object! {
            threadTrace: 3,
            type: "RESULT",
            payload: json::object! {
                __c: "osrfResult",
                __p: json::object! {status: "OK", statusCode: 200, content: "x"}
            }
        }
    }];

    let decoded = codec::decode_batch(&body);
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].thread_trace(), 3);

    if let Payload::Result(res) = decoded[0].payload() {
        assert_eq!(*res.status(), MessageStatus::Ok);
    } else {
        panic!("RESULT failed to decode");
    }
}

#[test]
fn decode_coerces_null_params() {
    let body = json::array![json::object! {
        __c: "osrfMessage",
        __p: json::object! {
            threadTrace: "1",
            type: "REQUEST",
            payload: json::object! {
                __c: "osrfMethod",
                __p: json::object! {method: "test.noargs", params: json::JsonValue::Null}
            }
        }
    }];

    let decoded = codec::decode_batch(&body);
    assert_eq!(decoded.len(), 1);

    if let Payload::Method(method) = decoded[0].payload() {
        assert_eq!(method.params().len(), 0);
    } else {
        panic!("REQUEST failed to decode");
    }
}

#[test]
fn decode_skips_foreign_classes() {
    let body = json::array![
        json::object! {__c: "somethingElse", __p: json::object! {}},
        status_msg(9, MessageStatus::Ok, message::STATUS_CLASS, "OK").to_json_value(),
        json::from("not even an object"),
    ];

    let decoded = codec::decode_batch(&body);
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].thread_trace(), 9);
}

#[test]
fn decode_caps_messages_per_frame() {
    let mut body = JsonValue::new_array();
    for i in 0..(codec::MAX_MESSAGES_PER_FRAME + 40) {
        body.push(result_msg(i, json::from(i)).to_json_value()).ok();
    }

    let decoded = codec::decode_batch(&body);
    assert_eq!(decoded.len(), codec::MAX_MESSAGES_PER_FRAME);
}

#[test]
fn scalar_params_are_wrapped() {
    let mut method = message::Method::new("test.one", Vec::new());
    method.set_params(json::from("bare"));
    assert_eq!(method.params().len(), 1);
    assert_eq!(method.params()[0].as_str().unwrap(), "bare");

    method.set_params(json::array![1, 2]);
    assert_eq!(method.params().len(), 2);
}

// ------------------------------------------------------------------
// Class folding and path queries
// ------------------------------------------------------------------

#[test]
fn class_folding_round_trip() {
    let wire = json::object! {
        __c: "au",
        __p: json::object! {
            id: 1,
            addresses: json::array![
                json::object! {__c: "aua", __p: json::object! {street: "123 Fake St"}}
            ],
            tag: json::object! {__c: "tag", __p: json::array![1, 2, 3]}
        }
    };

    let flat = classified::decode_classes(&wire);

    assert_eq!(flat[classified::CLASSNAME_KEY].as_str().unwrap(), "au");
    assert_eq!(flat["addresses"][0][classified::CLASSNAME_KEY].as_str().unwrap(), "aua");
    assert_eq!(flat["addresses"][0]["street"].as_str().unwrap(), "123 Fake St");

    // Array payloads have no key to carry a class; they stay wrapped.
    assert_eq!(flat["tag"]["__c"].as_str().unwrap(), "tag");

    let rewrapped = classified::encode_classes(&flat);
    assert_eq!(rewrapped.dump(), wire.dump());
}

#[test]
fn path_queries() {
    let doc = json::object! {
        apps: json::object! {
            "test.echo": json::object! {stateless: "1", keepalive: 5},
            "test.math": json::object! {stateless: 0}
        },
        other: json::object! {
            nested: json::object! {stateless: "9"}
        }
    };

    // Simple descent.
    let hits = jsonpath::find(&doc, "/apps/test.echo/stateless");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].as_str().unwrap(), "1");

    // Missing path: empty, not an error.
    assert!(jsonpath::find(&doc, "/apps/nope/stateless").is_empty());

    // Any-depth search finds every binding of the key.
    let hits = jsonpath::find(&doc, "//stateless");
    assert_eq!(hits.len(), 3);

    // Any-depth hits that resolve to arrays flatten into the output.
    let doc = json::object! {
        a: json::object! {b: json::object! {c: json::array![1, 2]}},
        z: json::object! {b: json::object! {c: 3}}
    };
    let hits = jsonpath::find(&doc, "//b/c");
    assert_eq!(hits.len(), 3);
}

// ------------------------------------------------------------------
// Request table
// ------------------------------------------------------------------

#[test]
fn request_table_ops() {
    let mut table = RequestTable::new();

    let payload = Message::new(
        MessageType::Request,
        1,
        Payload::Method(message::Method::new("m", Vec::new())),
    );

    table.insert(1, PendingRequest::new(1, payload.clone()));
    assert_eq!(table.len(), 1);
    assert_eq!(table.lookup(1).unwrap().request_id(), 1);
    assert!(!table.lookup(1).unwrap().complete());
    assert!(table.lookup(2).is_none());

    // Overwrite replaces the previous entry at the same id.
    table.insert(1, PendingRequest::new(1, payload.clone()));
    assert_eq!(table.len(), 1);

    // Ids can be arbitrarily large.
    table.insert(123_456_789, PendingRequest::new(123_456_789, payload));
    assert_eq!(table.len(), 2);

    table.remove(1);
    assert!(table.lookup(1).is_none());
    assert_eq!(table.len(), 1);
}

// ------------------------------------------------------------------
// Registry
// ------------------------------------------------------------------

#[test]
fn registry_lifecycle() {
    let (client, _peer) = test_client();

    let ses = client.session("test.echo");
    let id = ses.session_id();

    // The session registered itself on construction.
    assert!(client
        .singleton()
        .borrow_mut()
        .sessions_mut()
        .lookup(&id)
        .is_some());

    // Re-inserting a live id is a no-op.
    let rc = ses.session().clone();
    client.singleton().borrow_mut().sessions_mut().insert(&id, &rc);
    assert_eq!(client.singleton().borrow_mut().sessions_mut().len(), 1);

    // Dropping the owner removes the entry.
    drop(rc);
    drop(ses);
    assert!(client
        .singleton()
        .borrow_mut()
        .sessions_mut()
        .lookup(&id)
        .is_none());
}

// ------------------------------------------------------------------
// End-to-end scenarios over the fake fabric
// ------------------------------------------------------------------

#[test]
fn stateful_request_happy_path() {
    let (client, peer) = test_client();

    peer.borrow_mut().autoreplies.push_back((
        MessageType::Connect,
        WORKER_A_ADDR.to_string(),
        vec![status_msg(0, MessageStatus::Ok, message::CONNECT_STATUS_CLASS, "Connection Successful")],
    ));

    let mut reply = result_msg(1, json::from("hi"));
    reply.set_locale("fr-CA");

    peer.borrow_mut().autoreplies.push_back((
        MessageType::Request,
        WORKER_A_ADDR.to_string(),
        vec![
            reply,
            status_msg(1, MessageStatus::Complete, message::CONNECT_STATUS_CLASS, "Request Complete"),
        ],
    ));

    let ses = client.session("test.echo");

    ses.connect().expect("connect should succeed");
    assert_eq!(ses.state(), SessionState::Connected);

    // Replies flow back from the specific worker that answered.
    assert_eq!(ses.session().borrow().remote_id(), WORKER_A_ADDR);

    let trace = ses.make_request("test.echo.echo", "hi").unwrap();
    assert_eq!(trace, 1);

    let msg = ses
        .request_recv(trace, 10)
        .unwrap()
        .expect("expected a reply");

    if let Payload::Result(res) = msg.payload() {
        assert_eq!(res.content().as_str().unwrap(), "hi");
    } else {
        panic!("expected a RESULT reply");
    }

    // Receiving a reply adopts the sender's locale.
    assert_eq!(ses.session().borrow().locale(), Some("fr-CA"));

    // End-of-stream after the COMPLETE status.
    assert!(ses.request_recv(trace, 10).unwrap().is_none());

    ses.request_finish(trace);
    assert_eq!(ses.session().borrow().requests().len(), 0);
}

#[test]
fn redirect_resends_original_request() {
    let (client, peer) = test_client();

    {
        let mut p = peer.borrow_mut();
        p.autoreplies.push_back((
            MessageType::Connect,
            WORKER_A_ADDR.to_string(),
            vec![status_msg(0, MessageStatus::Ok, message::CONNECT_STATUS_CLASS, "Connection Successful")],
        ));
        p.autoreplies.push_back((
            MessageType::Request,
            WORKER_A_ADDR.to_string(),
            vec![status_msg(1, MessageStatus::Redirected, message::STATUS_CLASS, "Redirected")],
        ));
        p.autoreplies.push_back((
            MessageType::Connect,
            WORKER_B_ADDR.to_string(),
            vec![status_msg(0, MessageStatus::Ok, message::CONNECT_STATUS_CLASS, "Connection Successful")],
        ));
    }

    let ses = client.session("test.echo");
    ses.connect().unwrap();

    let trace = ses.make_request("test.echo.echo", vec!["payload"]).unwrap();
    assert_eq!(trace, 1);

    // Pump the dispatcher; the redirect triggers a reconnect and a
    // verbatim resend.
    assert!(ses.request_recv(trace, 0).unwrap().is_none());

    let sent = sent_frames(&peer);
    let kinds: Vec<MessageType> = sent.iter().map(|(_, m)| *m[0].mtype()).collect();

    assert_eq!(
        kinds,
        vec![
            MessageType::Connect,
            MessageType::Request,
            MessageType::Connect,
            MessageType::Request,
        ]
    );

    // The resent request reuses the original trace and payload.
    let (_, resent) = &sent[3];
    assert_eq!(resent[0].thread_trace(), 1);
    if let Payload::Method(method) = resent[0].payload() {
        assert_eq!(method.method(), "test.echo.echo");
        assert_eq!(method.params()[0].as_str().unwrap(), "payload");
    } else {
        panic!("resent message is not a request");
    }

    // The reconnect handshake came from worker B.
    assert_eq!(ses.session().borrow().remote_id(), WORKER_B_ADDR);
}

#[test]
fn top_level_transport_error_is_sticky() {
    let (client, peer) = test_client();

    let ses = client.session("test.echo");
    ses.session().borrow_mut().set_stateless(true);

    let trace = ses.make_request("test.echo.echo", "x").unwrap();

    // Bounce the request off the (unreachable) top-level address.
    let mut bounce = Frame::with_body_value(
        CLIENT_ADDR,
        ECHO_SERVICE_ADDR,
        &ses.session_id(),
        codec::encode_batch(&[ses.session().borrow().stored_request_payload(trace).unwrap()]),
    );
    bounce.set_is_error(true);
    push_inbound(&peer, &bounce);

    stack::process(&client, 0, None, None).unwrap();

    {
        let s = ses.session().borrow();
        assert!(s.transport_error());

        // The request is still in the table so the caller can observe
        // end-of-stream.
        assert!(s.requests().lookup(trace).is_some());
    }

    // No synthetic redirect: nothing was resent.
    assert_eq!(sent_frames(&peer).len(), 1);

    // Subsequent requests fail fast.
    assert!(ses.make_request("test.echo.echo", "y").is_err());
}

#[test]
fn transport_error_away_from_origin_redirects() {
    let (client, peer) = test_client();

    {
        let mut p = peer.borrow_mut();
        p.autoreplies.push_back((
            MessageType::Connect,
            WORKER_A_ADDR.to_string(),
            vec![status_msg(0, MessageStatus::Ok, message::CONNECT_STATUS_CLASS, "Connection Successful")],
        ));
        // The redirect-triggered reconnect lands on another worker.
        p.autoreplies.push_back((
            MessageType::Connect,
            WORKER_B_ADDR.to_string(),
            vec![status_msg(0, MessageStatus::Ok, message::CONNECT_STATUS_CLASS, "Connection Successful")],
        ));
    }

    let ses = client.session("test.echo");
    ses.connect().unwrap();

    let trace = ses.make_request("test.echo.echo", "x").unwrap();

    // Remove the pending CONNECT autoreply ordering issue: the bounce
    // arrives from worker A, who we are currently talking to.
    let mut bounce = Frame::with_body_value(
        CLIENT_ADDR,
        WORKER_A_ADDR,
        &ses.session_id(),
        codec::encode_batch(&[ses.session().borrow().stored_request_payload(trace).unwrap()]),
    );
    bounce.set_is_error(true);
    push_inbound(&peer, &bounce);

    stack::process(&client, 0, None, None).unwrap();

    // Not a top-level failure: the session fell back to its original
    // address and resent.
    assert!(!ses.session().borrow().transport_error());

    let sent = sent_frames(&peer);
    let kinds: Vec<MessageType> = sent.iter().map(|(_, m)| *m[0].mtype()).collect();

    assert_eq!(
        kinds,
        vec![
            MessageType::Connect,
            MessageType::Request,
            MessageType::Connect,
            MessageType::Request,
        ]
    );

    assert_eq!(sent[3].1[0].thread_trace(), trace);
}

#[test]
fn stateless_request_skips_handshake() {
    let (client, peer) = test_client();

    let ses = client.session("test.echo");
    ses.session().borrow_mut().set_stateless(true);

    let trace = ses.make_request("test.echo.echo", Vec::<JsonValue>::new()).unwrap();
    assert_eq!(trace, 1);

    let sent = sent_frames(&peer);
    assert_eq!(sent.len(), 1);

    // No CONNECT frame; the request went straight to the original
    // destination.
    assert_eq!(*sent[0].1[0].mtype(), MessageType::Request);

    let frame = Frame::from_json_value(&sent[0].0).unwrap();
    assert_eq!(frame.to(), ECHO_SERVICE_ADDR);
    assert_eq!(ses.session().borrow().remote_id(), ECHO_SERVICE_ADDR);
}

#[test]
fn unknown_status_becomes_exception_reply() {
    let (client, peer) = test_client();

    let ses = client.session("test.echo");
    ses.session().borrow_mut().set_stateless(true);

    let trace = ses.make_request("test.echo.echo", "x").unwrap();

    let frame = Frame::with_body_value(
        CLIENT_ADDR,
        WORKER_A_ADDR,
        &ses.session_id(),
        codec::encode_batch(&[status_msg(
            trace,
            MessageStatus::Unauthorized,
            "osrfMethodException",
            "Unauthorized",
        )]),
    );
    push_inbound(&peer, &frame);

    let msg = ses
        .request_recv(trace, 0)
        .unwrap()
        .expect("expected the synthesized reply");

    assert!(msg.is_exception());
    assert_eq!(msg.thread_trace(), trace);

    if let Payload::Result(res) = msg.payload() {
        assert_eq!(*res.status(), MessageStatus::Unauthorized);
        assert_eq!(res.status_name(), "osrfMethodException");
    } else {
        panic!("expected a RESULT payload");
    }

    // The request was terminated.
    assert!(ses.session().borrow().request_complete(trace));
    assert!(ses.request_recv(trace, 0).unwrap().is_none());
}

#[test]
fn continue_status_refreshes_timeout() {
    let (client, peer) = test_client();

    let ses = client.session("test.echo");
    ses.session().borrow_mut().set_stateless(true);

    let trace = ses.make_request("test.echo.echo", "x").unwrap();

    // Each of these costs one simulated second of waiting.  With a
    // one second budget, the reply is only reachable because the
    // CONTINUE refreshes the countdown.
    let keep_waiting = Frame::with_body_value(
        CLIENT_ADDR,
        WORKER_A_ADDR,
        &ses.session_id(),
        codec::encode_batch(&[status_msg(
            trace,
            MessageStatus::Continue,
            message::STATUS_CLASS,
            "Please Hold",
        )]),
    );
    push_inbound_blocking(&peer, &keep_waiting);

    let reply = Frame::with_body_value(
        CLIENT_ADDR,
        WORKER_A_ADDR,
        &ses.session_id(),
        codec::encode_batch(&[result_msg(trace, json::from("late"))]),
    );
    push_inbound_blocking(&peer, &reply);

    let msg = ses
        .request_recv(trace, 1)
        .unwrap()
        .expect("CONTINUE should have kept the request alive");

    if let Payload::Result(res) = msg.payload() {
        assert_eq!(res.content().as_str().unwrap(), "late");
    } else {
        panic!("expected a RESULT reply");
    }

    // A CONTINUE leaves no consumable reply behind.
    assert_eq!(
        ses.session().borrow().requests().lookup(trace).unwrap().reply_count(),
        0
    );
}

// ------------------------------------------------------------------
// Server-side dispatch
// ------------------------------------------------------------------

/// Minimal application handler: responds with a value and completes.
struct CompleteResponder {
    calls: Vec<(String, usize)>,
}

impl RequestHandler for CompleteResponder {
    fn invoke(
        &mut self,
        session: &SessionHandle,
        trace: usize,
        method: &message::Method,
    ) -> Result<(), String> {
        self.calls.push((method.method().to_string(), trace));
        session.respond_complete(trace, 42)
    }
}

fn request_frame(thread: &str, trace: usize, method: &str) -> Frame {
    Frame::with_body_value(
        ECHO_SERVICE_ADDR,
        CALLER_ADDR,
        thread,
        codec::encode_batch(&[Message::new(
            MessageType::Request,
            trace,
            Payload::Method(message::Method::new(method, vec![json::from(1)])),
        )]),
    )
}

#[test]
fn server_adoption_and_batched_respond_complete() {
    let (client, peer) = test_client();

    let mut handler = CompleteResponder { calls: Vec::new() };

    let frame = request_frame("caller-thread-1", 7, "test.echo.echo");

    let handle = stack::handle_frame(&client, frame, Some("test.echo"), Some(&mut handler))
        .unwrap()
        .expect("expected an adopted server session");

    assert_eq!(handler.calls, vec![(String::from("test.echo.echo"), 7)]);
    assert_eq!(handle.session_id(), "caller-thread-1");
    assert_eq!(handle.session().borrow().remote_id(), CALLER_ADDR);

    // The adopted session is registered for the rest of the
    // conversation.
    assert!(client
        .singleton()
        .borrow_mut()
        .sessions_mut()
        .lookup("caller-thread-1")
        .is_some());

    // Exactly one frame went out, carrying the result and the
    // completion status in order.
    let sent = sent_frames(&peer);
    assert_eq!(sent.len(), 1);

    let frame = Frame::from_json_value(&sent[0].0).unwrap();
    assert_eq!(frame.to(), CALLER_ADDR);
    assert_eq!(frame.thread(), "caller-thread-1");

    let msgs = &sent[0].1;
    assert_eq!(msgs.len(), 2);

    assert_eq!(*msgs[0].mtype(), MessageType::Result);
    assert_eq!(msgs[0].thread_trace(), 7);
    if let Payload::Result(res) = msgs[0].payload() {
        assert_eq!(*res.status(), MessageStatus::Ok);
        assert_eq!(res.content().as_u8().unwrap(), 42);
    } else {
        panic!("first message should be the RESULT");
    }

    assert_eq!(*msgs[1].mtype(), MessageType::Status);
    assert_eq!(msgs[1].thread_trace(), 7);
    if let Payload::Status(stat) = msgs[1].payload() {
        assert_eq!(*stat.status(), MessageStatus::Complete);
        assert_eq!(stat.status_name(), message::CONNECT_STATUS_CLASS);
        assert_eq!(stat.status_label(), "Request Complete");
    } else {
        panic!("second message should be the STATUS");
    }
}

#[test]
fn server_connect_handshake() {
    let (client, peer) = test_client();

    let connect = Frame::with_body_value(
        ECHO_SERVICE_ADDR,
        CALLER_ADDR,
        "caller-thread-2",
        codec::encode_batch(&[Message::new(MessageType::Connect, 1, Payload::NoPayload)]),
    );

    let mut handler = CompleteResponder { calls: Vec::new() };

    let handle = stack::handle_frame(&client, connect, Some("test.echo"), Some(&mut handler))
        .unwrap()
        .unwrap();

    assert_eq!(handle.state(), SessionState::Connected);
    assert!(handler.calls.is_empty());

    let sent = sent_frames(&peer);
    assert_eq!(sent.len(), 1);

    if let Payload::Status(stat) = sent[0].1[0].payload() {
        assert_eq!(*stat.status(), MessageStatus::Ok);
        assert_eq!(stat.status_name(), message::CONNECT_STATUS_CLASS);
        assert_eq!(stat.status_label(), "Connection Successful");
    } else {
        panic!("expected a STATUS reply to CONNECT");
    }

    // A DISCONNECT ends the conversation but leaves teardown to the
    // worker.
    let disconnect = Frame::with_body_value(
        ECHO_SERVICE_ADDR,
        CALLER_ADDR,
        "caller-thread-2",
        codec::encode_batch(&[Message::new(MessageType::Disconnect, 2, Payload::NoPayload)]),
    );

    stack::handle_frame(&client, disconnect, Some("test.echo"), Some(&mut handler)).unwrap();
    assert_eq!(handle.state(), SessionState::Disconnected);
}

#[test]
fn frames_without_threads_are_dropped() {
    let (client, _peer) = test_client();

    let frame = Frame::with_body_value(CLIENT_ADDR, CALLER_ADDR, "", JsonValue::new_array());
    assert!(stack::handle_frame(&client, frame, None, None).unwrap().is_none());

    let mut err_frame =
        Frame::with_body_value(CLIENT_ADDR, CALLER_ADDR, "", JsonValue::new_array());
    err_frame.set_is_error(true);
    assert!(stack::handle_frame(&client, err_frame, None, None).unwrap().is_none());

    // A frame for an unknown thread with no hosted service is also
    // dropped.
    let frame = request_frame("who-is-this", 1, "test.echo.echo");
    assert!(stack::handle_frame(&client, frame, None, None).unwrap().is_none());
}

// ------------------------------------------------------------------
// Settings
// ------------------------------------------------------------------

#[test]
fn stateless_flag_lookup() {
    let settings = super::sclient::HostSettings::from_value(json::object! {
        apps: json::object! {
            "test.echo": json::object! {stateless: "1"},
            "test.math": json::object! {stateless: "yes"},
            "test.text": json::object! {stateless: 0}
        }
    });

    assert!(settings.stateless("test.echo"));

    // Non-numeric and zero flags mean stateful, as does absence.
    assert!(!settings.stateless("test.math"));
    assert!(!settings.stateless("test.text"));
    assert!(!settings.stateless("test.nope"));

    let settings = Arc::new(settings);

    let (client, _peer) = test_client();
    client.set_host_settings(settings);

    assert!(client.service_is_stateless("test.echo"));
    assert!(!client.service_is_stateless("test.nope"));

    // Client sessions read the flag at creation time.
    let ses = client.session("test.echo");
    assert!(ses.session().borrow().stateless());
}
