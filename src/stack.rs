//! Inbound dispatcher: routes transport frames through the client or
//! server state machine.
use super::app::RequestHandler;
use super::client::Client;
use super::codec;
use super::logging::Logger;
use super::message;
use super::message::Message;
use super::message::MessageStatus;
use super::message::MessageType;
use super::message::Payload;
use super::session::{Session, SessionHandle, SessionState, SessionType};
use super::transport::Frame;
use json::JsonValue;
use std::cell::RefCell;
use std::rc::Rc;

/// Reborrow the handler with a fresh, shorter lifetime each call so the
/// caller can invoke this repeatedly (e.g. once per loop iteration)
/// without the compiler tying the reborrow to the outer function's
/// signature lifetime.
fn reborrow_handler<'a>(
    handler: &'a mut Option<&mut dyn RequestHandler>,
) -> Option<&'a mut dyn RequestHandler> {
    match handler {
        Some(h) => Some(&mut **h),
        None => None,
    }
}

/// Drain the transport, dispatching every frame it has ready.
///
/// The first recv waits up to `timeout` seconds; once a frame has
/// arrived we only coalesce what is already buffered, never wait for
/// more.  Returns true if at least one frame was dispatched.
///
/// `service` enables server-side session adoption for frames whose
/// thread matches no live session; `handler` receives any inbound API
/// calls.
pub fn process(
    client: &Client,
    timeout: i32,
    service: Option<&str>,
    mut handler: Option<&mut dyn RequestHandler>,
) -> Result<bool, String> {
    let mut received = false;
    let mut timeout = timeout;

    loop {
        let frame_op = client
            .singleton()
            .borrow_mut()
            .transport_mut()
            .recv(timeout, None)?;

        let frame = match frame_op {
            Some(f) => f,
            None => break,
        };

        received = true;

        let h = reborrow_handler(&mut handler);

        handle_frame(client, frame, service, h)?;

        timeout = 0;
    }

    if client.singleton().borrow().transport().error() {
        return Err(format!("Transport connection is in an error state"));
    }

    Ok(received)
}

/// Dispatch one inbound frame.
///
/// Returns the session the frame belongs to, which may have been
/// created here (server-side adoption).  Frames that cannot be routed
/// are logged and dropped.
pub fn handle_frame(
    client: &Client,
    mut frame: Frame,
    service: Option<&str>,
    mut handler: Option<&mut dyn RequestHandler>,
) -> Result<Option<SessionHandle>, String> {
    // Adopt the sender's log trace for everything this frame causes.
    Logger::set_log_trace(frame.osrf_xid());

    if frame.is_error() && frame.thread().is_empty() {
        log::warn!(
            "Received a transport-level error with no thread from {}; dropping",
            frame.from()
        );
        return Ok(None);
    }

    if frame.thread().is_empty() {
        log::warn!("Received a non-error frame with no thread; dropping");
        return Ok(None);
    }

    let session = match lookup_or_adopt(client, &frame, service) {
        Some(s) => s,
        None => {
            log::trace!("Dropping frame for unroutable thread {}", frame.thread());
            return Ok(None);
        }
    };

    // Replies flow back to whoever actually responded, which may
    // differ from the address we originally targeted.
    session.borrow_mut().set_remote_id(frame.from());

    let msgs = codec::decode_batch(&frame.take_body());
    let frame_is_error = frame.is_error();

    log::trace!(
        "Received {} message(s) from {} for thread {}",
        msgs.len(),
        frame.from(),
        frame.thread()
    );

    for mut msg in msgs {
        if frame_is_error {
            let at_orig = {
                let ses = session.borrow();
                ses.remote_id() == ses.orig_remote_id()
            };

            if at_orig {
                // The peer at our original destination is unreachable.
                // Nothing downstream can be salvaged from this frame.
                log::warn!(
                    "Transport error for top-level remote id {}; cutting request short",
                    session.borrow().remote_id()
                );
                session.borrow_mut().set_transport_error(true);
                break;
            }

            // We were talking to a secondary address that went away.
            // Treat the condition as a redirect back to the original.
            log::warn!(
                "Treating transport error as redirect for trace {} on {}",
                msg.thread_trace(),
                session.borrow().session_id()
            );

            msg.set_mtype(MessageType::Status);
            msg.set_payload(Payload::Status(message::Status::new(
                MessageStatus::Redirected,
                "Redirected",
                message::STATUS_CLASS,
            )));
        }

        let stype = session.borrow().session_type();

        match stype {
            SessionType::Client => do_client(&session, msg)?,
            SessionType::Server => {
                let h = reborrow_handler(&mut handler);
                do_server(&session, msg, h)?;
            }
        }
    }

    Ok(Some(SessionHandle::from_rc(session)))
}

/// Find the live session for this frame's thread, or adopt a new
/// server-side session when we host a service.
fn lookup_or_adopt(
    client: &Client,
    frame: &Frame,
    service: Option<&str>,
) -> Option<Rc<RefCell<Session>>> {
    if let Some(ses) = client
        .singleton()
        .borrow_mut()
        .sessions_mut()
        .lookup(frame.thread())
    {
        return Some(ses);
    }

    let service = service?;

    log::trace!(
        "Adopting server session for thread {} service {service}",
        frame.thread()
    );

    let stateless = client.service_is_stateless(service);

    let session = Rc::new(RefCell::new(Session::new_server(
        client.clone(),
        service,
        frame.thread(),
        frame.from(),
        stateless,
    )));

    client
        .singleton()
        .borrow_mut()
        .sessions_mut()
        .insert(frame.thread(), &session);

    Some(session)
}

/// Client-side state machine for one inbound message.
fn do_client(session: &Rc<RefCell<Session>>, msg: Message) -> Result<(), String> {
    let trace = msg.thread_trace();

    match msg.mtype() {
        MessageType::Status => {
            let stat = match msg.payload() {
                Payload::Status(s) => s.clone(),
                _ => {
                    log::warn!("STATUS message has no status payload; skipping");
                    return Ok(());
                }
            };

            match stat.status() {
                MessageStatus::Ok => {
                    log::trace!("Peer accepted our connection");
                    session.borrow_mut().set_state(SessionState::Connected);
                }

                MessageStatus::Complete => {
                    session.borrow_mut().mark_complete(trace);
                }

                MessageStatus::Continue => {
                    session.borrow_mut().reset_request_timeout(trace);
                }

                MessageStatus::Redirected => {
                    {
                        let mut ses = session.borrow_mut();
                        ses.reset_remote();
                        ses.set_state(SessionState::Disconnected);
                    }
                    SessionHandle::from_rc(session.clone()).resend_request(trace)?;
                }

                MessageStatus::Expfailed => {
                    let mut ses = session.borrow_mut();
                    ses.reset_remote();
                    ses.set_state(SessionState::Disconnected);
                }

                MessageStatus::Timeout => {
                    {
                        let mut ses = session.borrow_mut();
                        ses.reset_remote();
                        ses.set_state(SessionState::Disconnected);
                    }
                    SessionHandle::from_rc(session.clone()).resend_request(trace)?;
                }

                _ => {
                    // An unhandled peer status terminates the request.
                    // Surface it to the caller as an exception-flagged
                    // reply.
                    log::warn!(
                        "Unhandled status for request {trace}: {} {}; passing up",
                        stat.status(),
                        stat.status_label()
                    );

                    let mut reply = Message::new(
                        MessageType::Result,
                        trace,
                        Payload::Result(message::Result::new(
                            *stat.status(),
                            stat.status_label(),
                            stat.status_name(),
                            JsonValue::Null,
                        )),
                    );

                    reply.set_is_exception(true);

                    if let Some(locale) = msg.locale() {
                        reply.set_locale(locale);
                    }

                    let mut ses = session.borrow_mut();
                    ses.mark_complete(trace);
                    ses.push_reply(trace, reply);
                }
            }
        }

        MessageType::Result => {
            session.borrow_mut().push_reply(trace, msg);
        }

        _ => {
            log::warn!(
                "Client session received unexpected message type {}; skipping",
                msg.mtype()
            );
        }
    }

    Ok(())
}

/// Server-side state machine for one inbound message.
fn do_server(
    session: &Rc<RefCell<Session>>,
    mut msg: Message,
    handler: Option<&mut dyn RequestHandler>,
) -> Result<(), String> {
    let trace = msg.thread_trace();

    log::trace!("Server received message of type {}", msg.mtype());

    {
        let mut ses = session.borrow_mut();
        ses.set_last_thread_trace(trace);
        ses.clear_responded_complete();
    }

    match msg.mtype() {
        MessageType::Connect => {
            let handle = SessionHandle::from_rc(session.clone());
            handle.status(
                trace,
                MessageStatus::Ok,
                message::CONNECT_STATUS_CLASS,
                "Connection Successful",
            )?;
            session.borrow_mut().set_state(SessionState::Connected);
        }

        MessageType::Disconnect => {
            // Session teardown is owned by the surrounding worker.
            log::trace!("Client sent explicit disconnect");
            session.borrow_mut().set_state(SessionState::Disconnected);
        }

        MessageType::Request => {
            let method = match msg.payload_mut() {
                Payload::Method(m) => m.clone(),
                _ => {
                    log::warn!("REQUEST message has no method payload; skipping");
                    return Ok(());
                }
            };

            match handler {
                Some(h) => {
                    let handle = SessionHandle::from_rc(session.clone());
                    h.invoke(&handle, trace, &method)?;
                }
                None => {
                    log::warn!(
                        "No application handler for inbound request {}; dropping",
                        method.method()
                    );
                }
            }
        }

        MessageType::Status => {} // ignored

        _ => {
            log::warn!("Server cannot handle message of type {}", msg.mtype());
            session.borrow_mut().set_state(SessionState::Disconnected);
        }
    }

    Ok(())
}
