use super::client::Client;
use super::codec;
use super::logging::Logger;
use super::message;
use super::message::Message;
use super::message::MessageStatus;
use super::message::MessageType;
use super::message::Payload;
use super::params::ApiParams;
use super::transport::Frame;
use super::{stack, util};
use json::JsonValue;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::process;
use std::rc::Rc;
use std::time::Instant;

/// How long connect() waits for the peer to acknowledge.
pub const CONNECT_TIMEOUT: i32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT: i32 = 60;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SessionType {
    Client,
    Server,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// An outstanding API call tracked by a session.
pub struct PendingRequest {
    request_id: usize,

    /// The original request message, retained so a redirected or
    /// timed-out call can be resent verbatim.
    payload: Message,

    /// Replies awaiting consumption, oldest first.
    replies: VecDeque<Message>,

    /// True once the peer has marked this request complete.
    complete: bool,

    /// One-shot signal telling the waiter to re-arm its countdown.
    reset_timeout: bool,
}

impl PendingRequest {
    pub fn new(request_id: usize, payload: Message) -> PendingRequest {
        PendingRequest {
            request_id,
            payload,
            replies: VecDeque::new(),
            complete: false,
            reset_timeout: false,
        }
    }

    pub fn request_id(&self) -> usize {
        self.request_id
    }

    pub fn complete(&self) -> bool {
        self.complete
    }

    pub fn reply_count(&self) -> usize {
        self.replies.len()
    }
}

/// Maps request ids to their outstanding requests.
///
/// Ids are minted by the owning session's monotonic thread trace, so
/// a long-lived session can produce arbitrarily large ids.
pub struct RequestTable {
    entries: HashMap<usize, PendingRequest>,
}

impl RequestTable {
    pub fn new() -> RequestTable {
        RequestTable {
            entries: HashMap::new(),
        }
    }

    /// Add an entry, replacing (and dropping) any previous entry
    /// stored at the same id.
    pub fn insert(&mut self, request_id: usize, request: PendingRequest) {
        if self.entries.insert(request_id, request).is_some() {
            log::warn!("Replaced an existing request entry for id {request_id}");
        }
    }

    pub fn lookup(&self, request_id: usize) -> Option<&PendingRequest> {
        self.entries.get(&request_id)
    }

    pub fn lookup_mut(&mut self, request_id: usize) -> Option<&mut PendingRequest> {
        self.entries.get_mut(&request_id)
    }

    /// Drop an entry along with its retained payload and replies.
    pub fn remove(&mut self, request_id: usize) {
        self.entries.remove(&request_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Per-conversation state shared by one client/server pair.
pub struct Session {
    /// Our connection to the bus, shared with every other session on
    /// this thread.
    client: Client,

    /// Conversation thread; globally unique.
    session_id: String,

    /// Logical service this conversation belongs to.
    service: String,

    /// Current peer address.  Updated to the actual responder as
    /// replies arrive.
    remote_id: String,

    /// The address originally targeted.  Used to detect top-level
    /// peer failure vs. redirection away from a secondary.
    orig_remote_id: String,

    /// Locale most recently adopted from the peer.
    locale: Option<String>,

    session_type: SessionType,

    state: SessionState,

    /// Stateless peers keep no per-conversation state; handshakes are
    /// skipped and sends always target orig_remote_id.
    stateless: bool,

    /// Most recently minted (client) or observed (server) request id.
    last_thread_trace: usize,

    requests: RequestTable,

    /// Sticky: the peer at orig_remote_id is unreachable.
    transport_error: bool,

    /// True once a Request Complete status has been sent for the
    /// current inbound request.  Server-side bookkeeping.
    responded_complete: bool,

    /// Opaque application-layer state.  Dropped with the session.
    user_data: Option<Box<dyn Any>>,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({} {})", self.service, self.session_id)
    }
}

impl Session {
    fn new_client(client: Client, service: &str) -> Session {
        let remote_id = super::addr::ServiceAddress::new(service).as_str().to_string();
        let stateless = client.service_is_stateless(service);

        Session {
            client,
            orig_remote_id: remote_id.clone(),
            remote_id,
            stateless,
            service: service.to_string(),
            session_id: Session::mint_session_id(),
            locale: None,
            session_type: SessionType::Client,
            state: SessionState::Disconnected,
            last_thread_trace: 0,
            requests: RequestTable::new(),
            transport_error: false,
            responded_complete: false,
            user_data: None,
        }
    }

    pub(crate) fn new_server(
        client: Client,
        service: &str,
        session_id: &str,
        remote_id: &str,
        stateless: bool,
    ) -> Session {
        Session {
            client,
            stateless,
            remote_id: remote_id.to_string(),
            orig_remote_id: remote_id.to_string(),
            service: service.to_string(),
            session_id: session_id.to_string(),
            locale: None,
            session_type: SessionType::Server,
            state: SessionState::Disconnected,
            last_thread_trace: 0,
            requests: RequestTable::new(),
            transport_error: false,
            responded_complete: false,
            user_data: None,
        }
    }

    /// Conversation ids fold in the clock and our pid so concurrent
    /// processes cannot collide.
    fn mint_session_id() -> String {
        let now = chrono::Utc::now();
        format!(
            "{}.{}{}",
            now.timestamp_millis(),
            now.timestamp(),
            process::id()
        )
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn set_remote_id(&mut self, remote_id: &str) {
        self.remote_id = remote_id.to_string();
    }

    pub fn orig_remote_id(&self) -> &str {
        &self.orig_remote_id
    }

    /// Point the session back at the address it originally targeted.
    pub fn reset_remote(&mut self) {
        log::trace!("{self} resetting remote id to {}", self.orig_remote_id);
        self.remote_id = self.orig_remote_id.clone();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        log::trace!("{self} state {:?} => {:?}", self.state, state);
        self.state = state;
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn stateless(&self) -> bool {
        self.stateless
    }

    pub fn set_stateless(&mut self, stateless: bool) {
        self.stateless = stateless;
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Adopt the peer's locale, replacing any previous value.
    pub fn set_locale(&mut self, locale: &str) {
        self.locale = Some(locale.to_string());
    }

    pub fn transport_error(&self) -> bool {
        self.transport_error
    }

    pub fn set_transport_error(&mut self, err: bool) {
        self.transport_error = err;
    }

    pub fn last_thread_trace(&self) -> usize {
        self.last_thread_trace
    }

    pub fn set_last_thread_trace(&mut self, trace: usize) {
        self.last_thread_trace = trace;
    }

    fn next_thread_trace(&mut self) -> usize {
        self.last_thread_trace += 1;
        self.last_thread_trace
    }

    pub fn requests(&self) -> &RequestTable {
        &self.requests
    }

    pub fn requests_mut(&mut self) -> &mut RequestTable {
        &mut self.requests
    }

    pub fn responded_complete(&self) -> bool {
        self.responded_complete
    }

    pub fn clear_responded_complete(&mut self) {
        self.responded_complete = false;
    }

    pub fn set_user_data(&mut self, data: Box<dyn Any>) {
        self.user_data = Some(data);
    }

    pub fn user_data(&self) -> Option<&Box<dyn Any>> {
        self.user_data.as_ref()
    }

    pub fn take_user_data(&mut self) -> Option<Box<dyn Any>> {
        self.user_data.take()
    }

    /// Queue a reply onto its request, oldest first.
    ///
    /// Replies whose request is unknown (e.g. already finished) are
    /// dropped.
    pub fn push_reply(&mut self, request_id: usize, msg: Message) {
        if msg.thread_trace() != request_id {
            log::warn!(
                "{self} reply trace {} does not match request {request_id}; dropping",
                msg.thread_trace()
            );
            return;
        }

        match self.requests.lookup_mut(request_id) {
            Some(req) => req.replies.push_back(msg),
            None => {
                log::trace!("{self} dropping reply for unknown request {request_id}");
            }
        }
    }

    pub fn pop_reply(&mut self, request_id: usize) -> Option<Message> {
        self.requests.lookup_mut(request_id)?.replies.pop_front()
    }

    pub fn mark_complete(&mut self, request_id: usize) {
        if let Some(req) = self.requests.lookup_mut(request_id) {
            req.complete = true;
        }
    }

    pub fn request_complete(&self, request_id: usize) -> bool {
        match self.requests.lookup(request_id) {
            Some(req) => req.complete,
            None => false,
        }
    }

    /// Tell the waiter on this request to re-arm its countdown.
    pub fn reset_request_timeout(&mut self, request_id: usize) {
        if let Some(req) = self.requests.lookup_mut(request_id) {
            req.reset_timeout = true;
        }
    }

    /// Read and clear the one-shot timeout-reset flag.
    pub fn take_reset_timeout(&mut self, request_id: usize) -> bool {
        match self.requests.lookup_mut(request_id) {
            Some(req) => {
                let val = req.reset_timeout;
                req.reset_timeout = false;
                val
            }
            None => false,
        }
    }

    /// Clone of the original request message, for resending.
    ///
    /// None once the request has completed or been finished.
    pub fn stored_request_payload(&self, request_id: usize) -> Option<Message> {
        match self.requests.lookup(request_id) {
            Some(req) => {
                if req.complete {
                    None
                } else {
                    Some(req.payload.clone())
                }
            }
            None => None,
        }
    }

    /// Encode a batch of messages into one frame and hand it to the
    /// transport, addressed to our current peer on our conversation
    /// thread.
    fn send_frame(&mut self, msgs: &[Message]) -> Result<(), String> {
        let body = codec::encode_batch(msgs);

        let mut frame = Frame::with_body_value(
            &self.remote_id,
            self.client.address(),
            &self.session_id,
            body,
        );

        frame.set_osrf_xid(&Logger::get_log_trace());

        log::trace!("{self} sending {} message(s) to {}", msgs.len(), self.remote_id);

        self.client
            .singleton()
            .borrow_mut()
            .transport_mut()
            .send(&frame)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // A connected client owes its peer a DISCONNECT so the remote
        // worker can release conversation state.  Best effort.
        if self.session_type == SessionType::Client && self.state == SessionState::Connected {
            let msgs = [Message::new(
                MessageType::Disconnect,
                self.last_thread_trace,
                Payload::NoPayload,
            )];

            let frame = Frame::with_body_value(
                &self.remote_id,
                self.client.address(),
                &self.session_id,
                codec::encode_batch(&msgs),
            );

            if let Ok(mut singleton) = self.client.singleton().try_borrow_mut() {
                singleton.transport_mut().send(&frame).ok();
            }
        }

        if let Ok(mut singleton) = self.client.singleton().try_borrow_mut() {
            singleton.sessions_mut().remove(&self.session_id);
        }
    }
}

/// Public session wrapper.
///
/// Blocking operations live here rather than on Session so the
/// inbound dispatcher can borrow the session while a handle waits on
/// the transport.
#[derive(Clone)]
pub struct SessionHandle {
    session: Rc<RefCell<Session>>,
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.session.borrow())
    }
}

impl SessionHandle {
    pub fn new(client: Client, service: &str) -> SessionHandle {
        let ses = Session::new_client(client.clone(), service);

        log::trace!("Created new session {ses}");

        let session_id = ses.session_id().to_string();
        let session = Rc::new(RefCell::new(ses));

        client
            .singleton()
            .borrow_mut()
            .sessions_mut()
            .insert(&session_id, &session);

        SessionHandle { session }
    }

    pub(crate) fn from_rc(session: Rc<RefCell<Session>>) -> SessionHandle {
        SessionHandle { session }
    }

    pub fn session(&self) -> &Rc<RefCell<Session>> {
        &self.session
    }

    pub fn client(&self) -> Client {
        self.session.borrow().client.clone()
    }

    pub fn session_id(&self) -> String {
        self.session.borrow().session_id().to_string()
    }

    pub fn service(&self) -> String {
        self.session.borrow().service().to_string()
    }

    pub fn state(&self) -> SessionState {
        self.session.borrow().state()
    }

    pub fn connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn responded_complete(&self) -> bool {
        self.session.borrow().responded_complete()
    }

    /// Issue a new API call and return the Request.
    ///
    /// params is a JSON-able thing, e.g. vec![json::from(1)],
    /// json::object! {a: "b"}, "one string", etc.
    pub fn request<T>(&self, method: &str, params: T) -> Result<Request, String>
    where
        T: Into<ApiParams>,
    {
        Ok(Request::new(
            self.clone(),
            self.make_request(method, params)?,
        ))
    }

    /// Issue a new API call and return its request id.
    pub fn make_request<T>(&self, method: &str, params: T) -> Result<usize, String>
    where
        T: Into<ApiParams>,
    {
        self.make_locale_request(method, params, message::DEFAULT_PROTOCOL, None)
    }

    /// Issue a new API call with an explicit protocol level and an
    /// optional locale override.
    ///
    /// Without an override, the request carries the locale most
    /// recently adopted from the peer, if any.
    pub fn make_locale_request<T>(
        &self,
        method: &str,
        params: T,
        protocol: u8,
        locale: Option<&str>,
    ) -> Result<usize, String>
    where
        T: Into<ApiParams>,
    {
        let params: ApiParams = params.into();
        let trace;
        let msg;

        {
            let mut ses = self.session.borrow_mut();

            if ses.transport_error() {
                return Err(format!("{ses} peer unreachable; cannot send request"));
            }

            trace = ses.next_thread_trace();

            log::debug!("{ses} sending request {method} [{trace}]");

            let mut req_msg = Message::new(
                MessageType::Request,
                trace,
                Payload::Method(message::Method::new(method, params.take_params())),
            );

            req_msg.set_protocol(protocol);

            if let Some(locale) = locale {
                req_msg.set_locale(locale);
            } else if let Some(locale) = ses.locale() {
                req_msg.set_locale(locale);
            }

            // Retain the payload so a redirected call can be resent.
            ses.requests_mut()
                .insert(trace, PendingRequest::new(trace, req_msg.clone()));

            msg = req_msg;
        }

        if let Err(e) = self.send_batch(vec![msg]) {
            self.session.borrow_mut().requests_mut().remove(trace);
            return Err(e);
        }

        Ok(trace)
    }

    /// Establish a stateful conversation with a remote worker.
    ///
    /// No-op if the session is already connected.
    pub fn connect(&self) -> Result<(), String> {
        let msg;

        {
            let mut ses = self.session.borrow_mut();

            if ses.state() == SessionState::Connected {
                log::warn!("{ses} is already connected");
                return Ok(());
            }

            ses.reset_remote();
            ses.set_state(SessionState::Connecting);

            log::debug!("{ses} sending CONNECT");

            // The handshake rides the current thread trace.
            msg = Message::new(
                MessageType::Connect,
                ses.last_thread_trace(),
                Payload::NoPayload,
            );
        }

        self.send_batch(vec![msg])?;

        let client = self.client();
        let timer = util::Timer::new(CONNECT_TIMEOUT);

        while self.state() != SessionState::Connected {
            if timer.done() {
                self.session.borrow_mut().set_state(SessionState::Disconnected);
                return Err(format!("{self} CONNECT timed out"));
            }

            stack::process(&client, timer.remaining(), None, None)?;
        }

        log::trace!("{self} connected OK");

        Ok(())
    }

    /// Send a DISCONNECT to our remote worker.
    ///
    /// Does not wait for any response.  No-op when already
    /// disconnected, and on stateless sessions with no conversation
    /// to tear down.
    pub fn disconnect(&self) -> Result<(), String> {
        let msg;

        {
            let ses = self.session.borrow();

            if ses.state() == SessionState::Disconnected {
                return Ok(());
            }

            if ses.stateless() && ses.state() != SessionState::Connected {
                log::trace!("{ses} skipping disconnect on stateless session");
                return Ok(());
            }

            log::debug!("{ses} sending DISCONNECT");

            msg = Message::new(
                MessageType::Disconnect,
                ses.last_thread_trace(),
                Payload::NoPayload,
            );
        }

        // The local teardown below happens whether or not the peer
        // is still reachable.
        if let Err(e) = self.send_batch(vec![msg]) {
            log::warn!("{self} could not send DISCONNECT: {e}");
        }

        let mut ses = self.session.borrow_mut();
        ses.set_state(SessionState::Disconnected);
        ses.reset_remote();

        Ok(())
    }

    /// Remove a request from the table, dropping its retained payload
    /// and any unconsumed replies.
    pub fn request_finish(&self, request_id: usize) {
        self.session.borrow_mut().requests_mut().remove(request_id);
    }

    /// Blocking consumer for a single reply to the given request.
    ///
    /// Returns None at end-of-stream: the request is complete and its
    /// reply queue drained, or the timeout budget ran out.  A
    /// CONTINUE status from the peer refreshes the budget to the
    /// original timeout.
    pub fn request_recv(
        &self,
        request_id: usize,
        timeout: i32,
    ) -> Result<Option<Message>, String> {
        // A reply may already be waiting.
        if let Some(msg) = self.session.borrow_mut().pop_reply(request_id) {
            return Ok(Some(msg));
        }

        let client = self.client();
        let mut remaining = timeout;

        loop {
            log::trace!(
                "{self} in request_recv for request {request_id} with {remaining} remaining"
            );

            // First drain anything the transport already has buffered.
            stack::process(&client, 0, None, None)?;

            if let Some(msg) = self.pop_reply_adopting_locale(request_id) {
                return Ok(Some(msg));
            }

            if self.session.borrow().request_complete(request_id) {
                return Ok(None);
            }

            if remaining <= 0 {
                break;
            }

            // Then wait out the remaining budget.
            let start = Instant::now();
            stack::process(&client, remaining, None, None)?;

            if let Some(msg) = self.pop_reply_adopting_locale(request_id) {
                return Ok(Some(msg));
            }

            if self.session.borrow().request_complete(request_id) {
                return Ok(None);
            }

            if self.session.borrow_mut().take_reset_timeout(request_id) {
                log::debug!("{self} request {request_id} received a timeout reset");
                remaining = timeout;
            } else {
                remaining -= start.elapsed().as_secs() as i32;
            }
        }

        log::info!("{self} request_recv timed out for request {request_id}");

        Ok(None)
    }

    /// Pop the next queued reply, adopting the sender's locale into
    /// the session as a side effect.
    fn pop_reply_adopting_locale(&self, request_id: usize) -> Option<Message> {
        let mut ses = self.session.borrow_mut();
        let msg = ses.pop_reply(request_id)?;

        if let Some(locale) = msg.locale() {
            ses.set_locale(locale);
        }

        Some(msg)
    }

    /// Send a single reply to the request at `request_id`.
    pub fn respond<T>(&self, request_id: usize, value: T) -> Result<(), String>
    where
        T: Into<JsonValue>,
    {
        let msg = Message::new(
            MessageType::Result,
            request_id,
            Payload::Result(message::Result::new(
                MessageStatus::Ok,
                "OK",
                message::RESULT_CLASS,
                value.into(),
            )),
        );

        self.send_batch(vec![msg])
    }

    /// Reply with a final value.
    ///
    /// The value and the Request Complete status travel in a single
    /// transport frame.
    pub fn respond_complete<T>(&self, request_id: usize, value: T) -> Result<(), String>
    where
        T: Into<JsonValue>,
    {
        if self.responded_complete() {
            log::warn!(
                "{self} respond_complete() called multiple times for request {request_id}; \
                 dropping trailing response"
            );
            return Ok(());
        }

        let result = Message::new(
            MessageType::Result,
            request_id,
            Payload::Result(message::Result::new(
                MessageStatus::Ok,
                "OK",
                message::RESULT_CLASS,
                value.into(),
            )),
        );

        self.session.borrow_mut().responded_complete = true;

        self.send_batch(vec![result, self.complete_status_message(request_id)])
    }

    /// Send the Request Complete status on its own.
    pub fn send_complete(&self, request_id: usize) -> Result<(), String> {
        self.session.borrow_mut().responded_complete = true;
        self.send_batch(vec![self.complete_status_message(request_id)])
    }

    fn complete_status_message(&self, request_id: usize) -> Message {
        Message::new(
            MessageType::Status,
            request_id,
            Payload::Status(message::Status::new(
                MessageStatus::Complete,
                "Request Complete",
                message::CONNECT_STATUS_CLASS,
            )),
        )
    }

    /// Send a standalone status message for the given request.
    pub fn status(
        &self,
        request_id: usize,
        status: MessageStatus,
        name: &str,
        text: &str,
    ) -> Result<(), String> {
        let msg = Message::new(
            MessageType::Status,
            request_id,
            Payload::Status(message::Status::new(status, text, name)),
        );

        self.send_batch(vec![msg])
    }

    /// Resend the stored request payload for the given id, unless the
    /// request has already completed.
    pub(crate) fn resend_request(&self, request_id: usize) -> Result<(), String> {
        let payload = self.session.borrow().stored_request_payload(request_id);

        match payload {
            Some(msg) => {
                log::debug!("{self} resending request {request_id}");
                self.send_batch(vec![msg])
            }
            None => Ok(()),
        }
    }

    /// Encode one or more messages into a single frame and send it.
    ///
    /// Before sending, apply any state changes the transport already
    /// has queued, then reconcile connection state: stateless
    /// sessions retarget their original address; a disconnected
    /// client session implicitly connects first, unless the batch
    /// itself opens or closes the conversation.
    pub fn send_batch(&self, msgs: Vec<Message>) -> Result<(), String> {
        if msgs.is_empty() {
            return Ok(());
        }

        let client = self.client();
        stack::process(&client, 0, None, None)?;

        let mut need_connect = false;

        {
            let mut ses = self.session.borrow_mut();

            if ses.state() != SessionState::Connected {
                if ses.stateless() {
                    ses.reset_remote();
                } else if ses.session_type() == SessionType::Client
                    && *msgs[0].mtype() != MessageType::Connect
                    && *msgs[0].mtype() != MessageType::Disconnect
                {
                    need_connect = true;
                }
            }
        }

        if need_connect {
            self.connect()?;
        }

        self.session.borrow_mut().send_frame(&msgs)
    }
}

/// Models a single API call through which the caller can receive
/// responses.
pub struct Request {
    session: SessionHandle,

    /// Have we seen end-of-stream for this request?
    complete: bool,

    request_id: usize,
}

impl Request {
    fn new(session: SessionHandle, request_id: usize) -> Request {
        Request {
            session,
            request_id,
            complete: false,
        }
    }

    pub fn request_id(&self) -> usize {
        self.request_id
    }

    /// True if end-of-stream has been observed.
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Receive the next response value for this request.
    ///
    /// Returns Ok(None) at end-of-stream.  A reply synthesized from
    /// an unhandled peer status surfaces as an Err.
    pub fn recv_with_timeout(&mut self, timeout: i32) -> Result<Option<JsonValue>, String> {
        if self.complete {
            return Ok(None);
        }

        let mut msg = match self.session.request_recv(self.request_id, timeout)? {
            Some(m) => m,
            None => {
                self.complete = true;
                return Ok(None);
            }
        };

        let is_exception = msg.is_exception();

        match msg.payload_mut() {
            Payload::Result(res) => {
                if is_exception {
                    self.complete = true;
                    Err(format!(
                        "request {} failed: {} {}",
                        self.request_id,
                        res.status(),
                        res.status_label()
                    ))
                } else {
                    Ok(Some(res.take_content()))
                }
            }
            _ => Err(format!(
                "request {} received an unexpected reply type",
                self.request_id
            )),
        }
    }

    pub fn recv(&mut self) -> Result<Option<JsonValue>, String> {
        self.recv_with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Pull all responses and return the first.
    ///
    /// Handy if you are expecting exactly one result, or only care
    /// about the first, but want to consume the request to
    /// completion.
    pub fn first(&mut self) -> Result<Option<JsonValue>, String> {
        self.first_with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn first_with_timeout(&mut self, timeout: i32) -> Result<Option<JsonValue>, String> {
        let mut resp: Option<JsonValue> = None;

        while !self.complete {
            if let Some(r) = self.recv_with_timeout(timeout)? {
                if resp.is_none() {
                    resp = Some(r);
                } // else discard the non-first response.
            }
        }

        Ok(resp)
    }

    /// Remove this request from its session's table.
    pub fn finish(&self) {
        self.session.request_finish(self.request_id);
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        self.session.request_finish(self.request_id);
    }
}

/// Iterates over a series of replies to an API request.
pub struct ResponseIterator {
    request: Request,
}

impl Iterator for ResponseIterator {
    type Item = Result<JsonValue, String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.request.recv().transpose()
    }
}

impl ResponseIterator {
    pub fn new(request: Request) -> Self {
        ResponseIterator { request }
    }
}
