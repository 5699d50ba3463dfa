//! The frame model and the transport seam the session layer consumes.
use super::message::Message;
use json::JsonValue;

/// One addressed frame moving through the bus.
///
/// The body is an envelope: an ordered list of classed messages
/// (see the codec module).
pub struct Frame {
    to: String,
    from: String,
    thread: String,
    osrf_xid: String,
    body: JsonValue,
    is_error: bool,
}

impl Frame {
    pub fn new(to: &str, from: &str, thread: &str) -> Self {
        Frame {
            to: to.to_string(),
            from: from.to_string(),
            thread: thread.to_string(),
            osrf_xid: String::from(""),
            body: JsonValue::new_array(),
            is_error: false,
        }
    }

    pub fn with_body(to: &str, from: &str, thread: &str, msg: Message) -> Self {
        let mut frame = Frame::new(to, from, thread);
        frame.body.push(msg.to_json_value()).ok();
        frame
    }

    pub fn with_body_value(to: &str, from: &str, thread: &str, body: JsonValue) -> Self {
        let mut frame = Frame::new(to, from, thread);
        frame.body = body;
        frame
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn set_to(&mut self, to: &str) {
        self.to = to.to_string();
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn set_from(&mut self, from: &str) {
        self.from = from.to_string();
    }

    pub fn thread(&self) -> &str {
        &self.thread
    }

    pub fn body(&self) -> &JsonValue {
        &self.body
    }

    /// Returns the frame body, replacing it with an empty list.
    pub fn take_body(&mut self) -> JsonValue {
        self.body.take()
    }

    pub fn osrf_xid(&self) -> &str {
        &self.osrf_xid
    }

    pub fn set_osrf_xid(&mut self, xid: &str) {
        self.osrf_xid = xid.to_string()
    }

    /// True for transport-layer error notifications, e.g. a frame
    /// bounced off an address that no longer exists.
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn set_is_error(&mut self, is_error: bool) {
        self.is_error = is_error;
    }

    pub fn from_json_value(json_obj: &JsonValue) -> Option<Self> {
        let to = match json_obj["to"].as_str() {
            Some(i) => i,
            None => {
                return None;
            }
        };

        let from = match json_obj["from"].as_str() {
            Some(i) => i,
            None => {
                return None;
            }
        };

        let thread = match json_obj["thread"].as_str() {
            Some(t) => t,
            None => "",
        };

        let mut frame = Frame::new(to, from, thread);

        if let Some(xid) = json_obj["osrf_xid"].as_str() {
            frame.set_osrf_xid(xid);
        }

        if json_obj["is_error"].as_bool().unwrap_or(false) {
            frame.set_is_error(true);
        }

        frame.body = json_obj["body"].clone();

        Some(frame)
    }

    pub fn to_json_value(&self) -> JsonValue {
        let mut obj = json::object! {
            to: json::from(self.to.clone()),
            from: json::from(self.from.clone()),
            thread: json::from(self.thread.clone()),
            osrf_xid: json::from(self.osrf_xid.clone()),
            body: self.body.clone(),
        };

        if self.is_error {
            obj["is_error"] = json::from(true);
        }

        obj
    }
}

/// The connection the session layer reads and writes.
///
/// Timeout contract for recv(): a negative timeout blocks
/// indefinitely, zero does not block, and a positive value waits up
/// to that many seconds.
pub trait Transport {
    /// Our endpoint address on the bus.
    fn address(&self) -> &str;

    /// Returns at most one frame.
    ///
    /// `recipient` overrides the default of listening at our own
    /// endpoint address, e.g. a service-level queue.
    fn recv(&mut self, timeout: i32, recipient: Option<&str>) -> Result<Option<Frame>, String>;

    /// Sends one frame to its "to" address.
    fn send(&mut self, frame: &Frame) -> Result<(), String>;

    /// True if the connection is usable.
    fn connected(&mut self) -> bool;

    /// True if this connection has seen an unrecoverable read/write
    /// error.
    fn error(&self) -> bool;

    /// Discard any data pending at our endpoint address.
    fn clear(&mut self) -> Result<(), String>;
}
