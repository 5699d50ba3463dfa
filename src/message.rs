use super::util;
use json::JsonValue;
use log::warn;
use std::cell::RefCell;
use std::fmt;

const DEFAULT_LOCALE: &str = "en-US";
pub const DEFAULT_PROTOCOL: u8 = 1;

/// Class tag of every enveloped message.
pub const MESSAGE_CLASS: &str = "osrfMessage";
/// Class tag of a REQUEST payload.
pub const METHOD_CLASS: &str = "osrfMethod";
/// Class tag of a RESULT payload.
pub const RESULT_CLASS: &str = "osrfResult";
/// Class tag of a generic STATUS payload.
pub const STATUS_CLASS: &str = "osrfStatus";
/// Class tag of connection-related STATUS payloads.
pub const CONNECT_STATUS_CLASS: &str = "osrfConnectStatus";

thread_local! {
    /// Locale of the most recently decoded message, adopted as the
    /// default for outbound messages that carry none of their own.
    static THREAD_LOCALE: RefCell<Option<String>> = RefCell::new(None);
}

/// Set the thread-default locale.
pub fn set_thread_locale(locale: &str) {
    THREAD_LOCALE.with(|l| *l.borrow_mut() = Some(locale.to_string()));
}

/// Returns the thread-default locale.
pub fn thread_locale() -> String {
    THREAD_LOCALE.with(|l| match *l.borrow() {
        Some(ref s) => s.to_string(),
        None => DEFAULT_LOCALE.to_string(),
    })
}

/// Restore the thread-default locale to the compiled-in default.
pub fn reset_thread_locale() {
    THREAD_LOCALE.with(|l| *l.borrow_mut() = None);
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MessageType {
    Connect,
    Request,
    Result,
    Status,
    Disconnect,
    Unknown,
}

/// Create a MessageType from the string that would be found in a message.
///
/// ```
/// let mt: busrpc::message::MessageType = "REQUEST".into();
/// assert_eq!(mt, busrpc::message::MessageType::Request);
/// ```
impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s {
            "CONNECT" => MessageType::Connect,
            "REQUEST" => MessageType::Request,
            "RESULT" => MessageType::Result,
            "STATUS" => MessageType::Status,
            "DISCONNECT" => MessageType::Disconnect,
            _ => MessageType::Unknown,
        }
    }
}

/// Create the string that will be used within the serialized message
/// for a given MessageType.
///
/// ```
/// let s: &str = busrpc::message::MessageType::Request.into();
/// assert_eq!(s, "REQUEST");
/// ```
impl Into<&'static str> for MessageType {
    fn into(self) -> &'static str {
        match self {
            MessageType::Connect => "CONNECT",
            MessageType::Request => "REQUEST",
            MessageType::Result => "RESULT",
            MessageType::Status => "STATUS",
            MessageType::Disconnect => "DISCONNECT",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s: &str = (*self).into();
        write!(f, "{}", s)
    }
}

// Derive is needed to do things like: let i = self.status as isize;
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MessageStatus {
    Continue = 100,
    Ok = 200,
    Accepted = 202,
    Complete = 205,
    Redirected = 307,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    MethodNotFound = 404,
    NotAllowed = 405,
    ServiceNotFound = 406,
    Timeout = 408,
    Expfailed = 417,
    InternalServerError = 500,
    NotImplemented = 501,
    ServiceUnavailable = 503,
    VersionNotSupported = 505,
    Unknown,
}

/// Translate a code number into a MessageStatus.
///
/// ```
/// let ms: busrpc::message::MessageStatus = 205.into();
/// assert_eq!(ms, busrpc::message::MessageStatus::Complete);
/// ```
impl From<isize> for MessageStatus {
    fn from(num: isize) -> Self {
        match num {
            100 => MessageStatus::Continue,
            200 => MessageStatus::Ok,
            202 => MessageStatus::Accepted,
            205 => MessageStatus::Complete,
            307 => MessageStatus::Redirected,
            400 => MessageStatus::BadRequest,
            401 => MessageStatus::Unauthorized,
            403 => MessageStatus::Forbidden,
            404 => MessageStatus::MethodNotFound,
            405 => MessageStatus::NotAllowed,
            406 => MessageStatus::ServiceNotFound,
            408 => MessageStatus::Timeout,
            417 => MessageStatus::Expfailed,
            500 => MessageStatus::InternalServerError,
            501 => MessageStatus::NotImplemented,
            503 => MessageStatus::ServiceUnavailable,
            505 => MessageStatus::VersionNotSupported,
            _ => MessageStatus::Unknown,
        }
    }
}

/// Translate a MessageStatus into its serialized display label.
///
/// ```
/// let s: &str = busrpc::message::MessageStatus::Continue.into();
/// assert_eq!(s, "Continue");
/// ```
impl Into<&'static str> for MessageStatus {
    fn into(self) -> &'static str {
        match self {
            MessageStatus::Ok => "OK",
            MessageStatus::Continue => "Continue",
            MessageStatus::Complete => "Request Complete",
            MessageStatus::Redirected => "Redirected",
            MessageStatus::BadRequest => "Bad Request",
            MessageStatus::Timeout => "Timeout",
            MessageStatus::Expfailed => "Peer Unreachable",
            MessageStatus::MethodNotFound => "Method Not Found",
            MessageStatus::NotAllowed => "Not Allowed",
            MessageStatus::ServiceNotFound => "Service Not Found",
            MessageStatus::InternalServerError => "Internal Server Error",
            _ => "See Status Code",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}) {:?}", *self as isize, self)
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Method(Method),
    Result(Result),
    Status(Status),
    NoPayload,
}

impl Payload {
    pub fn to_json_value(&self) -> JsonValue {
        match self {
            Payload::Method(pl) => pl.to_json_value(),
            Payload::Result(pl) => pl.to_json_value(),
            Payload::Status(pl) => pl.to_json_value(),
            Payload::NoPayload => JsonValue::Null,
        }
    }
}

/// One RPC message.
///
/// Messages are packed in batches into transport frames; the
/// thread_trace ties each message to the logical request it belongs to.
#[derive(Debug, Clone)]
pub struct Message {
    mtype: MessageType,
    thread_trace: usize,
    protocol: u8,
    locale: Option<String>,
    is_exception: bool,
    payload: Payload,
}

impl Message {
    pub fn new(mtype: MessageType, thread_trace: usize, payload: Payload) -> Self {
        Message {
            mtype,
            thread_trace,
            payload,
            protocol: DEFAULT_PROTOCOL,
            locale: None,
            is_exception: false,
        }
    }

    pub fn mtype(&self) -> &MessageType {
        &self.mtype
    }

    pub fn set_mtype(&mut self, mtype: MessageType) {
        self.mtype = mtype;
    }

    pub fn thread_trace(&self) -> usize {
        self.thread_trace
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn set_protocol(&mut self, protocol: u8) {
        self.protocol = protocol;
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn set_locale(&mut self, locale: &str) {
        self.locale = Some(locale.to_string())
    }

    /// True for replies synthesized from an unhandled peer status.
    ///
    /// This is a process-local flag; it is never serialized.
    pub fn is_exception(&self) -> bool {
        self.is_exception
    }

    pub fn set_is_exception(&mut self, is_exception: bool) {
        self.is_exception = is_exception;
    }

    /// Creates a Message from a classed JSON value.
    ///
    /// Returns None if the JSON value cannot be coerced into a Message.
    pub fn from_json_value(json_obj: &JsonValue) -> Option<Self> {
        let mut msg_wrapper =
            match super::classified::ClassifiedJson::declassify(json_obj.clone()) {
                Some(mw) => mw,
                None => {
                    return None;
                }
            };

        if msg_wrapper.class() != MESSAGE_CLASS {
            warn!(
                "Message::from_json_value() unknown class {}",
                msg_wrapper.class()
            );
            return None;
        }

        let msg_hash = msg_wrapper.take_json();

        let thread_trace = match util::json_usize(&msg_hash["threadTrace"]) {
            Some(tt) => tt,
            None => {
                warn!("Message contains invalid threadTrace: {}", msg_hash.dump());
                return None;
            }
        };

        let mtype_str = match msg_hash["type"].as_str() {
            Some(s) => s,
            None => {
                return None;
            }
        };

        let mtype: MessageType = mtype_str.into();

        let payload = match Message::payload_from_json_value(mtype, &msg_hash["payload"]) {
            Some(p) => p,
            None => {
                return None;
            }
        };

        let mut msg = Message::new(mtype, thread_trace, payload);

        if let Some(lc) = msg_hash["locale"].as_str() {
            msg.set_locale(lc);
            set_thread_locale(lc);
        }

        if let Some(p) = util::json_isize(&msg_hash["protocol"]) {
            msg.set_protocol(p as u8);
        }

        Some(msg)
    }

    fn payload_from_json_value(mtype: MessageType, payload_obj: &JsonValue) -> Option<Payload> {
        match mtype {
            MessageType::Request => match Method::from_json_value(payload_obj) {
                Some(method) => Some(Payload::Method(method)),
                _ => None,
            },

            MessageType::Result => match Result::from_json_value(payload_obj) {
                Some(res) => Some(Payload::Result(res)),
                _ => None,
            },

            MessageType::Status => match Status::from_json_value(payload_obj) {
                Some(stat) => Some(Payload::Status(stat)),
                _ => None,
            },

            _ => Some(Payload::NoPayload),
        }
    }

    pub fn to_json_value(&self) -> JsonValue {
        let mtype: &str = self.mtype.into();

        let locale = match self.locale() {
            Some(l) => l.to_string(),
            None => thread_locale(),
        };

        let mut obj = json::object! {
            // Stringified for compatibility with older peers.
            threadTrace: json::from(format!("{}", self.thread_trace)),
            type: json::from(mtype),
            locale: json::from(locale),
        };

        match self.payload {
            // Avoid adding the "payload" key for non-payload messages.
            Payload::NoPayload => {}
            _ => obj["payload"] = self.payload.to_json_value(),
        }

        super::classified::ClassifiedJson::classify(obj, MESSAGE_CLASS)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Message type={} trace={}", self.mtype, self.thread_trace)
    }
}

/// Delivers a single API response.
///
/// Each request will have zero or more associated Result messages.
#[derive(Debug, Clone)]
pub struct Result {
    status: MessageStatus,

    status_label: String,

    msg_class: String,

    /// API response value.
    content: JsonValue,
}

impl Result {
    pub fn new(
        status: MessageStatus,
        status_label: &str,
        msg_class: &str,
        content: JsonValue,
    ) -> Self {
        Result {
            status,
            content,
            msg_class: msg_class.to_string(),
            status_label: status_label.to_string(),
        }
    }

    pub fn content(&self) -> &JsonValue {
        &self.content
    }

    /// Returns the response value, replacing it with JsonValue::Null.
    pub fn take_content(&mut self) -> JsonValue {
        self.content.take()
    }

    pub fn status(&self) -> &MessageStatus {
        &self.status
    }

    pub fn status_label(&self) -> &str {
        &self.status_label
    }

    /// The payload's class tag.
    ///
    /// Usually "osrfResult"; replies synthesized from an unhandled
    /// peer status carry that status's name instead.
    pub fn status_name(&self) -> &str {
        &self.msg_class
    }

    pub fn from_json_value(json_obj: &JsonValue) -> Option<Self> {
        let mut msg_wrapper =
            match super::classified::ClassifiedJson::declassify(json_obj.clone()) {
                Some(mw) => mw,
                None => {
                    return None;
                }
            };

        let msg_class = msg_wrapper.class().to_string();
        let msg_hash = msg_wrapper.take_json();

        // Accepts both stringified and numeric status codes.
        let code = match util::json_isize(&msg_hash["statusCode"]) {
            Some(c) => c,
            None => {
                warn!("Result has invalid status code {}", json_obj.dump());
                return None;
            }
        };

        let stat: MessageStatus = code.into();

        // If the message contains a status label, use it, otherwise
        // use the label associated locally with the status code.
        let stat_str: &str = match msg_hash["status"].as_str() {
            Some(s) => s,
            None => stat.into(),
        };

        Some(Result::new(
            stat,
            stat_str,
            &msg_class,
            msg_hash["content"].clone(),
        ))
    }

    pub fn to_json_value(&self) -> JsonValue {
        let obj = json::object! {
            status: json::from(self.status_label.clone()),
            statusCode: json::from(format!("{}", self.status as isize)),
            content: self.content.clone(),
        };

        super::classified::ClassifiedJson::classify(obj, &self.msg_class)
    }
}

/// A peer status report.
///
/// The message class carries the status name, e.g. "osrfConnectStatus".
#[derive(Debug, Clone)]
pub struct Status {
    status: MessageStatus,
    status_label: String,
    msg_class: String,
}

impl Status {
    pub fn new(status: MessageStatus, status_label: &str, msg_class: &str) -> Self {
        Status {
            status,
            status_label: status_label.to_string(),
            msg_class: msg_class.to_string(),
        }
    }

    pub fn status(&self) -> &MessageStatus {
        &self.status
    }

    pub fn status_label(&self) -> &str {
        &self.status_label
    }

    /// The status name, carried as the payload's class tag.
    pub fn status_name(&self) -> &str {
        &self.msg_class
    }

    pub fn from_json_value(json_obj: &JsonValue) -> Option<Self> {
        let mut msg_wrapper =
            match super::classified::ClassifiedJson::declassify(json_obj.clone()) {
                Some(mw) => mw,
                None => {
                    return None;
                }
            };

        let msg_class = msg_wrapper.class().to_string();
        let msg_hash = msg_wrapper.take_json();

        let code = match util::json_isize(&msg_hash["statusCode"]) {
            Some(c) => c,
            None => {
                warn!("Status has invalid status code {}", json_obj.dump());
                return None;
            }
        };

        let stat: MessageStatus = code.into();

        let stat_str: &str = match msg_hash["status"].as_str() {
            Some(s) => s,
            None => stat.into(),
        };

        Some(Status::new(stat, stat_str, &msg_class))
    }

    pub fn to_json_value(&self) -> JsonValue {
        let obj = json::object! {
            status: json::from(self.status_label.clone()),
            statusCode: json::from(format!("{}", self.status as isize)),
        };

        super::classified::ClassifiedJson::classify(obj, &self.msg_class)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "stat={} class={} label={}",
            self.status, self.msg_class, self.status_label
        )
    }
}

/// A single API request with method name and parameters.
#[derive(Debug, Clone)]
pub struct Method {
    method: String,
    params: Vec<JsonValue>,
    msg_class: String,
}

impl Method {
    pub fn new(method: &str, params: Vec<JsonValue>) -> Self {
        Method {
            params,
            method: String::from(method),
            msg_class: String::from(METHOD_CLASS),
        }
    }

    /// Create a Method from a classed JSON value.
    pub fn from_json_value(json_obj: &JsonValue) -> Option<Self> {
        let mut msg_wrapper =
            match super::classified::ClassifiedJson::declassify(json_obj.clone()) {
                Some(mw) => mw,
                None => {
                    return None;
                }
            };

        let msg_class = msg_wrapper.class().to_string();
        let msg_hash = msg_wrapper.take_json();

        let method = match msg_hash["method"].as_str() {
            Some(m) => m.to_string(),
            None => {
                return None;
            }
        };

        // A null or missing params list decodes as an empty one.
        let mut params = Vec::new();
        if let JsonValue::Array(ref arr) = msg_hash["params"] {
            params = arr.iter().map(|p| p.clone()).collect();
        }

        Some(Method {
            method,
            params,
            msg_class,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &Vec<JsonValue> {
        &self.params
    }

    /// Returns the parameter list, leaving an empty one behind.
    pub fn take_params(&mut self) -> Vec<JsonValue> {
        std::mem::replace(&mut self.params, Vec::new())
    }

    /// Replace the parameter list.
    ///
    /// A bare scalar is wrapped into a one-element list.
    pub fn set_params(&mut self, params: JsonValue) {
        match params {
            JsonValue::Array(arr) => self.params = arr,
            value => self.params = vec![value],
        }
    }

    /// Create a JsonValue from a Method.
    pub fn to_json_value(&self) -> JsonValue {
        let params: Vec<JsonValue> = self.params.iter().map(|v| v.clone()).collect();

        let obj = json::object! {
            method: json::from(self.method()),
            params: json::from(params),
        };

        super::classified::ClassifiedJson::classify(obj, &self.msg_class)
    }
}
