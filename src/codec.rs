//! Envelope codec: batches of messages to and from one frame body.
use super::message::Message;
use json::JsonValue;
use log::warn;

/// The most messages extracted from a single frame body.  Additional
/// elements are dropped.
pub const MAX_MESSAGES_PER_FRAME: usize = 256;

/// Encode a batch of messages into a single frame body: an ordered
/// list of classed message objects.
pub fn encode_batch(msgs: &[Message]) -> JsonValue {
    let mut body = JsonValue::new_array();

    for msg in msgs {
        body.push(msg.to_json_value()).ok();
    }

    body
}

/// Decode a frame body into messages.
///
/// Elements that are not classed messages, or that cannot be coerced
/// into one, are skipped with a warning.  At most
/// MAX_MESSAGES_PER_FRAME messages are extracted; the remainder of the
/// body is dropped.
pub fn decode_batch(body: &JsonValue) -> Vec<Message> {
    let mut msgs = Vec::new();

    if body.is_array() {
        for elem in body.members() {
            if msgs.len() >= MAX_MESSAGES_PER_FRAME {
                warn!(
                    "Frame body exceeds {} messages; dropping the rest",
                    MAX_MESSAGES_PER_FRAME
                );
                break;
            }
            if let Some(msg) = Message::from_json_value(elem) {
                msgs.push(msg);
            }
        }
    } else if !body.is_null() {
        // A body is typically a list, but a single bare message
        // is accepted.
        if let Some(msg) = Message::from_json_value(body) {
            msgs.push(msg);
        }
    }

    msgs
}

/// Decode a frame body from raw JSON text.
pub fn decode_batch_str(body: &str) -> Result<Vec<Message>, String> {
    match json::parse(body) {
        Ok(json_val) => Ok(decode_batch(&json_val)),
        Err(e) => Err(format!("Error parsing frame body: {e} {body}")),
    }
}
