//! Encode / Decode JSON values with class names.
use json::JsonValue;

const JSON_CLASS_KEY: &str = "__c";
const JSON_PAYLOAD_KEY: &str = "__p";

/// Key used to carry a class name inside a flattened (unwrapped) object.
pub const CLASSNAME_KEY: &str = "_classname";

pub struct ClassifiedJson {
    json: JsonValue,
    class: String,
}

impl ClassifiedJson {
    pub fn json(&self) -> &JsonValue {
        &self.json
    }

    /// Returns the JSON value stored in the ClassifiedJson struct,
    /// replacing the value with JsonValue::Null.
    pub fn take_json(&mut self) -> JsonValue {
        std::mem::replace(&mut self.json, JsonValue::Null)
    }

    /// Returns the class name / hint value for the classified object.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Wraps a json value in class and payload keys.
    ///
    /// Non-recursive.
    ///
    /// ```
    /// let obj = json::array![1,2,3];
    /// let obj = busrpc::classified::ClassifiedJson::classify(obj, "abc");
    /// assert_eq!(obj["__c"].as_str().unwrap(), "abc");
    /// assert_eq!(obj["__p"][1].as_u8().unwrap(), 2u8);
    /// ```
    pub fn classify(json: JsonValue, class: &str) -> JsonValue {
        let mut hash = JsonValue::new_object();
        hash.insert(JSON_CLASS_KEY, class).ok();
        hash.insert(JSON_PAYLOAD_KEY, json).ok();

        hash
    }

    pub fn can_declassify(obj: &JsonValue) -> bool {
        obj.is_object()
            && obj.has_key(JSON_CLASS_KEY)
            && obj.has_key(JSON_PAYLOAD_KEY)
            && obj[JSON_CLASS_KEY].is_string()
    }

    /// Turns a json value into a ClassifiedJson if it's a hash
    /// with the needed class and payload keys.
    ///
    /// Non-recursive.
    ///
    /// ```
    /// let obj = json::object! {__c: "abc", __p: [1,2,3]};
    /// let value_op = busrpc::classified::ClassifiedJson::declassify(obj);
    /// assert!(value_op.is_some());
    /// let value = value_op.unwrap();
    /// assert_eq!(value.class(), "abc");
    /// assert_eq!(value.json()[1].as_u8().unwrap(), 2u8);
    /// ```
    pub fn declassify(mut obj: JsonValue) -> Option<ClassifiedJson> {
        if ClassifiedJson::can_declassify(&obj) {
            Some(ClassifiedJson {
                class: obj[JSON_CLASS_KEY].as_str().unwrap().to_string(),
                json: obj[JSON_PAYLOAD_KEY].take(),
            })
        } else {
            None
        }
    }
}

/// Recursively flatten class wrappers.
///
/// Every `{"__c": class, "__p": data}` wrapper whose data is an object
/// becomes the data object itself with the class stored under the
/// reserved "_classname" key.  Wrappers around non-object payloads are
/// left wrapped, since scalars and arrays have nowhere to carry the
/// class name.
///
/// ```
/// let obj = json::object! {__c: "abc", __p: {a: 1}};
/// let flat = busrpc::classified::decode_classes(&obj);
/// assert_eq!(flat["_classname"].as_str().unwrap(), "abc");
/// assert_eq!(flat["a"].as_u8().unwrap(), 1u8);
/// ```
pub fn decode_classes(value: &JsonValue) -> JsonValue {
    if value.is_array() {
        let mut arr = JsonValue::new_array();
        for item in value.members() {
            arr.push(decode_classes(item)).ok();
        }
        return arr;
    }

    if !value.is_object() {
        return value.clone();
    }

    if ClassifiedJson::can_declassify(value) {
        let class = value[JSON_CLASS_KEY].as_str().unwrap().to_string();
        let inner = decode_classes(&value[JSON_PAYLOAD_KEY]);

        if inner.is_object() {
            let mut obj = inner;
            obj.insert(CLASSNAME_KEY, class).ok();
            return obj;
        }

        return ClassifiedJson::classify(inner, &class);
    }

    let mut obj = JsonValue::new_object();
    for (key, val) in value.entries() {
        obj.insert(key, decode_classes(val)).ok();
    }

    obj
}

/// The inverse of decode_classes(): every object carrying a
/// "_classname" key is re-wrapped in class and payload keys.
///
/// ```
/// let obj = json::object! {_classname: "abc", a: 1};
/// let wrapped = busrpc::classified::encode_classes(&obj);
/// assert_eq!(wrapped["__c"].as_str().unwrap(), "abc");
/// assert_eq!(wrapped["__p"]["a"].as_u8().unwrap(), 1u8);
/// ```
pub fn encode_classes(value: &JsonValue) -> JsonValue {
    if value.is_array() {
        let mut arr = JsonValue::new_array();
        for item in value.members() {
            arr.push(encode_classes(item)).ok();
        }
        return arr;
    }

    if !value.is_object() {
        return value.clone();
    }

    if let Some(class) = value[CLASSNAME_KEY].as_str() {
        let class = class.to_string();
        let mut obj = JsonValue::new_object();
        for (key, val) in value.entries() {
            if key != CLASSNAME_KEY {
                obj.insert(key, encode_classes(val)).ok();
            }
        }
        return ClassifiedJson::classify(obj, &class);
    }

    let mut obj = JsonValue::new_object();
    for (key, val) in value.entries() {
        obj.insert(key, encode_classes(val)).ok();
    }

    obj
}
