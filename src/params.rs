//! Parameter lists for API calls.
use json::JsonValue;

/// The parameter list attached to an outbound API call.
///
/// Request parameters always travel as a sequence.  Callers may hand
/// the request builders anything convertible: a Vec contributes one
/// parameter per element, a lone scalar becomes a one-element
/// sequence, and None means no parameters at all.  To send a single
/// parameter that is itself a list, pass a JsonValue::Array (e.g.
/// json::array![1, 2, 3]).
pub struct ApiParams {
    params: Vec<JsonValue>,
}

impl ApiParams {
    /// A call with no parameters.
    pub fn none() -> ApiParams {
        ApiParams { params: Vec::new() }
    }

    fn scalar(value: JsonValue) -> ApiParams {
        ApiParams {
            params: vec![value],
        }
    }

    /// Append one parameter.
    pub fn add(&mut self, value: JsonValue) {
        self.params.push(value);
    }

    pub fn params(&self) -> &Vec<JsonValue> {
        &self.params
    }

    /// Returns the parameter list, consuming self.
    pub fn take_params(self) -> Vec<JsonValue> {
        self.params
    }
}

/// Each element of a Vec is one call parameter.
impl<T> From<Vec<T>> for ApiParams
where
    T: Into<JsonValue>,
{
    fn from(values: Vec<T>) -> ApiParams {
        ApiParams {
            params: values.into_iter().map(|v| v.into()).collect(),
        }
    }
}

impl From<&Vec<JsonValue>> for ApiParams {
    fn from(values: &Vec<JsonValue>) -> ApiParams {
        ApiParams {
            params: values.clone(),
        }
    }
}

/// A bare value is a call with exactly one parameter.
impl From<JsonValue> for ApiParams {
    fn from(value: JsonValue) -> ApiParams {
        ApiParams::scalar(value)
    }
}

impl From<&JsonValue> for ApiParams {
    fn from(value: &JsonValue) -> ApiParams {
        ApiParams::scalar(value.clone())
    }
}

impl From<Option<JsonValue>> for ApiParams {
    fn from(value: Option<JsonValue>) -> ApiParams {
        match value {
            Some(v) => ApiParams::scalar(v),
            None => ApiParams::none(),
        }
    }
}

impl From<&str> for ApiParams {
    fn from(value: &str) -> ApiParams {
        ApiParams::scalar(json::from(value))
    }
}

impl From<String> for ApiParams {
    fn from(value: String) -> ApiParams {
        ApiParams::scalar(json::from(value))
    }
}

impl From<i64> for ApiParams {
    fn from(value: i64) -> ApiParams {
        ApiParams::scalar(json::from(value))
    }
}

impl From<u64> for ApiParams {
    fn from(value: u64) -> ApiParams {
        ApiParams::scalar(json::from(value))
    }
}

impl From<usize> for ApiParams {
    fn from(value: usize) -> ApiParams {
        ApiParams::scalar(json::from(value))
    }
}
