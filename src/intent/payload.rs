//! Payload construction from a normalized request.

use serde_json::{Map, Value};

use crate::model::Payload;

/// Build a payload from a request body plus extra named parameters.
///
/// The body is used as-is when it parses as JSON; otherwise it is kept as a
/// UTF-8 string under `"body"`. An empty body starts from an empty object.
/// Parameters are merged in order, later ones overwriting earlier ones, but
/// only when the payload is an object.
pub fn build_payload<I, K, V>(body: &[u8], params: I) -> Payload
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let mut payload = parse_body(body);

    if let Value::Object(map) = &mut payload {
        for (name, value) in params {
            map.insert(name.into(), value.into());
        }
    }

    payload
}

fn parse_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(_) => {
            let mut map = Map::new();
            map.insert(
                "body".to_string(),
                Value::String(String::from_utf8_lossy(body).into_owned()),
            );
            Value::Object(map)
        }
    }
}
