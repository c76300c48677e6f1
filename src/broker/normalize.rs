//! Turns whatever the broker delivered into a JSON document for storage.

use std::borrow::Cow;

use serde_json::{Value, json};

use crate::transport::Payload;

/// Key used to wrap bodies that are not valid JSON.
pub const RAW_MESSAGE_KEY: &str = "rawMessage";

/// Normalize a payload. Never fails: text that does not parse as JSON comes
/// back as `{"rawMessage": text}`.
///
/// Text is taken from, in order: a declared UTF-8 content body, a raw
/// binary body (both decoded lossily), a text body, or the JSON rendering of
/// a structured body.
pub fn normalize(payload: &Payload) -> Value {
    let text: Cow<'_, str> = match payload {
        Payload::Utf8Content(bytes) => String::from_utf8_lossy(bytes),
        Payload::Binary(bytes) => String::from_utf8_lossy(bytes),
        Payload::Text(text) => Cow::Borrowed(text.as_str()),
        Payload::Structured(value) => Cow::Owned(value.to_string()),
        Payload::Empty => Cow::Borrowed(""),
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(parsed) => parsed,
        Err(_) => json!({ RAW_MESSAGE_KEY: text }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_text_is_parsed() {
        let value = normalize(&Payload::from("{\"k\":1}"));
        assert_eq!(value, json!({"k": 1}));
    }

    #[test]
    fn plain_text_is_wrapped() {
        let value = normalize(&Payload::from("hello"));
        assert_eq!(value, json!({"rawMessage": "hello"}));
    }

    #[test]
    fn utf8_content_is_decoded_then_parsed() {
        let value = normalize(&Payload::Utf8Content(br#"{"temp":25}"#.to_vec()));
        assert_eq!(value, json!({"temp": 25}));
    }

    #[test]
    fn binary_is_decoded_as_utf8() {
        let value = normalize(&Payload::Binary("héllo".as_bytes().to_vec()));
        assert_eq!(value, json!({"rawMessage": "héllo"}));
    }

    #[test]
    fn invalid_utf8_degrades_instead_of_failing() {
        let value = normalize(&Payload::Binary(vec![0xff, 0xfe, b'a']));
        let raw = value[RAW_MESSAGE_KEY].as_str().expect("wrapped as raw text");
        assert!(raw.ends_with('a'));
        assert!(raw.contains('\u{fffd}'));
    }

    #[test]
    fn structured_body_round_trips() {
        let body = json!({"list": [1, 2, 3], "nested": {"ok": true}});
        assert_eq!(normalize(&Payload::Structured(body.clone())), body);
    }

    #[test]
    fn json_scalars_are_kept() {
        assert_eq!(normalize(&Payload::from("42")), json!(42));
        assert_eq!(normalize(&Payload::from("\"quoted\"")), json!("quoted"));
    }

    #[test]
    fn empty_body_is_wrapped() {
        assert_eq!(normalize(&Payload::Empty), json!({"rawMessage": ""}));
    }
}
