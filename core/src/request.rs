//! Request descriptors and their deduplication keys

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// HTTP method of a logical call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Idempotent read
    Get,
    /// Create
    Post,
    /// Replace
    Put,
    /// Partial update
    Patch,
    /// Remove
    Delete,
}

impl Method {
    /// Uppercase wire name (`"GET"`, `"POST"`, ...)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Check if this method is a read
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One part of a multipart form submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Plain text field
    Text {
        /// Form field name
        name: String,
        /// Field value
        value: String,
    },
    /// File upload (photos attached to posts, journal scans)
    File {
        /// Form field name
        name: String,
        /// File name reported to the server
        file_name: String,
        /// MIME type, left to the encoder when `None`
        mime: Option<String>,
        /// Raw file contents
        bytes: Vec<u8>,
    },
}

/// Multipart form payload
///
/// Never deduplicated: its contents are not cheaply comparable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartPayload {
    /// Parts in submission order
    pub parts: Vec<Part>,
}

impl MultipartPayload {
    /// Create an empty payload
    #[must_use]
    pub const fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Append a text field
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Append a file
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            file_name: file_name.into(),
            mime,
            bytes,
        });
        self
    }
}

/// Identity of "the same logical call" issued concurrently
///
/// Built from method, path and the serialized body. Two descriptors with an
/// equal key are collapsed into one exchange while the first is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    /// Borrow the key as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable description of one logical call
///
/// # Example
///
/// ```
/// use hearth_core::request::{Method, RequestDescriptor};
/// use serde_json::json;
///
/// let request = RequestDescriptor::patch("/milestones/3")
///     .with_body(json!({ "achieved": true }))
///     .with_header("x-client-version", "2.4.0");
///
/// assert_eq!(request.method(), Method::Patch);
/// assert_eq!(request.headers().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    body: Option<Value>,
    headers: Vec<(String, String)>,
    multipart: Option<MultipartPayload>,
}

impl RequestDescriptor {
    /// Create a descriptor with no body
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            multipart: None,
        }
    }

    /// `GET path`
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// `POST path`
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// `PUT path`
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// `PATCH path`
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// `DELETE path`
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Multipart form submission, always sent as `POST`
    #[must_use]
    pub fn multipart(path: impl Into<String>, payload: MultipartPayload) -> Self {
        Self {
            multipart: Some(payload),
            ..Self::new(Method::Post, path)
        }
    }

    /// Attach a JSON body
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach an extra header, sent after the identity headers
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Path relative to the service base URL
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// JSON body, if any
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Extra headers
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Multipart payload, if this is a form submission
    #[must_use]
    pub const fn multipart_payload(&self) -> Option<&MultipartPayload> {
        self.multipart.as_ref()
    }

    /// Check if this is a multipart submission
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        self.multipart.is_some()
    }

    /// Deduplication key
    ///
    /// Returns `None` for multipart submissions, and for anything other than
    /// `GET` when `dedupe_writes` is off.
    ///
    /// Object fields in the body are sorted before serializing, so the key
    /// does not depend on insertion order even when `serde_json` is built
    /// with `preserve_order`.
    #[must_use]
    pub fn key(&self, dedupe_writes: bool) -> Option<RequestKey> {
        if self.is_multipart() || (!dedupe_writes && !self.method.is_read()) {
            return None;
        }

        let body = self
            .body
            .as_ref()
            .map(|body| canonical(body).to_string())
            .unwrap_or_default();
        Some(RequestKey(format!("{}:{}:{}", self.method, self.path, body)))
    }
}

/// Rebuild `value` with every object's fields in key order
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_unstable_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                fields
                    .into_iter()
                    .map(|(name, field)| (name.clone(), canonical(field)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_key_includes_method_path_and_body() {
        let key = RequestDescriptor::post("/posts")
            .with_body(json!({ "text": "first steps today" }))
            .key(true)
            .unwrap();

        assert_eq!(key.as_str(), r#"POST:/posts:{"text":"first steps today"}"#);
    }

    #[test]
    fn test_key_ignores_extra_headers() {
        let plain = RequestDescriptor::get("/feed");
        let tagged = RequestDescriptor::get("/feed").with_header("x-trace", "abc");

        assert_eq!(plain.key(true), tagged.key(true));
    }

    #[test]
    fn test_key_differs_by_method() {
        let get = RequestDescriptor::get("/posts/1");
        let delete = RequestDescriptor::delete("/posts/1");

        assert_ne!(get.key(true), delete.key(true));
    }

    #[test]
    fn test_key_is_stable_for_object_field_order() {
        let a = RequestDescriptor::post("/comments").with_body(json!({ "a": 1, "b": 2 }));
        let b = RequestDescriptor::post("/comments").with_body(json!({ "b": 2, "a": 1 }));

        assert_eq!(a.key(true), b.key(true));
    }

    #[test]
    fn test_canonical_sorts_nested_fields_but_keeps_array_order() {
        let body = json!({
            "z": { "y": 1, "x": [{ "b": 2, "a": 1 }, 3] },
            "m": null,
        });

        assert_eq!(
            canonical(&body).to_string(),
            r#"{"m":null,"z":{"x":[{"a":1,"b":2},3],"y":1}}"#
        );

        let reordered = RequestDescriptor::post("/journal").with_body(json!([2, 1]));
        let original = RequestDescriptor::post("/journal").with_body(json!([1, 2]));
        assert_ne!(reordered.key(true), original.key(true));
    }

    #[test]
    fn test_multipart_has_no_key() {
        let payload = MultipartPayload::new()
            .text("caption", "park day")
            .file("photo", "park.jpg", Some("image/jpeg".to_string()), vec![0xFF, 0xD8]);
        let request = RequestDescriptor::multipart("/posts/upload", payload);

        assert_eq!(request.method(), Method::Post);
        assert!(request.is_multipart());
        assert!(request.key(true).is_none());
    }

    #[test]
    fn test_writes_unkeyed_when_write_dedup_disabled() {
        let read = RequestDescriptor::get("/notifications");
        let write = RequestDescriptor::post("/notifications/read");

        assert!(read.key(false).is_some());
        assert!(write.key(false).is_none());
        assert!(write.key(true).is_some());
    }

    proptest! {
        #[test]
        fn prop_equal_descriptors_share_key(path in "/[a-z]{1,12}(/[0-9]{1,4})?", n in 0i64..1000) {
            let a = RequestDescriptor::put(path.clone()).with_body(json!({ "n": n }));
            let b = RequestDescriptor::put(path).with_body(json!({ "n": n }));
            prop_assert_eq!(a.key(true), b.key(true));
        }

        #[test]
        fn prop_different_bodies_never_collide(n in 0i64..1000, m in 0i64..1000) {
            prop_assume!(n != m);
            let a = RequestDescriptor::post("/reactions").with_body(json!({ "n": n }));
            let b = RequestDescriptor::post("/reactions").with_body(json!({ "n": m }));
            prop_assert_ne!(a.key(true), b.key(true));
        }
    }
}
