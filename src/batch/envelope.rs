//! Multipart batch request encoding.
//!
//! Each descriptor becomes one `application/http` part whose body is a literal
//! HTTP request line (plus a JSON body for non-GET calls). Parts are tagged
//! `Content-ID: <item-N>` with their position in the batch; the server echoes
//! that back as `<response-item-N>`.

use super::collector::Batch;
use crate::types::CallDescriptor;
use crate::Result;
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

pub const DEFAULT_BATCH_ENDPOINT: &str = "https://www.googleapis.com/batch";

/// One inner part of a batch envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MimePart {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_id(&self) -> Option<&str> {
        self.header("Content-ID")
    }
}

/// Outbound description of one batch HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEnvelope {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub parts: Vec<MimePart>,
    /// Sequence number of the batch this envelope was built from.
    pub seq: usize,
}

impl BatchEnvelope {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Bearer token carried by the `Authorization` header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Header value for the outer request once a boundary is chosen.
    pub fn content_type(boundary: &str) -> String {
        format!("multipart/mixed; boundary={}", boundary)
    }

    /// Render the multipart/mixed body for `boundary`.
    pub fn render(&self, boundary: &str) -> Bytes {
        let mut out = BytesMut::new();
        for part in &self.parts {
            out.put_slice(b"--");
            out.put_slice(boundary.as_bytes());
            out.put_slice(b"\r\n");
            for (name, value) in &part.headers {
                out.put_slice(name.as_bytes());
                out.put_slice(b": ");
                out.put_slice(value.as_bytes());
                out.put_slice(b"\r\n");
            }
            out.put_slice(b"\r\n");
            out.put_slice(part.body.as_bytes());
            out.put_slice(b"\r\n");
        }
        out.put_slice(b"--");
        out.put_slice(boundary.as_bytes());
        out.put_slice(b"--\r\n");
        out.freeze()
    }
}

/// A fresh, collision-resistant boundary string.
pub fn generate_boundary() -> String {
    format!("batch_{}", Uuid::new_v4().simple())
}

/// Builds [`BatchEnvelope`]s for a fixed endpoint and access token.
#[derive(Debug, Clone)]
pub struct RequestEncoder {
    endpoint: String,
    access_token: String,
}

impl RequestEncoder {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn encode(&self, batch: &Batch) -> Result<BatchEnvelope> {
        let parts = batch
            .items
            .iter()
            .enumerate()
            .map(|(i, call)| encode_part(i, call))
            .collect::<Result<Vec<_>>>()?;

        Ok(BatchEnvelope {
            url: self.endpoint.clone(),
            method: "POST".to_string(),
            headers: vec![
                ("Content-Type".to_string(), "multipart/mixed".to_string()),
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", self.access_token),
                ),
            ],
            parts,
            seq: batch.seq,
        })
    }
}

fn encode_part(index: usize, call: &CallDescriptor) -> Result<MimePart> {
    let method = call.method.to_uppercase();
    let mut body = format!("{} {}", method, call.url);
    if !call.query_params.is_empty() {
        let qs = call
            .query_params
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        body.push('?');
        body.push_str(&qs);
    }
    body.push('\n');

    if !call.is_get() {
        let json = match &call.json_body {
            Some(v) => serde_json::to_string_pretty(v)?,
            None => String::new(),
        };
        body.push_str("Content-Type: application/json\n\n");
        body.push_str(&json);
    }

    Ok(MimePart {
        headers: vec![
            ("Content-Type".to_string(), "application/http".to_string()),
            ("Content-ID".to_string(), format!("<item-{}>", index)),
        ],
        body,
    })
}

/// URI-component encoding: spaces become `%20`, not the form-encoding `+`.
/// `byte_serialize` already escapes a literal `+` as `%2B`.
fn encode_component(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
