//! 类型模块：调用描述与逐项结果。
//!
//! # Types Module
//!
//! Core data types flowing through the batch pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CallDescriptor`] | One remote call to be placed inside a batch |
//! | [`ItemResult`] | Decoded outcome of one sub-response |
//! | [`ItemPayload`] | JSON value or an undecodable body with its error |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One remote call, as submitted by the caller.
///
/// Query parameters live in a sorted map so the encoded request line is
/// stable for a given descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub method: String,
    pub url: String,
    #[serde(default, alias = "qs")]
    pub query_params: BTreeMap<String, String>,
    #[serde(default, alias = "json", skip_serializing_if = "Option::is_none")]
    pub json_body: Option<Value>,
}

impl CallDescriptor {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
            query_params: BTreeMap::new(),
            json_body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new("POST", url).with_json_body(body)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// Body of a delivered result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPayload {
    /// The sub-response body decoded as JSON.
    Json(Value),
    /// The body was present but not valid JSON; only emitted when filtering is off.
    Undecodable { body: String, error: String },
}

/// Result for a single submitted call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemResult {
    /// Submission index of the originating descriptor, when the sub-response
    /// carried a `Content-ID`.
    pub index: Option<usize>,
    /// Status code of the embedded HTTP response.
    pub status: Option<u16>,
    pub payload: ItemPayload,
}

impl ItemResult {
    pub fn json(&self) -> Option<&Value> {
        match &self.payload {
            ItemPayload::Json(v) => Some(v),
            ItemPayload::Undecodable { .. } => None,
        }
    }

    pub fn is_undecodable(&self) -> bool {
        matches!(self.payload, ItemPayload::Undecodable { .. })
    }

    pub fn into_json(self) -> Option<Value> {
        match self.payload {
            ItemPayload::Json(v) => Some(v),
            ItemPayload::Undecodable { .. } => None,
        }
    }
}
