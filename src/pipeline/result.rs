//! Per-item result decoding and error filtering.

use super::response::ParsedSubResponse;
use crate::types::{ItemPayload, ItemResult};
use tracing::debug;

/// Turn a parsed sub-response into a result, or `None` when it is suppressed.
///
/// With `filter_errors` set, anything that is not a 200 with a JSON body is
/// dropped. Without it, every response with a body is delivered; bodies that
/// fail to decode come back as [`ItemPayload::Undecodable`].
pub fn decode_result(parsed: &ParsedSubResponse, filter_errors: bool) -> Option<ItemResult> {
    if filter_errors && parsed.status_code != Some(200) {
        debug!(content_id = ?parsed.content_id, status = ?parsed.status_code, "suppressing non-200 item");
        return None;
    }
    let body = parsed.body.as_deref()?;

    let payload = match serde_json::from_str(body) {
        Ok(value) => ItemPayload::Json(value),
        Err(_) if filter_errors => {
            debug!(content_id = ?parsed.content_id, "suppressing undecodable item");
            return None;
        }
        Err(e) => ItemPayload::Undecodable {
            body: body.to_string(),
            error: e.to_string(),
        },
    };

    Some(ItemResult {
        index: parsed.content_id,
        status: parsed.status_code,
        payload,
    })
}
