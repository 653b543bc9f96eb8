//! Pull one field out of a JSON response for logging.
//!
//! Failures never propagate: a body that is not JSON, or lacks the field,
//! is logged and yields `None`.

use serde_json::Value;
use tracing::{debug, warn};

/// Parse `json` and return `field` rendered as compact JSON text.
pub fn extract_field(json: &str, field: &str) -> Option<String> {
    let doc: Value = match serde_json::from_str(json) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(error = %e, "response is not valid json");
            return None;
        }
    };
    match doc.get(field) {
        Some(value) => {
            let rendered = value.to_string();
            debug!(field, value = %rendered, "extracted field");
            Some(rendered)
        }
        None => {
            warn!(field, "field missing from response");
            None
        }
    }
}
