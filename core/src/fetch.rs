//! One-call GET-as-string.

use tracing::info;

use crate::config::TaskConfig;
use crate::error::TaskError;
use crate::extract::extract_field;
use crate::task::RequestTask;
use crate::transport::{Transport, ReqwestTransport};

/// Field logged from every fetched body when present.
pub const SUMMARY_FIELD: &str = "message";

/// GET `url` into memory with the given connect timeout and return the body.
/// The body's `message` field is logged when the body is JSON that has one.
pub fn fetch_string(url: &str, timeout_secs: u64) -> Result<String, TaskError> {
    fetch_string_with(ReqwestTransport::new(), TaskConfig::default(), url, timeout_secs)
}

pub fn fetch_string_with<T: Transport>(
    transport: T,
    config: TaskConfig,
    url: &str,
    timeout_secs: u64,
) -> Result<String, TaskError> {
    let mut task = RequestTask::with_transport(transport, config);
    task.set_url(url)?;
    task.set_connect_timeout(timeout_secs)?;
    task.do_get_string()?;
    task.wait_task_done()?;

    let body = task
        .result_string()
        .map(|text| text.into_owned())
        .unwrap_or_default();
    if let Some(summary) = extract_field(&body, SUMMARY_FIELD) {
        info!(url, summary = %summary, "fetched");
    }
    Ok(body)
}
