//! Request and transfer descriptions exchanged with the transport.
//!
//! # Design
//! The task assembles a `PreparedRequest` at execution time from everything
//! it has accumulated (url, headers, loaded form, range, redirect policy)
//! and hands it to a `Transport` together with the sink for response bytes.
//! The transport answers with a `TransferInfo` describing what the server
//! announced. Both are plain owned data so fake transports in tests can
//! inspect and fabricate them freely.

use std::time::Duration;

use crate::config::TlsPolicy;
use crate::multipart::LoadedForm;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A request ready to be executed.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Multipart body; its presence makes the request a POST.
    pub form: Option<LoadedForm>,
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    /// Upper bound on waiting for the response head. Zero means no bound.
    pub response_timeout: Duration,
    pub low_speed: LowSpeedLimit,
    /// Zero disables redirect following.
    pub max_redirects: u32,
    pub fail_on_error_status: bool,
    pub user_agent: String,
    pub tls: TlsPolicy,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Low-speed abort threshold: fewer than `bytes_per_sec` sustained over
/// `window` aborts the transfer. A zero limit disables the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowSpeedLimit {
    pub bytes_per_sec: u64,
    pub window: Duration,
}

/// What the transport learned about a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferInfo {
    pub status: u16,
    /// Length announced by the server, when it announced one.
    pub content_length: Option<u64>,
}
