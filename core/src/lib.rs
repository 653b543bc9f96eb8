//! Single-request HTTP task with memory or temp-file capture.
//!
//! # Overview
//! A `RequestTask` is configured (url, proxy, timeouts, headers, form
//! fields), armed for exactly one capture mode, executed once with
//! `wait_task_done`, and then read back. Memory capture keeps the body in a
//! capped buffer and reports truncation; file capture streams into a unique
//! temp file and verifies its size against the announced content length.
//!
//! # Design
//! - The network engine sits behind the `Transport` trait; `ReqwestTransport`
//!   is the production engine, tests script their own.
//! - Response bytes flow through a per-request `ChunkSink` passed into
//!   `Transport::perform`; there is no global callback state.
//! - Failures are `TaskError` variants with stable integer codes for the C
//!   bridge.
//! - `extract` and `crypto` are standalone helpers used around the task,
//!   not by it.

pub mod buffer;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod file;
pub mod http;
pub mod multipart;
pub mod task;
pub mod transport;
pub mod types;

pub use buffer::{CaptureBuffer, CapturedBody};
pub use config::{TaskConfig, TlsPolicy, DEFAULT_BUFFER_CEILING};
pub use crypto::{base64_decode, decrypt_aes_cbc, hash_hex, CryptoError, HashAlgorithm};
pub use error::{TaskError, TransportError};
pub use extract::extract_field;
pub use fetch::{fetch_string, fetch_string_with};
pub use http::{HttpMethod, LowSpeedLimit, PreparedRequest, TransferInfo};
pub use multipart::{FormField, LoadedForm, LoadedPart, MultipartForm};
pub use task::RequestTask;
pub use transport::{ChunkSink, ReqwestTransport, Transport};
pub use types::{CaptureMode, Completion, CompletionCallback, Payload};
