//! Transport seam and the reqwest-backed engine.
//!
//! # Design
//! A `Transport` executes one `PreparedRequest` and pushes response bytes
//! into a `ChunkSink` that the task passes in for that request only. The
//! sink answers with how many bytes it accepted; anything short of the full
//! chunk aborts the transfer. The memory sink never answers short, the file
//! sink does when the disk refuses a write.
//!
//! `ReqwestTransport` builds a `reqwest::Client` from the request's own
//! settings and drives it on a current-thread tokio runtime created for
//! that call, so `perform` stays blocking and no state survives between
//! requests. Every body read is raced against the end of the current
//! low-speed window, so a body that stops arriving altogether is aborted
//! like one that merely trickles.

use std::error::Error as StdError;
use std::fs;
use std::time::Duration;

use bytes::Bytes;
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client, ClientBuilder, Proxy, Response};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::TlsPolicy;
use crate::error::TransportError;
use crate::http::{HttpMethod, LowSpeedLimit, PreparedRequest, TransferInfo};

/// Receives response bytes during a transfer.
pub trait ChunkSink {
    /// Accept a chunk and return how many bytes were taken. Returning less
    /// than `chunk.len()` aborts the transfer.
    fn write_chunk(&mut self, chunk: &[u8]) -> usize;
}

/// Executes a request, synchronously, exactly once per call.
pub trait Transport {
    fn perform(
        &mut self,
        request: &PreparedRequest,
        sink: &mut dyn ChunkSink,
    ) -> Result<TransferInfo, TransportError>;
}

/// Blocking HTTP engine on top of `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    fn client(&self, request: &PreparedRequest) -> Result<Client, TransportError> {
        let redirect = match request.max_redirects {
            0 => Policy::none(),
            n => Policy::limited(n as usize),
        };
        let mut builder = Client::builder()
            .connect_timeout(request.connect_timeout)
            .redirect(redirect)
            .user_agent(request.user_agent.as_str());

        builder = match &request.proxy {
            Some(proxy) => builder.proxy(Proxy::all(proxy.as_str()).map_err(|e| {
                TransportError::InvalidProxy {
                    proxy: proxy.clone(),
                    reason: describe(&e),
                }
            })?),
            None => builder.no_proxy(),
        };

        apply_tls(builder, &request.tls)?
            .build()
            .map_err(|e| TransportError::Tls(describe(&e)))
    }
}

impl Transport for ReqwestTransport {
    fn perform(
        &mut self,
        request: &PreparedRequest,
        sink: &mut dyn ChunkSink,
    ) -> Result<TransferInfo, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Other(format!("starting runtime: {e}")))?;
        runtime.block_on(self.execute(request, sink))
    }
}

impl ReqwestTransport {
    async fn execute(
        &self,
        request: &PreparedRequest,
        sink: &mut dyn ChunkSink,
    ) -> Result<TransferInfo, TransportError> {
        let client = self.client(request)?;
        debug!(method = ?request.method, url = %request.url, "performing request");

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(form) = &request.form {
            builder = builder.multipart(form.to_form().map_err(map_reqwest_error)?);
        }

        let sent = builder.send();
        let mut response = if request.response_timeout.is_zero() {
            sent.await
        } else {
            tokio::time::timeout(request.response_timeout, sent)
                .await
                .map_err(|_| TransportError::Timeout("waiting for response head".into()))?
        }
        .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!(status, ?content_length, "response head received");
        if request.fail_on_error_status && status >= 400 {
            return Err(TransportError::Status(status));
        }

        let mut monitor = LowSpeedMonitor::new(request.low_speed, Instant::now());
        let received = pump(&mut response, sink, &mut monitor).await?;
        debug!(received, "response body drained");

        Ok(TransferInfo {
            status,
            content_length,
        })
    }
}

fn apply_tls(mut builder: ClientBuilder, policy: &TlsPolicy) -> Result<ClientBuilder, TransportError> {
    builder = builder.danger_accept_invalid_certs(!policy.verify_peer);

    if let Some(path) = &policy.ca_bundle {
        let pem = fs::read(path)
            .map_err(|e| TransportError::Tls(format!("reading {}: {e}", path.display())))?;
        let certs = Certificate::from_pem_bundle(&pem)
            .map_err(|e| TransportError::Tls(format!("parsing {}: {}", path.display(), describe(&e))))?;
        if certs.is_empty() {
            return Err(TransportError::Tls(format!(
                "no certificates found in {}",
                path.display()
            )));
        }
        builder = builder.tls_built_in_root_certs(false);
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    Ok(builder)
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(describe(&err))
    } else if err.is_connect() {
        TransportError::Connect(describe(&err))
    } else if let (true, Some(status)) = (err.is_status(), err.status()) {
        TransportError::Status(status.as_u16())
    } else {
        TransportError::Other(describe(&err))
    }
}

/// The error and its sources, joined with `": "`.
fn describe(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Where response chunks come from. `Ok(None)` marks the end of the body.
pub(crate) trait ChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;
}

impl ChunkSource for Response {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.chunk().await.map_err(map_reqwest_error)
    }
}

/// Copy `source` into `sink` chunk by chunk, enforcing the sink's verdict and
/// the low-speed floor. Returns the number of bytes delivered.
///
/// A read that is still pending when the current window closes is abandoned
/// long enough to judge the window, so a silent peer cannot hold the
/// transfer open.
pub(crate) async fn pump<S: ChunkSource>(
    source: &mut S,
    sink: &mut dyn ChunkSink,
    monitor: &mut LowSpeedMonitor,
) -> Result<u64, TransportError> {
    let mut total = 0u64;
    loop {
        let next = match monitor.remaining(Instant::now()) {
            Some(budget) => match tokio::time::timeout(budget, source.next_chunk()).await {
                Ok(next) => next?,
                Err(_) => {
                    monitor.observe(0, Instant::now())?;
                    continue;
                }
            },
            None => source.next_chunk().await?,
        };
        let Some(chunk) = next else {
            return Ok(total);
        };

        let accepted = sink.write_chunk(&chunk);
        if accepted != chunk.len() {
            warn!(offered = chunk.len(), accepted, "sink refused chunk, aborting transfer");
            return Err(TransportError::WriteAborted {
                offered: chunk.len(),
                accepted,
            });
        }
        total += chunk.len() as u64;
        monitor.observe(chunk.len() as u64, Instant::now())?;
    }
}

/// Tracks throughput over consecutive windows.
#[derive(Debug)]
pub(crate) struct LowSpeedMonitor {
    limit: LowSpeedLimit,
    window_start: Instant,
    window_bytes: u64,
}

impl LowSpeedMonitor {
    pub(crate) fn new(limit: LowSpeedLimit, now: Instant) -> Self {
        Self {
            limit,
            window_start: now,
            window_bytes: 0,
        }
    }

    fn enabled(&self) -> bool {
        self.limit.bytes_per_sec > 0 && !self.limit.window.is_zero()
    }

    /// Time left in the current window, `None` when the monitor is off.
    pub(crate) fn remaining(&self, now: Instant) -> Option<Duration> {
        if !self.enabled() {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.window_start);
        Some(self.limit.window.saturating_sub(elapsed))
    }

    pub(crate) fn observe(&mut self, bytes: u64, now: Instant) -> Result<(), TransportError> {
        if !self.enabled() {
            return Ok(());
        }
        self.window_bytes += bytes;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.limit.window {
            return Ok(());
        }
        let window_secs = self.limit.window.as_secs().max(1);
        let floor = self.limit.bytes_per_sec * window_secs;
        if self.window_bytes < floor {
            return Err(TransportError::LowSpeed {
                bytes: self.window_bytes,
                window_secs,
                limit: self.limit.bytes_per_sec,
            });
        }
        self.window_start = now;
        self.window_bytes = 0;
        Ok(())
    }
}
