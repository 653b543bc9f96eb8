//! The single-request task.
//!
//! # Design
//! A `RequestTask` walks through three phases:
//!
//! - **unconfigured**: setters accumulate url, proxy, timeout, headers and
//!   form fields;
//! - **armed**: `do_get_string` or `do_get_file` picked a capture mode and
//!   allocated its resource (capture buffer or temp file) and loaded the
//!   form attachments;
//! - **completed**: `wait_task_done` ran the transport once, settled the
//!   capture, fired the callback and released the transport handle.
//!
//! Operations outside their phase fail with `TaskError::State`. The handle is
//! an `Option<T>` that `wait_task_done` takes and drops, so a task can never
//! perform twice. Anything still held when the task is dropped (an armed
//! buffer or temp file) is released by the field destructors; an abandoned
//! temp file is deleted rather than leaked.

use std::borrow::Cow;
use std::mem;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::buffer::{CaptureBuffer, CapturedBody};
use crate::config::TaskConfig;
use crate::error::TaskError;
use crate::file::FileCapture;
use crate::http::{HttpMethod, LowSpeedLimit, PreparedRequest, TransferInfo};
use crate::multipart::{file_name_of, FormField, LoadedForm, MultipartForm, PICTURE_CONTENT_TYPE};
use crate::transport::{ChunkSink, ReqwestTransport, Transport};
use crate::types::{CaptureMode, Completion, CompletionCallback, Payload};

enum Phase {
    Unconfigured,
    Armed(Armed),
    Completed(Output),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Unconfigured => "unconfigured",
            Phase::Armed(Armed {
                capture: Capture::Memory(_),
                ..
            }) => "armed for memory capture",
            Phase::Armed(Armed {
                capture: Capture::File(_),
                ..
            }) => "armed for file capture",
            Phase::Completed(_) => "completed",
        }
    }
}

struct Armed {
    capture: Capture,
    form: Option<LoadedForm>,
    range: Option<String>,
}

enum Capture {
    Memory(CaptureBuffer),
    File(FileCapture),
}

enum Output {
    Memory(CapturedBody),
    /// `None` when the download failed and the file was removed.
    File(Option<PathBuf>),
}

/// One HTTP request with a memory or file destination.
pub struct RequestTask<T = ReqwestTransport> {
    config: TaskConfig,
    url: Option<String>,
    proxy: Option<String>,
    connect_timeout: Duration,
    headers: Vec<(String, String)>,
    form: MultipartForm,
    callback: Option<CompletionCallback>,
    transport: Option<T>,
    phase: Phase,
    http_status: Option<u16>,
}

impl RequestTask<ReqwestTransport> {
    /// A task on the reqwest engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(TaskConfig::default())
    }

    pub fn with_config(config: TaskConfig) -> Self {
        Self::with_transport(ReqwestTransport::new(), config)
    }
}

impl Default for RequestTask<ReqwestTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> RequestTask<T> {
    /// A task that performs through `transport`.
    pub fn with_transport(transport: T, config: TaskConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            config,
            url: None,
            proxy: None,
            headers: Vec::new(),
            form: MultipartForm::new(),
            callback: None,
            transport: Some(transport),
            phase: Phase::Unconfigured,
            http_status: None,
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn set_url(&mut self, url: &str) -> Result<(), TaskError> {
        self.ensure_handle("set_url")?;
        if url.is_empty() {
            return Err(TaskError::config("url", "empty"));
        }
        self.url = Some(url.to_string());
        Ok(())
    }

    pub fn set_proxy(&mut self, proxy: &str) -> Result<(), TaskError> {
        self.ensure_handle("set_proxy")?;
        if proxy.is_empty() {
            return Err(TaskError::config("proxy", "empty"));
        }
        self.proxy = Some(proxy.to_string());
        Ok(())
    }

    pub fn set_connect_timeout(&mut self, seconds: u64) -> Result<(), TaskError> {
        self.ensure_handle("set_connect_timeout")?;
        if seconds == 0 {
            return Err(TaskError::config("connect_timeout", "must be positive"));
        }
        self.connect_timeout = Duration::from_secs(seconds);
        Ok(())
    }

    /// Add a request header sent with the request.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), TaskError> {
        self.ensure_handle("set_header")?;
        if name.is_empty() {
            return Err(TaskError::config("header", "empty name"));
        }
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Register the completion callback. Replaces any earlier one.
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(Completion<'_>) + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn add_post_string(&mut self, name: &str, value: &str) -> Result<(), TaskError> {
        self.ensure_unarmed("add_post_string")?;
        if name.is_empty() || value.is_empty() {
            return Err(TaskError::config("post_string", "name and value are required"));
        }
        self.form.push(FormField::Text {
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    /// Attach a picture file as `image/jpeg`.
    ///
    /// A source path that does not exist is skipped without an error; the
    /// field list is left as it was.
    pub fn add_post_picture(
        &mut self,
        name: &str,
        file_path: &str,
        file_name: Option<&str>,
    ) -> Result<(), TaskError> {
        self.ensure_unarmed("add_post_picture")?;
        if name.is_empty() || file_path.is_empty() {
            return Err(TaskError::config("post_picture", "name and file path are required"));
        }
        let path = Path::new(file_path);
        if !path.exists() {
            warn!(file_path, "picture does not exist, field skipped");
            return Ok(());
        }
        let file_name = file_name.unwrap_or_else(|| file_name_of(file_path));
        self.form.push(FormField::File {
            name: name.to_string(),
            path: path.to_path_buf(),
            file_name: file_name.to_string(),
            content_type: PICTURE_CONTENT_TYPE.to_string(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Arming
    // -----------------------------------------------------------------------

    /// Arm the task to capture the response into memory.
    pub fn do_get_string(&mut self) -> Result<(), TaskError> {
        self.ensure_unarmed("do_get_string")?;
        let form = self.load_form()?;
        let buffer = CaptureBuffer::with_ceiling(self.config.buffer_ceiling)?;
        debug!(ceiling = buffer.ceiling(), "armed for memory capture");
        self.phase = Phase::Armed(Armed {
            capture: Capture::Memory(buffer),
            form,
            range: None,
        });
        Ok(())
    }

    /// Arm the task to download the response into a fresh temp file,
    /// optionally restricted to a byte `range` such as `"0-255"`.
    pub fn do_get_file(&mut self, range: Option<&str>) -> Result<(), TaskError> {
        self.ensure_unarmed("do_get_file")?;
        let form = self.load_form()?;
        let file = FileCapture::create_in(&self.config.temp_dir())?;
        debug!(path = %file.path().display(), ?range, "armed for file capture");
        self.phase = Phase::Armed(Armed {
            capture: Capture::File(file),
            form,
            range: range.filter(|r| !r.is_empty()).map(str::to_string),
        });
        Ok(())
    }

    fn load_form(&self) -> Result<Option<LoadedForm>, TaskError> {
        if self.form.is_empty() {
            return Ok(None);
        }
        self.form.load().map(Some)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Perform the request, block until it finishes, settle the capture and
    /// release the transport handle. Valid exactly once, after arming.
    pub fn wait_task_done(&mut self) -> Result<(), TaskError> {
        let (armed, mut transport) = match (
            mem::replace(&mut self.phase, Phase::Unconfigured),
            self.transport.take(),
        ) {
            (Phase::Armed(armed), Some(transport)) => (armed, transport),
            (phase, transport) => {
                self.phase = phase;
                self.transport = transport;
                return Err(self.state_error("wait_task_done"));
            }
        };

        let Armed {
            capture,
            form,
            range,
        } = armed;
        let mode = match capture {
            Capture::Memory(_) => CaptureMode::Memory,
            Capture::File(_) => CaptureMode::File,
        };
        let request = self.prepare(mode, form, range);

        let result = match capture {
            Capture::Memory(mut buffer) => {
                let transfer = perform(&mut transport, request.as_ref(), &mut buffer);
                self.http_status = transfer.as_ref().ok().map(|info| info.status);
                let result = transfer.map(|_| ());
                let received = buffer.offered();
                let body = buffer.finish();
                if body.truncated {
                    warn!(ceiling = self.config.buffer_ceiling, "response truncated to buffer ceiling");
                }
                if received > 0 {
                    if let Some(callback) = self.callback.take() {
                        callback(Completion {
                            result: result.as_ref().map(|_| ()),
                            payload: Payload::Text(&body),
                        });
                    }
                }
                self.phase = Phase::Completed(Output::Memory(body));
                result
            }
            Capture::File(mut file) => {
                let transfer = perform(&mut transport, request.as_ref(), &mut file);
                self.http_status = transfer.as_ref().ok().map(|info| info.status);
                match file.finish(transfer) {
                    Ok(path) => {
                        if let Some(callback) = self.callback.take() {
                            callback(Completion {
                                result: Ok(()),
                                payload: Payload::File(&path),
                            });
                        }
                        self.phase = Phase::Completed(Output::File(Some(path)));
                        Ok(())
                    }
                    Err(e) => {
                        self.phase = Phase::Completed(Output::File(None));
                        Err(e)
                    }
                }
            }
        };

        // Form body first, then the header list, then the handle itself.
        drop(request);
        self.headers.clear();
        drop(transport);

        match &result {
            Ok(()) => debug!(status = ?self.http_status, "task done"),
            Err(e) => warn!(error = %e, code = e.code(), "task failed"),
        }
        result
    }

    fn prepare(
        &self,
        mode: CaptureMode,
        form: Option<LoadedForm>,
        range: Option<String>,
    ) -> Option<PreparedRequest> {
        let url = self.url.clone()?;

        let mut headers = self.headers.clone();
        if let Some(range) = range {
            headers.push(("Range".to_string(), format!("bytes={range}")));
        }
        let method = match form {
            Some(_) => HttpMethod::Post,
            None => HttpMethod::Get,
        };

        Some(PreparedRequest {
            method,
            url,
            headers,
            form,
            proxy: self.proxy.clone(),
            connect_timeout: self.connect_timeout,
            response_timeout: Duration::from_secs(self.config.response_timeout_secs),
            low_speed: LowSpeedLimit {
                bytes_per_sec: self.config.low_speed_limit,
                window: Duration::from_secs(self.config.low_speed_time_secs),
            },
            max_redirects: match mode {
                CaptureMode::Memory => 0,
                CaptureMode::File => self.config.max_redirects,
            },
            fail_on_error_status: self.config.fail_on_error_status,
            user_agent: self.config.user_agent.clone(),
            tls: self.config.tls.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The captured body once a memory-mode task has completed.
    pub fn result_body(&self) -> Option<&CapturedBody> {
        match &self.phase {
            Phase::Completed(Output::Memory(body)) => Some(body),
            _ => None,
        }
    }

    /// The captured body as text, cut at the first NUL.
    pub fn result_string(&self) -> Option<Cow<'_, str>> {
        self.result_body().map(CapturedBody::as_text)
    }

    /// Path of the verified download once a file-mode task has succeeded.
    pub fn file_path(&self) -> Option<&Path> {
        match &self.phase {
            Phase::Completed(Output::File(Some(path))) => Some(path),
            _ => None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.result_body().is_some_and(|body| body.truncated)
    }

    /// HTTP status of the completed transfer, if the server answered.
    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn capture_mode(&self) -> Option<CaptureMode> {
        match &self.phase {
            Phase::Armed(Armed {
                capture: Capture::Memory(_),
                ..
            })
            | Phase::Completed(Output::Memory(_)) => Some(CaptureMode::Memory),
            Phase::Armed(Armed {
                capture: Capture::File(_),
                ..
            })
            | Phase::Completed(Output::File(_)) => Some(CaptureMode::File),
            Phase::Unconfigured => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, Phase::Armed(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.phase, Phase::Completed(_))
    }

    /// Whether the transport handle is still held.
    pub fn has_handle(&self) -> bool {
        self.transport.is_some()
    }

    pub fn form_fields(&self) -> &[FormField] {
        self.form.fields()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Path of the temp file while armed for file capture.
    pub fn pending_file_path(&self) -> Option<&Path> {
        match &self.phase {
            Phase::Armed(Armed {
                capture: Capture::File(file),
                ..
            }) => Some(file.path()),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Phase guards
    // -----------------------------------------------------------------------

    fn state_error(&self, operation: &'static str) -> TaskError {
        TaskError::State {
            operation,
            phase: self.phase.name(),
        }
    }

    fn ensure_handle(&self, operation: &'static str) -> Result<(), TaskError> {
        if self.transport.is_none() {
            return Err(self.state_error(operation));
        }
        Ok(())
    }

    fn ensure_unarmed(&self, operation: &'static str) -> Result<(), TaskError> {
        self.ensure_handle(operation)?;
        if !matches!(self.phase, Phase::Unconfigured) {
            return Err(self.state_error(operation));
        }
        Ok(())
    }
}

impl<T> Drop for RequestTask<T> {
    fn drop(&mut self) {
        if let Phase::Armed(_) = self.phase {
            debug!("dropping armed task, releasing capture resources");
        }
    }
}

/// Run the transport unless the request could not be assembled.
fn perform<T: Transport, S: ChunkSink>(
    transport: &mut T,
    request: Option<&PreparedRequest>,
    sink: &mut S,
) -> Result<TransferInfo, TaskError> {
    match request {
        Some(request) => transport.perform(request, sink).map_err(TaskError::from),
        None => Err(TaskError::config("url", "no url set")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::multipart::LoadedPart;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::rc::Rc;

    /// Replays fixed chunks, then reports a fixed outcome.
    struct ScriptedTransport {
        chunks: Vec<Vec<u8>>,
        info: TransferInfo,
        fail: Option<TransportError>,
        calls: Rc<Cell<usize>>,
        seen: Rc<RefCell<Option<PreparedRequest>>>,
        accepted: Rc<RefCell<Vec<usize>>>,
    }

    impl ScriptedTransport {
        fn new(chunks: Vec<Vec<u8>>, content_length: Option<u64>) -> Self {
            Self {
                chunks,
                info: TransferInfo {
                    status: 200,
                    content_length,
                },
                fail: None,
                calls: Rc::new(Cell::new(0)),
                seen: Rc::new(RefCell::new(None)),
                accepted: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn failing(mut self, err: TransportError) -> Self {
            self.fail = Some(err);
            self
        }
    }

    impl Transport for ScriptedTransport {
        fn perform(
            &mut self,
            request: &PreparedRequest,
            sink: &mut dyn ChunkSink,
        ) -> Result<TransferInfo, TransportError> {
            self.calls.set(self.calls.get() + 1);
            *self.seen.borrow_mut() = Some(request.clone());
            for chunk in &self.chunks {
                let accepted = sink.write_chunk(chunk);
                self.accepted.borrow_mut().push(accepted);
                if accepted != chunk.len() {
                    return Err(TransportError::WriteAborted {
                        offered: chunk.len(),
                        accepted,
                    });
                }
            }
            match self.fail.take() {
                Some(err) => Err(err),
                None => Ok(self.info),
            }
        }
    }

    fn config_in(dir: &Path) -> TaskConfig {
        TaskConfig {
            temp_dir: Some(dir.to_path_buf()),
            ..TaskConfig::default()
        }
    }

    type Calls = Rc<RefCell<Vec<(i32, String)>>>;

    fn record_callback<T: Transport>(task: &mut RequestTask<T>) -> Calls {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        task.set_callback(move |done| {
            let payload = match done.payload {
                Payload::Text(body) => body.as_text().into_owned(),
                Payload::File(path) => path.display().to_string(),
            };
            sink.borrow_mut().push((done.status(), payload));
        });
        calls
    }

    #[test]
    fn ten_bytes_without_length_reach_result_and_callback() {
        let transport = ScriptedTransport::new(vec![b"0123456789".to_vec()], None);
        let mut task = RequestTask::with_transport(transport, TaskConfig::default());
        task.set_url("http://example.test/data").unwrap();
        let calls = record_callback(&mut task);

        task.do_get_string().unwrap();
        task.wait_task_done().unwrap();

        assert_eq!(task.result_string().as_deref(), Some("0123456789"));
        assert_eq!(task.result_body().unwrap().bytes.len(), 10);
        assert!(!task.is_truncated());
        assert_eq!(*calls.borrow(), vec![(0, "0123456789".to_string())]);
    }

    #[test]
    fn oversized_response_is_truncated_but_fully_consumed() {
        let transport = ScriptedTransport::new(vec![vec![b'a'; 40], vec![b'b'; 40]], None);
        let accepted = transport.accepted.clone();
        let config = TaskConfig {
            buffer_ceiling: 64,
            ..TaskConfig::default()
        };
        let mut task = RequestTask::with_transport(transport, config);
        task.set_url("http://example.test/big").unwrap();
        task.do_get_string().unwrap();
        task.wait_task_done().unwrap();

        assert_eq!(*accepted.borrow(), vec![40, 40]);
        let body = task.result_body().unwrap();
        assert_eq!(body.bytes.len(), 63);
        assert!(body.truncated);
        assert!(task.is_truncated());
    }

    #[test]
    fn empty_response_skips_callback() {
        let transport = ScriptedTransport::new(Vec::new(), Some(0));
        let mut task = RequestTask::with_transport(transport, TaskConfig::default());
        task.set_url("http://example.test/empty").unwrap();
        let calls = record_callback(&mut task);
        task.do_get_string().unwrap();
        task.wait_task_done().unwrap();

        assert!(calls.borrow().is_empty());
        assert_eq!(task.result_string().as_deref(), Some(""));
    }

    #[test]
    fn received_bytes_notify_even_when_none_fit() {
        let transport = ScriptedTransport::new(vec![b"hello".to_vec()], None);
        let config = TaskConfig {
            buffer_ceiling: 1,
            ..TaskConfig::default()
        };
        let mut task = RequestTask::with_transport(transport, config);
        task.set_url("http://example.test/tiny").unwrap();
        let calls = record_callback(&mut task);
        task.do_get_string().unwrap();
        task.wait_task_done().unwrap();

        assert_eq!(*calls.borrow(), vec![(0, String::new())]);
        assert!(task.is_truncated());
        assert_eq!(task.result_string().as_deref(), Some(""));
    }

    #[test]
    fn memory_failure_with_bytes_still_notifies() {
        let transport = ScriptedTransport::new(vec![b"partial".to_vec()], None)
            .failing(TransportError::Timeout("body".into()));
        let mut task = RequestTask::with_transport(transport, TaskConfig::default());
        task.set_url("http://example.test/slow").unwrap();
        let calls = record_callback(&mut task);
        task.do_get_string().unwrap();

        let err = task.wait_task_done().unwrap_err();
        assert!(matches!(err, TaskError::Transport(TransportError::Timeout(_))));
        assert_eq!(*calls.borrow(), vec![(TaskError::TRANSPORT, "partial".to_string())]);
        assert_eq!(task.result_string().as_deref(), Some("partial"));
    }

    #[test]
    fn wait_before_arming_fails_without_network() {
        let transport = ScriptedTransport::new(vec![b"x".to_vec()], None);
        let calls = transport.calls.clone();
        let mut task = RequestTask::with_transport(transport, TaskConfig::default());
        task.set_url("http://example.test/").unwrap();

        let err = task.wait_task_done().unwrap_err();
        assert!(matches!(
            err,
            TaskError::State {
                operation: "wait_task_done",
                phase: "unconfigured"
            }
        ));
        assert_eq!(err.code(), -1);
        assert_eq!(calls.get(), 0);
        assert!(task.has_handle());

        // The task is still usable after the refused wait.
        task.do_get_string().unwrap();
        task.wait_task_done().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn second_wait_fails_without_second_request() {
        let transport = ScriptedTransport::new(vec![b"once".to_vec()], None);
        let calls = transport.calls.clone();
        let mut task = RequestTask::with_transport(transport, TaskConfig::default());
        task.set_url("http://example.test/").unwrap();
        task.do_get_string().unwrap();
        task.wait_task_done().unwrap();
        assert!(!task.has_handle());

        let err = task.wait_task_done().unwrap_err();
        assert!(matches!(err, TaskError::State { phase: "completed", .. }));
        assert_eq!(calls.get(), 1);
        assert_eq!(task.result_string().as_deref(), Some("once"));
    }

    #[test]
    fn handle_is_released_after_failure_too() {
        let transport = ScriptedTransport::new(Vec::new(), None)
            .failing(TransportError::Connect("refused".into()));
        let mut task = RequestTask::with_transport(transport, TaskConfig::default());
        task.set_url("http://example.test/").unwrap();
        task.do_get_string().unwrap();
        assert!(task.wait_task_done().is_err());
        assert!(!task.has_handle());
        assert!(task.is_completed());
        assert!(matches!(
            task.set_url("http://other.test/"),
            Err(TaskError::State { .. })
        ));
    }

    #[test]
    fn arming_twice_is_a_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(Vec::new(), None);
        let mut task = RequestTask::with_transport(transport, config_in(dir.path()));
        task.do_get_string().unwrap();
        let err = task.do_get_file(None).unwrap_err();
        assert!(matches!(
            err,
            TaskError::State {
                operation: "do_get_file",
                phase: "armed for memory capture"
            }
        ));
        assert_eq!(task.capture_mode(), Some(CaptureMode::Memory));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_url_fails_and_still_releases_handle() {
        let transport = ScriptedTransport::new(Vec::new(), None);
        let calls = transport.calls.clone();
        let mut task = RequestTask::with_transport(transport, TaskConfig::default());
        task.do_get_string().unwrap();
        let err = task.wait_task_done().unwrap_err();
        assert!(matches!(err, TaskError::ConfigInvalid { field: "url", .. }));
        assert_eq!(calls.get(), 0);
        assert!(!task.has_handle());
    }

    #[test]
    fn file_download_with_matching_length_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![vec![1u8; 600], vec![2u8; 400]], Some(1000));
        let mut task = RequestTask::with_transport(transport, config_in(dir.path()));
        task.set_url("http://example.test/file").unwrap();
        let calls = record_callback(&mut task);
        task.do_get_file(None).unwrap();
        task.wait_task_done().unwrap();

        let path = task.file_path().unwrap().to_path_buf();
        assert_eq!(fs::metadata(&path).unwrap().len(), 1000);
        assert_eq!(*calls.borrow(), vec![(0, path.display().to_string())]);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn file_download_size_mismatch_is_deleted_and_silent() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![vec![0u8; 900]], Some(1000));
        let mut task = RequestTask::with_transport(transport, config_in(dir.path()));
        task.set_url("http://example.test/file").unwrap();
        let calls = record_callback(&mut task);
        task.do_get_file(None).unwrap();
        let pending = task.pending_file_path().unwrap().to_path_buf();

        let err = task.wait_task_done().unwrap_err();
        assert_eq!(err.code(), TaskError::VALIDATION);
        assert!(!pending.exists());
        assert!(task.file_path().is_none());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn file_download_transport_failure_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![vec![0u8; 5000]], Some(10_000))
            .failing(TransportError::LowSpeed {
                bytes: 5000,
                window_secs: 30,
                limit: 1024,
            });
        let mut task = RequestTask::with_transport(transport, config_in(dir.path()));
        task.set_url("http://example.test/file").unwrap();
        task.do_get_file(None).unwrap();

        assert!(task.wait_task_done().is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn dropping_armed_file_task_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(Vec::new(), None);
        let mut task = RequestTask::with_transport(transport, config_in(dir.path()));
        task.do_get_file(None).unwrap();
        let pending = task.pending_file_path().unwrap().to_path_buf();
        assert!(pending.exists());
        drop(task);
        assert!(!pending.exists());
    }

    #[test]
    fn file_mode_sends_range_and_follows_redirects() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![vec![0u8; 256]], Some(256));
        let seen = transport.seen.clone();
        let mut task = RequestTask::with_transport(transport, config_in(dir.path()));
        task.set_url("http://example.test/file").unwrap();
        task.do_get_file(Some("0-255")).unwrap();
        task.wait_task_done().unwrap();

        let request = seen.borrow().clone().unwrap();
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.header("range"), Some("bytes=0-255"));
        assert_eq!(request.max_redirects, 10);
        fs::remove_file(task.file_path().unwrap()).unwrap();
    }

    #[test]
    fn memory_mode_does_not_follow_redirects() {
        let transport = ScriptedTransport::new(Vec::new(), None);
        let seen = transport.seen.clone();
        let mut task = RequestTask::with_transport(transport, TaskConfig::default());
        task.set_url("http://example.test/").unwrap();
        task.set_proxy("http://proxy.test:8080").unwrap();
        task.set_connect_timeout(5).unwrap();
        task.set_header("Accept", "application/json").unwrap();
        task.do_get_string().unwrap();
        task.wait_task_done().unwrap();

        let request = seen.borrow().clone().unwrap();
        assert_eq!(request.max_redirects, 0);
        assert_eq!(request.proxy.as_deref(), Some("http://proxy.test:8080"));
        assert_eq!(request.connect_timeout, Duration::from_secs(5));
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.low_speed.bytes_per_sec, 1024);
    }

    #[test]
    fn form_fields_turn_request_into_multipart_post() {
        let dir = tempfile::tempdir().unwrap();
        let picture = dir.path().join("cat.jpg");
        fs::write(&picture, b"meow").unwrap();

        let transport = ScriptedTransport::new(Vec::new(), None);
        let seen = transport.seen.clone();
        let mut task = RequestTask::with_transport(transport, TaskConfig::default());
        task.set_url("http://example.test/upload").unwrap();
        task.add_post_string("city", "101010100").unwrap();
        task.add_post_picture("photo", picture.to_str().unwrap(), None)
            .unwrap();
        assert_eq!(task.form_fields().len(), 2);
        assert!(matches!(
            &task.form_fields()[1],
            FormField::File { file_name, content_type, .. }
                if file_name == "cat.jpg" && content_type == "image/jpeg"
        ));

        task.do_get_string().unwrap();
        task.wait_task_done().unwrap();

        let request = seen.borrow().clone().unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.header("content-type"), None);
        assert_eq!(
            request.form.unwrap().parts,
            vec![
                LoadedPart::Text {
                    name: "city".into(),
                    value: "101010100".into(),
                },
                LoadedPart::File {
                    name: "photo".into(),
                    file_name: "cat.jpg".into(),
                    content_type: "image/jpeg".into(),
                    data: b"meow".to_vec(),
                },
            ]
        );
    }

    #[test]
    fn custom_picture_file_name_wins() {
        let dir = tempfile::tempdir().unwrap();
        let picture = dir.path().join("IMG_0001.jpg");
        fs::write(&picture, b"x").unwrap();
        let mut task =
            RequestTask::with_transport(ScriptedTransport::new(Vec::new(), None), TaskConfig::default());
        task.add_post_picture("photo", picture.to_str().unwrap(), Some("avatar.jpg"))
            .unwrap();
        assert!(matches!(
            &task.form_fields()[0],
            FormField::File { file_name, .. } if file_name == "avatar.jpg"
        ));
    }

    #[test]
    fn missing_picture_is_a_silent_no_op() {
        let mut task =
            RequestTask::with_transport(ScriptedTransport::new(Vec::new(), None), TaskConfig::default());
        task.add_post_picture("photo", "/no/such/picture.jpg", None)
            .unwrap();
        assert!(task.form_fields().is_empty());
    }

    #[test]
    fn empty_arguments_are_config_errors() {
        let mut task =
            RequestTask::with_transport(ScriptedTransport::new(Vec::new(), None), TaskConfig::default());
        assert!(matches!(task.set_url(""), Err(TaskError::ConfigInvalid { field: "url", .. })));
        assert!(matches!(task.set_proxy(""), Err(TaskError::ConfigInvalid { .. })));
        assert!(matches!(task.set_connect_timeout(0), Err(TaskError::ConfigInvalid { .. })));
        assert!(matches!(task.add_post_string("", "v"), Err(TaskError::ConfigInvalid { .. })));
        assert!(matches!(task.add_post_string("k", ""), Err(TaskError::ConfigInvalid { .. })));
        assert!(matches!(
            task.add_post_picture("", "/tmp/x.jpg", None),
            Err(TaskError::ConfigInvalid { .. })
        ));
        assert!(task.url().is_none());
        assert!(task.form_fields().is_empty());
    }

    #[test]
    fn form_fields_cannot_be_added_after_arming() {
        let mut task =
            RequestTask::with_transport(ScriptedTransport::new(Vec::new(), None), TaskConfig::default());
        task.do_get_string().unwrap();
        assert!(matches!(
            task.add_post_string("k", "v"),
            Err(TaskError::State { .. })
        ));
        // Plain setters still apply while armed.
        task.set_url("http://example.test/late").unwrap();
        assert_eq!(task.url(), Some("http://example.test/late"));
    }

    #[test]
    fn vanished_attachment_fails_arming_and_leaves_task_unarmed() {
        let dir = tempfile::tempdir().unwrap();
        let picture = dir.path().join("gone.jpg");
        fs::write(&picture, b"x").unwrap();
        let mut task =
            RequestTask::with_transport(ScriptedTransport::new(Vec::new(), None), config_in(dir.path()));
        task.add_post_picture("photo", picture.to_str().unwrap(), None)
            .unwrap();
        fs::remove_file(&picture).unwrap();

        assert!(matches!(task.do_get_file(None), Err(TaskError::Io { .. })));
        assert!(!task.is_armed());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unwritable_temp_dir_fails_file_arming() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir.path().join("missing"));
        let mut task = RequestTask::with_transport(ScriptedTransport::new(Vec::new(), None), config);
        assert!(matches!(task.do_get_file(None), Err(TaskError::Io { .. })));
        assert!(!task.is_armed());
        assert!(task.has_handle());
    }
}
