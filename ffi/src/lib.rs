//! C-ABI wrapper around `nettask-core`.
//!
//! # Overview
//! Exposes the request task through `extern "C"` functions so any language
//! with a C FFI can configure, arm and run a single HTTP request, then read
//! back the captured text or downloaded file path. The JSON extractor and
//! crypto helpers are exported alongside.
//!
//! # Design
//! - Exported functions run their body through `guarded`, a `catch_unwind`
//!   wrapper, so a panic turns into an error value instead of unwinding
//!   into C.
//! - Task operations return an `int32_t` status: `NETTASK_OK` or a negative
//!   error code. Null arguments count as invalid configuration.
//! - The C caller owns all returned pointers and must call the matching
//!   `nettask_free_*` function to release them.

pub mod types;

use std::ffi::c_void;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use nettask_core::{crypto, RequestTask, TaskConfig, TaskError};
use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use types::*;

/// Run `f`, turning a panic into `fallback`.
fn guarded<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("panic caught at ffi boundary");
        fallback
    })
}

/// Run a task operation and map its outcome to a status code.
fn with_task(
    task: *mut FfiTask,
    operation: &'static str,
    f: impl FnOnce(&mut RequestTask) -> Result<(), TaskError>,
) -> i32 {
    guarded(NETTASK_ERR_PANIC, || {
        let Some(task) = (unsafe { task.as_mut() }) else {
            return NETTASK_ERR_CONFIG_INVALID;
        };
        match f(&mut task.inner) {
            Ok(()) => NETTASK_OK,
            Err(e) => {
                error!(operation, error = %e, "task operation failed");
                e.code()
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Create a task with default configuration.
///
/// The caller must free the returned pointer with `nettask_free`.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_new() -> *mut FfiTask {
    guarded(std::ptr::null_mut(), || {
        Box::into_raw(Box::new(FfiTask {
            inner: RequestTask::new(),
        }))
    })
}

/// Create a task from a JSON configuration object. Omitted fields take
/// their defaults.
///
/// Returns null if `config_json` is null or not a valid configuration.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_new_with_config(config_json: *const c_char) -> *mut FfiTask {
    guarded(std::ptr::null_mut(), || {
        let Some(json) = str_arg(config_json) else {
            return std::ptr::null_mut();
        };
        match TaskConfig::from_json(json) {
            Ok(config) => Box::into_raw(Box::new(FfiTask {
                inner: RequestTask::with_config(config),
            })),
            Err(e) => {
                error!(error = %e, "rejected task configuration");
                std::ptr::null_mut()
            }
        }
    })
}

/// Free a task created by `nettask_new*`. Safe to call with null.
///
/// An armed task that never ran releases its buffer or temp file here.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_free(task: *mut FfiTask) {
    if !task.is_null() {
        guarded((), || {
            drop(unsafe { Box::from_raw(task) });
        });
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn nettask_set_url(task: *mut FfiTask, url: *const c_char) -> i32 {
    with_task(task, "set_url", |t| t.set_url(required("url", url)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn nettask_set_proxy(task: *mut FfiTask, proxy: *const c_char) -> i32 {
    with_task(task, "set_proxy", |t| t.set_proxy(required("proxy", proxy)?))
}

/// Connect timeout in seconds; must be positive.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_set_connect_timeout(task: *mut FfiTask, seconds: u64) -> i32 {
    with_task(task, "set_connect_timeout", |t| t.set_connect_timeout(seconds))
}

#[unsafe(no_mangle)]
pub extern "C" fn nettask_set_header(
    task: *mut FfiTask,
    name: *const c_char,
    value: *const c_char,
) -> i32 {
    with_task(task, "set_header", |t| {
        t.set_header(required("header", name)?, required("header", value)?)
    })
}

/// Register the completion callback, invoked at most once from
/// `nettask_wait_task_done` on the calling thread. `user_data` is passed
/// through untouched. A null `callback` is rejected.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_set_callback(
    task: *mut FfiTask,
    callback: NettaskCallback,
    user_data: *mut c_void,
) -> i32 {
    with_task(task, "set_callback", |t| {
        let callback = callback.ok_or(TaskError::ConfigInvalid {
            field: "callback",
            reason: "null".to_string(),
        })?;
        t.set_callback(completion_adapter(callback, user_data));
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn nettask_add_post_string(
    task: *mut FfiTask,
    name: *const c_char,
    value: *const c_char,
) -> i32 {
    with_task(task, "add_post_string", |t| {
        t.add_post_string(required("post_string", name)?, required("post_string", value)?)
    })
}

/// Attach a picture as `image/jpeg`. `file_name` may be null to use the last
/// component of `file_path`. A missing source file is skipped and still
/// returns `NETTASK_OK`.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_add_post_picture(
    task: *mut FfiTask,
    name: *const c_char,
    file_path: *const c_char,
    file_name: *const c_char,
) -> i32 {
    with_task(task, "add_post_picture", |t| {
        t.add_post_picture(
            required("post_picture", name)?,
            required("post_picture", file_path)?,
            str_arg(file_name),
        )
    })
}

fn required<'a>(field: &'static str, ptr: *const c_char) -> Result<&'a str, TaskError> {
    str_arg(ptr).ok_or(TaskError::ConfigInvalid {
        field,
        reason: "null or not valid UTF-8".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Arming and execution
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn nettask_do_get_string(task: *mut FfiTask) -> i32 {
    with_task(task, "do_get_string", |t| t.do_get_string())
}

/// Arm for file capture. `range` (e.g. `"0-255"`) may be null for the whole
/// resource.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_do_get_file(task: *mut FfiTask, range: *const c_char) -> i32 {
    with_task(task, "do_get_file", |t| t.do_get_file(str_arg(range)))
}

/// Perform the request and block until it completes.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_wait_task_done(task: *mut FfiTask) -> i32 {
    with_task(task, "wait_task_done", |t| t.wait_task_done())
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

/// Captured text of a completed string task, cut at the first NUL.
///
/// Returns null for any other task. Free with `nettask_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_get_result_string(task: *const FfiTask) -> *mut c_char {
    guarded(std::ptr::null_mut(), || {
        unsafe { task.as_ref() }
            .and_then(|t| t.inner.result_string())
            .map_or(std::ptr::null_mut(), |text| into_c_string(text.into_owned()))
    })
}

/// Path of the verified download of a completed file task.
///
/// Returns null if the task is not a completed file task or the download
/// failed. Free with `nettask_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_get_file_path(task: *const FfiTask) -> *mut c_char {
    guarded(std::ptr::null_mut(), || {
        unsafe { task.as_ref() }
            .and_then(|t| t.inner.file_path())
            .map_or(std::ptr::null_mut(), |path| {
                into_c_string(path.to_string_lossy().into_owned())
            })
    })
}

/// Whether the response did not fit the capture buffer.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_is_truncated(task: *const FfiTask) -> bool {
    guarded(false, || {
        unsafe { task.as_ref() }.is_some_and(|t| t.inner.is_truncated())
    })
}

/// HTTP status of the completed transfer, or 0 if there was none.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_http_status(task: *const FfiTask) -> u16 {
    guarded(0, || {
        unsafe { task.as_ref() }
            .and_then(|t| t.inner.http_status())
            .unwrap_or(0)
    })
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// GET `url` into memory and return the body, or null on failure.
/// Free with `nettask_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_fetch_string(url: *const c_char, timeout_secs: u64) -> *mut c_char {
    guarded(std::ptr::null_mut(), || {
        let Some(url) = str_arg(url) else {
            return std::ptr::null_mut();
        };
        match nettask_core::fetch_string(url, timeout_secs) {
            Ok(body) => into_c_string(body),
            Err(e) => {
                error!(url, error = %e, "fetch failed");
                std::ptr::null_mut()
            }
        }
    })
}

/// Value of `field` in the JSON document `json`, rendered as JSON text.
/// Null if the document does not parse or lacks the field.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_extract_field(json: *const c_char, field: *const c_char) -> *mut c_char {
    guarded(std::ptr::null_mut(), || {
        match (str_arg(json), str_arg(field)) {
            (Some(json), Some(field)) => nettask_core::extract_field(json, field)
                .map_or(std::ptr::null_mut(), into_c_string),
            _ => std::ptr::null_mut(),
        }
    })
}

/// Decode standard base64, ignoring whitespace. Null on invalid input.
/// Free with `nettask_free_bytes`.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_base64_decode(input: *const c_char) -> *mut FfiBytes {
    guarded(std::ptr::null_mut(), || {
        let Some(input) = str_arg(input) else {
            return std::ptr::null_mut();
        };
        match crypto::base64_decode(input) {
            Ok(bytes) => FfiBytes::from_vec(bytes),
            Err(e) => {
                error!(error = %e, "base64 decode failed");
                std::ptr::null_mut()
            }
        }
    })
}

/// AES-256-CBC decrypt with PKCS#7 padding. `key` must be 32 bytes and `iv`
/// 16. Null on failure. Free with `nettask_free_bytes`.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_decrypt_aes_cbc(
    ciphertext: *const u8,
    ciphertext_len: usize,
    key: *const u8,
    key_len: usize,
    iv: *const u8,
    iv_len: usize,
) -> *mut FfiBytes {
    guarded(std::ptr::null_mut(), || {
        let (Some(ciphertext), Some(key), Some(iv)) = (
            bytes_arg(ciphertext, ciphertext_len),
            bytes_arg(key, key_len),
            bytes_arg(iv, iv_len),
        ) else {
            return std::ptr::null_mut();
        };
        match crypto::decrypt_aes_cbc(ciphertext, key, iv) {
            Ok(plain) => FfiBytes::from_vec(plain),
            Err(e) => {
                error!(error = %e, "decrypt failed");
                std::ptr::null_mut()
            }
        }
    })
}

/// Lowercase hex digest of `data` under `algorithm` (`"MD5"`, `"SHA-1"`,
/// `"SHA-256"` or `"SHA-512"`). Null for an unknown algorithm.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_hash_hex(
    data: *const u8,
    len: usize,
    algorithm: *const c_char,
) -> *mut c_char {
    guarded(std::ptr::null_mut(), || {
        let (Some(data), Some(algorithm)) = (bytes_arg(data, len), str_arg(algorithm)) else {
            return std::ptr::null_mut();
        };
        match crypto::hash_hex(data, algorithm) {
            Ok(hex) => into_c_string(hex),
            Err(e) => {
                error!(error = %e, "hash failed");
                std::ptr::null_mut()
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install a `tracing` subscriber printing to stderr. The filter comes from
/// `RUST_LOG`, defaulting to `info`.
///
/// Returns false if a global subscriber is already installed.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_init_logging() -> bool {
    guarded(false, || {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .is_ok()
    })
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_free_string(s: *mut c_char) {
    if !s.is_null() {
        guarded((), || {
            drop(unsafe { std::ffi::CString::from_raw(s) });
        });
    }
}

/// Free an `FfiBytes` returned by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn nettask_free_bytes(bytes: *mut FfiBytes) {
    if bytes.is_null() {
        return;
    }
    guarded((), || {
        let bytes = unsafe { Box::from_raw(bytes) };
        if !bytes.data.is_null() {
            drop(unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(bytes.data, bytes.len))
            });
        }
    });
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
