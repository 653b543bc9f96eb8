//! `#[repr(C)]` types and conversions for the FFI boundary.
//!
//! # Design
//! The task itself stays opaque: C holds a `*mut FfiTask` and passes it back
//! into every call. Only plain data crosses by value: status codes, C
//! strings and `FfiBytes` buffers. Conversion helpers live here to keep
//! `lib.rs` focused on the `extern "C"` surface.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

use nettask_core::{Completion, Payload, RequestTask};

/// Success.
pub const NETTASK_OK: i32 = 0;
/// An operation is not valid in the task's current phase.
pub const NETTASK_ERR_STATE: i32 = -1;
/// Bad or null argument, or invalid configuration.
pub const NETTASK_ERR_CONFIG_INVALID: i32 = -2;
pub const NETTASK_ERR_ALLOCATION_FAILED: i32 = -3;
pub const NETTASK_ERR_IO: i32 = -4;
/// Downloaded file size did not match the announced content length.
pub const NETTASK_ERR_VALIDATION: i32 = -5;
pub const NETTASK_ERR_TRANSPORT: i32 = -6;
/// A panic was caught at the boundary.
pub const NETTASK_ERR_PANIC: i32 = -99;

/// Opaque handle to a `RequestTask`. Created by `nettask_new`, released by
/// `nettask_free`.
pub struct FfiTask {
    pub(crate) inner: RequestTask,
}

/// Completion callback.
///
/// `status` is `NETTASK_OK` or a negative error code. `data` is the captured
/// text for string tasks or the downloaded file path for file tasks. It is
/// only valid for the duration of the call.
pub type NettaskCallback =
    Option<extern "C" fn(status: i32, data: *const c_char, user_data: *mut c_void)>;

/// Byte buffer owned by the caller; free with `nettask_free_bytes`.
#[repr(C)]
pub struct FfiBytes {
    pub data: *mut u8,
    pub len: usize,
}

impl FfiBytes {
    pub(crate) fn from_vec(bytes: Vec<u8>) -> *mut Self {
        let len = bytes.len();
        let data = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
        Box::into_raw(Box::new(FfiBytes { data, len }))
    }
}

/// Borrow a C string argument as `&str`. `None` for null or non-UTF-8.
pub(crate) fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Borrow a `(ptr, len)` pair as a byte slice. Null is accepted only for an
/// empty slice.
pub(crate) fn bytes_arg<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    if ptr.is_null() {
        return (len == 0).then_some(&[][..]);
    }
    Some(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Hand a Rust string to C. Null if it contains an interior NUL.
pub(crate) fn into_c_string(s: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(s)
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

/// Adapt a C callback and its user data into a Rust completion closure.
pub(crate) fn completion_adapter(
    callback: extern "C" fn(i32, *const c_char, *mut c_void),
    user_data: *mut c_void,
) -> impl FnOnce(Completion<'_>) + 'static {
    move |done: Completion<'_>| {
        let status = done.status();
        let data = match done.payload {
            Payload::Text(body) => CString::new(body.as_text().into_owned()),
            Payload::File(path) => CString::new(path.to_string_lossy().into_owned()),
        };
        match data {
            Ok(data) => callback(status, data.as_ptr(), user_data),
            Err(_) => callback(status, std::ptr::null(), user_data),
        }
    }
}
