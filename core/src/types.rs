//! Values handed to completion callbacks.

use std::path::Path;

use crate::buffer::CapturedBody;
use crate::error::TaskError;

/// Which destination a task captures into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Memory,
    File,
}

/// What a completion callback receives.
#[derive(Debug)]
pub enum Payload<'a> {
    /// Memory capture: the bytes that fit in the buffer.
    Text(&'a CapturedBody),
    /// File capture: the verified download, now owned by the caller.
    File(&'a Path),
}

/// Completion notice passed to the callback registered with
/// `RequestTask::set_callback`.
#[derive(Debug)]
pub struct Completion<'a> {
    pub result: Result<(), &'a TaskError>,
    pub payload: Payload<'a>,
}

impl Completion<'_> {
    /// `0` on success, the error's code otherwise.
    pub fn status(&self) -> i32 {
        match self.result {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }
}

/// Callback invoked at most once, synchronously, from `wait_task_done`.
pub type CompletionCallback = Box<dyn FnOnce(Completion<'_>)>;
