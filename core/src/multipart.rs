//! `multipart/form-data` fields for POST uploads.
//!
//! Fields are collected in insertion order. Attachments are read when the
//! task is armed (`MultipartForm::load`), so a picture that disappears
//! between `add_post_picture` and arming fails the arming call. The wire
//! encoding itself is `reqwest::multipart`, built per request by
//! `LoadedForm::to_form`.

use std::fs;
use std::path::PathBuf;

use reqwest::multipart::{Form, Part};

use crate::error::TaskError;

/// Content type attached to picture uploads.
pub const PICTURE_CONTENT_TYPE: &str = "image/jpeg";

/// One form field as added to the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        path: PathBuf,
        file_name: String,
        content_type: String,
    },
}

/// Ordered multipart field list.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    fields: Vec<FormField>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: FormField) {
        self.fields.push(field);
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read every attachment into memory.
    pub fn load(&self) -> Result<LoadedForm, TaskError> {
        let parts = self
            .fields
            .iter()
            .map(|field| match field {
                FormField::Text { name, value } => Ok(LoadedPart::Text {
                    name: name.clone(),
                    value: value.clone(),
                }),
                FormField::File {
                    name,
                    path,
                    file_name,
                    content_type,
                } => {
                    let data = fs::read(path)
                        .map_err(|e| TaskError::io(format!("reading {}", path.display()), e))?;
                    Ok(LoadedPart::File {
                        name: name.clone(),
                        file_name: file_name.clone(),
                        content_type: content_type.clone(),
                        data,
                    })
                }
            })
            .collect::<Result<Vec<_>, TaskError>>()?;
        Ok(LoadedForm { parts })
    }
}

/// A form whose attachments have been read, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedForm {
    pub parts: Vec<LoadedPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: String,
        data: Vec<u8>,
    },
}

impl LoadedForm {
    /// Build the `reqwest` form. Fails only on an unparsable content type.
    pub fn to_form(&self) -> Result<Form, reqwest::Error> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match part {
                LoadedPart::Text { name, value } => form.text(name.clone(), value.clone()),
                LoadedPart::File {
                    name,
                    file_name,
                    content_type,
                    data,
                } => {
                    let part = Part::bytes(data.clone())
                        .file_name(file_name.clone())
                        .mime_str(content_type)?;
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

/// Final `/`-separated segment of `path`, or the whole path when it has none.
pub fn file_name_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
