use axum::{
    extract::{Multipart, Path},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Body served by `/text`.
pub const TEXT_BODY: &str = "hello from mock server";

/// One part received by `/upload`, echoed back as JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub len: usize,
    /// Text content for parts without a file name.
    pub text: Option<String>,
}

pub fn app() -> Router {
    Router::new()
        .route("/text", get(text))
        .route("/json", get(json))
        .route("/bytes/{len}", get(bytes))
        .route("/redirect/{len}", get(redirect))
        .route("/status/{code}", get(status))
        .route("/upload", post(upload))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "mock server listening");
    axum::serve(listener, app()).await
}

/// Deterministic payload of `len` bytes served by `/bytes/{len}`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn text() -> &'static str {
    TEXT_BODY
}

async fn json() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "success",
        "status": 200,
        "data": { "wendu": "21", "quality": "good" }
    }))
}

async fn bytes(Path(len): Path<usize>, headers: HeaderMap) -> Response {
    let body = pattern(len);
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, len));

    match range {
        Some((start, end)) => (
            StatusCode::PARTIAL_CONTENT,
            [(header::CONTENT_RANGE, format!("bytes {start}-{end}/{len}"))],
            body[start..=end].to_vec(),
        )
            .into_response(),
        None => (StatusCode::OK, body).into_response(),
    }
}

async fn redirect(Path(len): Path<usize>) -> Redirect {
    Redirect::to(&format!("/bytes/{len}"))
}

async fn status(Path(code): Path<u16>) -> Response {
    let code = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (code, format!("status {}", code.as_u16())).into_response()
}

async fn upload(mut multipart: Multipart) -> Result<Json<Vec<UploadedPart>>, StatusCode> {
    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
        let text = if file_name.is_none() {
            Some(String::from_utf8_lossy(&data).into_owned())
        } else {
            None
        };
        parts.push(UploadedPart {
            name,
            file_name,
            content_type,
            len: data.len(),
            text,
        });
    }
    Ok(Json(parts))
}

/// Parse a single `bytes=start-end` range, clamped to `len`.
fn parse_range(value: &str, len: usize) -> Option<(usize, usize)> {
    let range = value.strip_prefix("bytes=")?;
    let (start, end) = range.split_once('-')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = match end.trim() {
        "" => len.checked_sub(1)?,
        e => e.parse::<usize>().ok()?.min(len.checked_sub(1)?),
    };
    (start <= end).then_some((start, end))
}
