//! File API handlers
//!
//! Upload, list and download endpoints. Handlers only translate between HTTP
//! and the file service; all filesystem work lives in
//! [`crate::services::files`].

use crate::api::multipart::{receive_files, UploadRules};
use crate::error::AppError;
use crate::services::files::{StoredFileInfo, UploadedFile};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::{header, HeaderValue},
    response::{Json, Response},
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Multipart field accepted by `POST /upload`
pub const SINGLE_FIELD: &str = "file";

/// Multipart field accepted by `POST /upload-multiple`
pub const MULTIPLE_FIELD: &str = "files";

/// RFC 5987 `attr-char`: everything else is percent-encoded
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Response for a single-file upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub file: UploadedFile,
}

/// Response for a multi-file upload
#[derive(Debug, Serialize)]
pub struct UploadMultipleResponse {
    pub success: bool,
    pub message: String,
    pub files: Vec<UploadedFile>,
}

/// Response for listing stored files
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesResponse {
    pub success: bool,
    pub upload_dir: String,
    pub files: Vec<StoredFileInfo>,
}

/// POST /upload - Store one file from the `file` field
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Ok(mut multipart) = multipart else {
        debug!("Upload request is not multipart");
        return Err(AppError::NoFileUploaded);
    };

    let rules = UploadRules {
        field: SINGLE_FIELD,
        max_files: 1,
    };
    let file = receive_files(&state.files, &mut multipart, rules)
        .await?
        .into_iter()
        .next()
        .ok_or(AppError::NoFileUploaded)?;

    Ok(Json(UploadResponse {
        success: true,
        message: "File uploaded successfully".to_string(),
        file,
    }))
}

/// POST /upload-multiple - Store up to `max_files` files from the `files` field
pub async fn upload_multiple(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadMultipleResponse>, AppError> {
    let Ok(mut multipart) = multipart else {
        debug!("Upload request is not multipart");
        return Err(AppError::NoFilesUploaded);
    };

    let rules = UploadRules {
        field: MULTIPLE_FIELD,
        max_files: state.config.storage.max_files,
    };
    let files = receive_files(&state.files, &mut multipart, rules).await?;
    if files.is_empty() {
        return Err(AppError::NoFilesUploaded);
    }

    Ok(Json(UploadMultipleResponse {
        success: true,
        message: format!("{} file(s) uploaded successfully", files.len()),
        files,
    }))
}

/// GET /files - List stored files with their metadata
pub async fn list_files(
    State(state): State<AppState>,
) -> Result<Json<ListFilesResponse>, AppError> {
    let files = state.files.list().await?;

    Ok(Json(ListFilesResponse {
        success: true,
        upload_dir: state.files.upload_dir().to_string(),
        files,
    }))
}

/// GET /download/:filename - Stream a stored file as an attachment
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let download = state.files.open(&filename).await?;

    let content_type = mime_guess::from_path(&download.filename)
        .first_or_octet_stream()
        .to_string();
    let disposition = content_disposition(&download.filename);

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, download.size);
    if let Some(modified) = download.modified {
        let http_date = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&http_date) {
            builder = builder.header(header::LAST_MODIFIED, value);
        }
    }

    let body = Body::from_stream(ReaderStream::new(download.file));
    builder
        .body(body)
        .map_err(|e| AppError::Internal(format!("Response build failed: {e}")))
}

/// `Content-Disposition` value for an attachment named `filename`
///
/// Names that cannot be sent as a plain quoted string get an ASCII fallback
/// plus an RFC 5987 `filename*` parameter carrying the real name.
fn content_disposition(filename: &str) -> HeaderValue {
    let plain = filename
        .chars()
        .all(|c| (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\');

    let value = if plain {
        format!("attachment; filename=\"{filename}\"")
    } else {
        let fallback: String = filename
            .chars()
            .map(|c| {
                if (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            utf8_percent_encode(filename, ATTR_CHAR)
        )
    };

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
