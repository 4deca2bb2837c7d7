//! Multipart upload intake
//!
//! Drains a multipart body into the storage root. Only file parts under the
//! accepted field name are stored; text parts are ignored. If anything goes
//! wrong part way through, or the request is dropped, every file written for
//! it is removed.

use crate::error::AppError;
use crate::services::files::{FileService, UploadBatch, UploadedFile};
use axum::extract::multipart::Field;
use axum::extract::Multipart;
use tracing::{debug, info};

/// Content type reported when a part declares none
const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Rules for one upload endpoint
#[derive(Debug, Clone, Copy)]
pub struct UploadRules<'a> {
    /// Multipart field name files must arrive under
    pub field: &'a str,
    /// Maximum number of files accepted in the request
    pub max_files: usize,
}

/// Store every accepted file part of `multipart`
///
/// Returns the metadata of the stored files in request order. An empty vector
/// means the request carried no file for the accepted field. Files are only
/// kept once the whole body has been read; an error or a dropped request
/// removes them.
pub async fn receive_files(
    service: &FileService,
    multipart: &mut Multipart,
    rules: UploadRules<'_>,
) -> Result<Vec<UploadedFile>, AppError> {
    let mut batch = UploadBatch::new(service);
    let mut stored: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        let original_name = match field.file_name() {
            Some(file_name) if !file_name.is_empty() => file_name.to_string(),
            _ => {
                debug!("Ignoring non-file multipart field: {}", name);
                continue;
            }
        };

        if name != rules.field {
            return Err(AppError::UnexpectedField(name));
        }
        if batch.len() >= rules.max_files {
            return Err(AppError::TooManyFiles(rules.max_files));
        }

        let uploaded = store_field(service, field, rules.field, original_name).await?;
        batch.track(&uploaded.filename);
        stored.push(uploaded);
    }

    batch.commit();
    Ok(stored)
}

async fn store_field(
    service: &FileService,
    mut field: Field<'_>,
    field_name: &str,
    original_name: String,
) -> Result<UploadedFile, AppError> {
    let mimetype = field
        .content_type()
        .unwrap_or(DEFAULT_MIMETYPE)
        .to_string();

    // Removed on drop until finished.
    let mut upload = service.create_upload(field_name, &original_name).await?;
    while let Some(chunk) = field.chunk().await? {
        upload.write_chunk(&chunk).await?;
    }
    let (filename, size) = upload.finish().await?;

    info!(
        original_name = %original_name,
        filename = %filename,
        size,
        mimetype = %mimetype,
        "Stored uploaded file"
    );

    Ok(UploadedFile {
        path: service.display_path(&filename),
        original_name,
        filename,
        size,
        mimetype,
    })
}
