//! Service descriptor and route fallback

use crate::error::ErrorBody;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// Response for `GET /`
#[derive(Debug, Serialize)]
pub struct DescriptorResponse {
    pub message: String,
    pub endpoints: Endpoints,
}

/// Map of the endpoints the service exposes
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub info: &'static str,
    pub upload: &'static str,
    pub upload_multiple: &'static str,
    pub files: &'static str,
    pub download: &'static str,
}

/// Endpoint listing shared by the descriptor and the startup log
pub const ENDPOINTS: Endpoints = Endpoints {
    info: "GET /",
    upload: "POST /upload",
    upload_multiple: "POST /upload-multiple",
    files: "GET /files",
    download: "GET /download/:filename",
};

/// GET / - Describe the API
pub async fn descriptor() -> Json<DescriptorResponse> {
    Json(DescriptorResponse {
        message: "File Upload API".to_string(),
        endpoints: ENDPOINTS,
    })
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            message: "Route not found".to_string(),
            error: None,
        }),
    )
}
