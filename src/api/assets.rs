//! Embedded static assets
//!
//! In development, falls back to serving from the filesystem.

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::Embed;
use std::path::PathBuf;

const ASSET_DIR: &str = "ui";

#[derive(Embed)]
#[folder = "ui"]
struct Assets;

fn asset_response(path: &str, data: Vec<u8>) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    ([(header::CONTENT_TYPE, mime.to_string())], data).into_response()
}

/// Serve embedded static files, with filesystem fallback for development
pub async fn serve_static(Path(path): Path<String>) -> Response {
    let path = path.trim_start_matches('/');

    if let Some(content) = Assets::get(path) {
        return asset_response(path, content.data.into_owned());
    }

    // Never read outside the asset directory
    if path.split('/').any(|part| part == "..") {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    match std::fs::read(PathBuf::from(ASSET_DIR).join(path)) {
        Ok(content) => asset_response(path, content),
        Err(_) => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// Get the index.html content (embedded or from filesystem)
pub fn get_index_html() -> Option<String> {
    if let Some(content) = Assets::get("index.html") {
        return String::from_utf8(content.data.into_owned()).ok();
    }

    std::fs::read_to_string(PathBuf::from(ASSET_DIR).join("index.html")).ok()
}
