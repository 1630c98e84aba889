//! Static dashboard assets, embedded with `include_dir!`.
//!
//! Set `DANMU_ASSETS_DIR` to serve a customised copy from disk instead.

use std::{path::PathBuf, sync::LazyLock};

use {
    axum::{
        extract::Path,
        http::{StatusCode, header},
        response::{IntoResponse, Response},
    },
    tracing::info,
};

static ASSETS: include_dir::Dir = include_dir::include_dir!("$CARGO_MANIFEST_DIR/assets");

static FS_ASSETS_DIR: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let dir = PathBuf::from(std::env::var_os("DANMU_ASSETS_DIR")?);
    if dir.is_dir() {
        info!(dir = %dir.display(), "serving dashboard assets from filesystem");
        Some(dir)
    } else {
        None
    }
});

fn mime_for_path(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "html" => "text/html; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Read an asset, preferring the filesystem override.
pub fn read_asset(path: &str) -> Option<Vec<u8>> {
    if let Some(dir) = FS_ASSETS_DIR.as_ref() {
        let file_path = dir.join(path);
        // Prevent path traversal
        if !path.contains("..")
            && file_path.starts_with(dir)
            && let Ok(bytes) = std::fs::read(&file_path)
        {
            return Some(bytes);
        }
    }
    ASSETS.get_file(path).map(|f| f.contents().to_vec())
}

fn serve_asset(path: &str) -> Response {
    match read_asset(path) {
        Some(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime_for_path(path)),
                (header::CACHE_CONTROL, "no-cache"),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

/// `/`
pub async fn index_handler() -> Response {
    serve_asset("index.html")
}

/// `/assets/{*path}`
pub async fn asset_handler(Path(path): Path<String>) -> Response {
    serve_asset(&path)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_assets_are_present() {
        for path in ["index.html", "js/danmaku.js", "css/danmaku.css"] {
            assert!(ASSETS.get_file(path).is_some(), "missing {path}");
        }
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for_path("js/danmaku.js"), "application/javascript; charset=utf-8");
        assert_eq!(mime_for_path("index.html"), "text/html; charset=utf-8");
        assert_eq!(mime_for_path("blob"), "application/octet-stream");
    }
}
