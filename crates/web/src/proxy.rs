//! Avatar image proxy. Platforms refuse hotlinked images, so the dashboard
//! fetches them through here with a browser-like request.

use {
    axum::{
        extract::{Query, State},
        http::{HeaderValue, StatusCode, header},
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    tracing::debug,
};

use crate::server::AppState;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://www.bilibili.com/";
const ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

#[derive(Deserialize)]
pub struct ProxyParams {
    url: Option<String>,
}

/// `/proxy/image?url=...`
pub async fn image_proxy_handler(
    State(state): State<AppState>,
    Query(params): Query<ProxyParams>,
) -> Response {
    let Some(url) = params.url.filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing url parameter").into_response();
    };
    let Ok(parsed) = reqwest::Url::parse(&url) else {
        return (StatusCode::BAD_REQUEST, "invalid url").into_response();
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return (StatusCode::BAD_REQUEST, "unsupported url scheme").into_response();
    }

    let upstream = match state
        .http
        .get(parsed)
        .header(header::USER_AGENT, USER_AGENT)
        .header(header::REFERER, REFERER)
        .header(header::ACCEPT, ACCEPT)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            debug!(url, error = %e, "image fetch failed");
            return (StatusCode::BAD_GATEWAY, "failed to fetch image").into_response();
        },
    };

    let status = upstream.status();
    if !status.is_success() {
        let code = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        return (code, "failed to fetch image").into_response();
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    match upstream.bytes().await {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, content_type),
                (
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("public, max-age=86400"),
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            debug!(url, error = %e, "image body read failed");
            (StatusCode::BAD_GATEWAY, "failed to fetch image").into_response()
        },
    }
}
