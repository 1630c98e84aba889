//! Placeholder avatars drawn as inline SVG.

use axum::{
    extract::Path,
    http::header,
    response::{IntoResponse, Response},
};

const PLATFORM_BADGES: &[(&str, &str, char)] = &[
    ("bilibili", "#00a1d6", 'B'),
    ("douyu", "#ff7500", 'D'),
    ("huya", "#ff6600", 'H'),
    ("douyin", "#fe2c55", 'Y'),
    ("kuaishou", "#ff4906", 'K'),
    ("youtube", "#ff0000", 'Y'),
    ("twitch", "#9146ff", 'T'),
];

const USER_SVG: &str = "<svg xmlns='http://www.w3.org/2000/svg' width='48' height='48' viewBox='0 0 48 48'>\
<circle cx='24' cy='24' r='24' fill='#cccccc'/><circle cx='24' cy='18' r='8' fill='#ffffff'/>\
<path d='M12 38c0-6.627 5.373-12 12-12s12 5.373 12 12' fill='#ffffff'/></svg>";

/// Round badge with the platform initial, or a generic user silhouette.
pub fn default_avatar_svg(platform: &str) -> String {
    match PLATFORM_BADGES.iter().find(|(name, ..)| *name == platform) {
        Some((_, color, letter)) => format!(
            "<svg xmlns='http://www.w3.org/2000/svg' width='48' height='48' viewBox='0 0 48 48'>\
<circle cx='24' cy='24' r='24' fill='{color}'/>\
<text x='24' y='32' text-anchor='middle' fill='white' font-size='20' font-weight='bold' \
font-family='Arial'>{letter}</text></svg>"
        ),
        None => USER_SVG.to_string(),
    }
}

/// `/avatar/default/{platform}`
pub async fn default_avatar_handler(Path(platform): Path<String>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "public, max-age=31536000"),
        ],
        default_avatar_svg(&platform),
    )
        .into_response()
}
