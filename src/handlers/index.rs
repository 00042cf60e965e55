//! Chat page served at `/`

use axum::response::Html;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Serve the bundled chat page
pub async fn handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}
