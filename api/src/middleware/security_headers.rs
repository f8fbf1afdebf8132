use axum::extract::Request;
use axum::http::header::{CACHE_CONTROL, CONTENT_SECURITY_POLICY, PRAGMA};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

/// Routes whose bodies carry learner transcripts and diagnostic results.
const SESSION_PREFIX: &str = "/v1/sessions";

/// Swagger UI loads its own scripts and styles, so it only gets `frame-ancestors`.
const DOCS_CSP: &str = "frame-ancestors 'none'";
/// JSON responses never load anything.
const API_CSP: &str = "default-src 'none'; frame-ancestors 'none'";

/// Security headers for every response, plus `no-store` on session routes so
/// transcripts never land in a shared cache.
pub async fn apply(req: Request, next: Next) -> Response {
    let path = req.uri().path();
    let is_session = path.starts_with(SESSION_PREFIX);
    let is_docs = path.starts_with("/swagger-ui") || path.starts_with("/api-doc");

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    insert_baseline(headers);
    headers.insert(
        CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(if is_docs { DOCS_CSP } else { API_CSP }),
    );
    if is_session {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    }
    response
}

fn insert_baseline(headers: &mut HeaderMap) {
    for (name, value) in [
        ("x-content-type-options", "nosniff"),
        ("referrer-policy", "no-referrer"),
        ("x-frame-options", "DENY"),
    ] {
        headers.insert(name, HeaderValue::from_static(value));
    }
}
