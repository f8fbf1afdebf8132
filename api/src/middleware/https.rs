use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Enforce HTTPS behind a TLS-terminating proxy.
///
/// `X-Forwarded-Proto: http` gets a 301 to the HTTPS equivalent. Every response
/// carries an HSTS header. Enabled with `SOCRA_REQUIRE_HTTPS=true`.
pub async fn require_https(req: Request, next: Next) -> Response {
    let proto = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");

    if proto.eq_ignore_ascii_case("http") {
        if let Some(uri) = https_equivalent(&req) {
            let mut response =
                (StatusCode::MOVED_PERMANENTLY, [("location", uri.to_string())]).into_response();
            add_hsts_header(&mut response);
            return response;
        }
    }

    let mut response = next.run(req).await;
    add_hsts_header(&mut response);
    response
}

fn https_equivalent(req: &Request) -> Option<Uri> {
    let host = req
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("https://{host}{path_and_query}").parse().ok()
}

fn add_hsts_header(response: &mut Response) {
    response.headers_mut().insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
}
