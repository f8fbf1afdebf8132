use serde_json::json;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", render(&err, false));
    std::process::exit(4);
}

fn render(value: &serde_json::Value, raw: bool) -> String {
    let rendered = if raw {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.unwrap_or_else(|_| value.to_string())
}

/// Build `{api_url}/{segments...}`, escaping each segment.
pub fn endpoint(api_url: &str, segments: &[&str]) -> Result<reqwest::Url, String> {
    let mut url =
        reqwest::Url::parse(api_url).map_err(|e| format!("Invalid API URL '{api_url}': {e}"))?;
    url.path_segments_mut()
        .map_err(|_| format!("API URL '{api_url}' cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Execute an API request, print the response, return a structured exit code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    segments: &[&str],
    body: Option<serde_json::Value>,
    raw: bool,
) -> i32 {
    let url = match endpoint(api_url, segments) {
        Ok(url) => url,
        Err(message) => {
            eprintln!("{}", render(&json!({"error": "cli_error", "message": message}), raw));
            return 4;
        }
    };

    tracing::debug!(%method, %url, "Sending request");
    let mut req = client().request(method, url);
    if let Some(b) = body {
        req = req.json(&b);
    }

    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            let err = json!({
                "error": "connection_error",
                "message": format!("{e}"),
                "docs_hint": "Is the API server running? Check SOCRA_API_URL."
            });
            eprintln!("{}", render(&err, raw));
            return 3;
        }
    };

    let status = resp.status().as_u16();
    let exit_code = exit_code_for(status);

    let resp_body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };

    let formatted = render(&resp_body, raw);
    if exit_code == 0 {
        println!("{formatted}");
    } else {
        eprintln!("{formatted}");
    }

    exit_code
}

fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}
