use serde_json::json;

use crate::util::api_request;

/// The (learner, session) pair every session command addresses.
pub struct SessionTarget<'a> {
    pub learner_id: &'a str,
    pub session_id: &'a str,
}

impl SessionTarget<'_> {
    fn segments<'s>(&'s self, tail: Option<&'s str>) -> Vec<&'s str> {
        let mut segments = vec!["v1", "sessions", self.learner_id, self.session_id];
        segments.extend(tail);
        segments
    }
}

pub async fn start(api_url: &str, target: &SessionTarget<'_>, raw: bool) -> i32 {
    let body = json!({
        "learner_id": target.learner_id,
        "session_id": target.session_id,
    });
    api_request(
        api_url,
        reqwest::Method::POST,
        &["v1", "sessions"],
        Some(body),
        raw,
    )
    .await
}

pub async fn act(
    api_url: &str,
    target: &SessionTarget<'_>,
    action: &str,
    data: Option<&str>,
    text: Option<&str>,
    raw: bool,
) -> i32 {
    api_request(
        api_url,
        reqwest::Method::POST,
        &target.segments(Some("actions")),
        Some(action_body(action, data, text)),
        raw,
    )
    .await
}

pub async fn show(api_url: &str, target: &SessionTarget<'_>, raw: bool) -> i32 {
    api_request(
        api_url,
        reqwest::Method::GET,
        &target.segments(None),
        None,
        raw,
    )
    .await
}

pub async fn end(api_url: &str, target: &SessionTarget<'_>, raw: bool) -> i32 {
    api_request(
        api_url,
        reqwest::Method::DELETE,
        &target.segments(None),
        None,
        raw,
    )
    .await
}

fn action_body(action: &str, data: Option<&str>, text: Option<&str>) -> serde_json::Value {
    let mut body = json!({ "action": action });
    if let Some(data) = data {
        body["data"] = json!(data);
    }
    if let Some(text) = text {
        body["text"] = json!(text);
    }
    body
}
