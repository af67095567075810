use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use url::Url;

use crate::error::{BackendError, Result};
use crate::quota::one_api::ORIGINAL_URL_HEADER;

use super::{InboundRequest, OutboundResponse};

/// Request headers never copied to the target. The first three are the proxy's own
/// inputs; the rest describe the inbound connection and framing.
const SKIPPED_REQUEST_HEADERS: [&str; 8] = [
    ORIGINAL_URL_HEADER,
    "host",
    "referer",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "upgrade",
];

const SKIPPED_RESPONSE_HEADERS: [&str; 5] = [
    "connection",
    "transfer-encoding",
    "access-control-allow-origin",
    "access-control-allow-methods",
    "access-control-allow-headers",
];

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    (
        "Access-Control-Allow-Methods",
        "GET, POST, PUT, DELETE, PATCH, OPTIONS",
    ),
    ("Access-Control-Allow-Headers", "*"),
];

pub async fn handle_proxy(client: &Client, request: &InboundRequest) -> OutboundResponse {
    let Some(target) = request
        .header(ORIGINAL_URL_HEADER)
        .filter(|value| !value.trim().is_empty())
    else {
        return OutboundResponse::error(400, "Missing ORIGINAL_URL header");
    };

    match forward(client, request, target).await {
        Ok(response) => response,
        Err(err) => {
            log::error!("proxy error for {target}: {err}");
            OutboundResponse::failure("Failed to proxy request", &err.to_string())
        }
    }
}

async fn forward(
    client: &Client,
    request: &InboundRequest,
    target: &str,
) -> Result<OutboundResponse> {
    let target = Url::parse(target.trim())
        .map_err(|err| BackendError::Upstream(format!("invalid target URL '{target}': {err}")))?;
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|err| BackendError::Upstream(format!("invalid method: {err}")))?;

    let mut outbound = client
        .request(method.clone(), target)
        .headers(forwarded_headers(request));
    if method != Method::GET && method != Method::HEAD {
        if let Some(body) = encode_body(request.header("content-type"), &request.body) {
            outbound = outbound.body(body);
        }
    }

    let response = outbound
        .send()
        .await
        .map_err(|err| BackendError::Upstream(format!("upstream request failed: {err}")))?;
    let status = response.status().as_u16();
    let mut headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter(|(name, _)| !SKIPPED_RESPONSE_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    headers.extend(
        CORS_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string())),
    );

    let body = response
        .bytes()
        .await
        .map_err(|err| BackendError::Upstream(format!("upstream body read failed: {err}")))?;

    Ok(OutboundResponse {
        status,
        headers,
        body: body.to_vec(),
    })
}

fn forwarded_headers(request: &InboundRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (field, value) in &request.headers {
        let lowered = field.to_ascii_lowercase();
        if SKIPPED_REQUEST_HEADERS.contains(&lowered.as_str()) {
            continue;
        }
        match (
            HeaderName::from_bytes(lowered.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => log::warn!("dropping unforwardable header '{field}'"),
        }
    }
    headers
}

/// Re-encodes the inbound body by content type. A body that fails to parse is dropped
/// and the request goes out without one.
fn encode_body(content_type: Option<&str>, raw: &[u8]) -> Option<Vec<u8>> {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

    if content_type.contains("application/json") {
        let reencoded = serde_json::from_slice::<serde_json::Value>(raw)
            .and_then(|value| serde_json::to_vec(&value));
        match reencoded {
            Ok(body) => Some(body),
            Err(err) => {
                log::error!("error processing request body: {err}");
                None
            }
        }
    } else if content_type.contains("application/x-www-form-urlencoded") {
        match String::from_utf8(raw.to_vec()) {
            Ok(text) => Some(text.into_bytes()),
            Err(err) => {
                log::error!("error processing request body: {err}");
                None
            }
        }
    } else {
        Some(raw.to_vec())
    }
}
