use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use crate::error::{BackendError, Result};
use crate::quota::one_api::{self, Route};

use super::{InboundRequest, OutboundResponse};

const MISSING_PARAMS_MESSAGE: &str = "Missing baseURL, token or userId parameter";

#[derive(Debug)]
struct QuotaParams {
    base_url: String,
    token: String,
    user_id: String,
}

pub async fn handle_quota(client: &Client, request: &InboundRequest) -> OutboundResponse {
    match aggregate(client, request).await {
        Ok(payload) => OutboundResponse::json(200, &payload),
        Err(BackendError::MissingParameter(name)) => {
            log::debug!("quota request missing {name}");
            OutboundResponse::error(400, MISSING_PARAMS_MESSAGE)
        }
        Err(err) => {
            log::error!("quota aggregation failed: {err}");
            OutboundResponse::failure("Failed to fetch provider quota", &err.to_string())
        }
    }
}

async fn aggregate(client: &Client, request: &InboundRequest) -> Result<Value> {
    let params = parse_params(&request.url)?;
    let aggregated = one_api::fetch_quota(
        client,
        Route::Direct,
        &params.base_url,
        &params.token,
        &params.user_id,
    )
    .await?;

    let unit = aggregated.result().unit;
    if !unit.is_finite() {
        log::warn!(
            "quota_per_unit {} for {} gives a non-finite unit",
            aggregated.quota_per_unit,
            params.base_url
        );
    }

    Ok(json!({
        "quotaPerUnit": aggregated.quota_per_unit,
        "quota": aggregated.quota,
        "unit": unit,
        "statusData": aggregated.status_data,
        "userData": aggregated.user_data,
    }))
}

fn parse_params(request_url: &str) -> Result<QuotaParams> {
    let parsed = Url::parse(&format!("http://localhost{request_url}"))
        .map_err(|_| BackendError::MissingParameter("baseURL"))?;

    let mut base_url = None;
    let mut token = None;
    let mut user_id = None;
    for (key, value) in parsed.query_pairs() {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "baseURL" => base_url = base_url.or(Some(value.to_string())),
            "token" => token = token.or(Some(value.to_string())),
            "userId" => user_id = user_id.or(Some(value.to_string())),
            _ => {}
        }
    }

    Ok(QuotaParams {
        base_url: base_url.ok_or(BackendError::MissingParameter("baseURL"))?,
        token: token.ok_or(BackendError::MissingParameter("token"))?,
        user_id: user_id.ok_or(BackendError::MissingParameter("userId"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::one_api::{STATUS_PATH, USER_SELF_PATH};
    use crate::test_support::{spawn_upstream, MockReply, MockUpstream};

    fn quota_request(query: &str) -> InboundRequest {
        InboundRequest {
            method: "GET".to_string(),
            url: format!("/api/one-api/quota?{query}"),
            ..InboundRequest::default()
        }
    }

    fn one_api_upstream(quota_per_unit: &'static str) -> MockUpstream {
        spawn_upstream(move |request| match request.path() {
            STATUS_PATH => MockReply::json(
                200,
                &format!(r#"{{"data":{{"quota_per_unit":{quota_per_unit}}}}}"#),
            ),
            USER_SELF_PATH => MockReply::json(200, r#"{"data":{"quota":1000000}}"#),
            _ => MockReply::json(404, "{}"),
        })
    }

    fn encoded(value: &str) -> String {
        url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
    }

    #[tokio::test]
    async fn missing_parameters_are_rejected() {
        let client = Client::new();
        for query in [
            "",
            "token=abc&userId=1",
            "baseURL=https%3A%2F%2Fx.test&userId=1",
            "baseURL=https%3A%2F%2Fx.test&token=abc",
            "baseURL=https%3A%2F%2Fx.test&token=&userId=1",
        ] {
            let response = handle_quota(&client, &quota_request(query)).await;
            assert_eq!(response.status, 400, "query {query}");
            let body = response.body_json().expect("body should be JSON");
            assert_eq!(body["error"], MISSING_PARAMS_MESSAGE);
        }
    }

    #[tokio::test]
    async fn aggregates_status_and_user_quota() {
        let upstream = one_api_upstream("500000");
        let client = Client::new();

        let query = format!(
            "baseURL={}&token=abc&userId=1",
            encoded(&upstream.base_url)
        );
        let response = handle_quota(&client, &quota_request(&query)).await;

        assert_eq!(response.status, 200);
        let body = response.body_json().expect("body should be JSON");
        assert_eq!(body["quotaPerUnit"].as_f64(), Some(500_000.0));
        assert_eq!(body["quota"].as_f64(), Some(1_000_000.0));
        assert_eq!(body["unit"].as_f64(), Some(2.0));
        assert_eq!(body["statusData"]["data"]["quota_per_unit"], 500_000);
        assert_eq!(body["userData"]["data"]["quota"], 1_000_000);

        let requests = upstream.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests
            .iter()
            .all(|request| request.header("authorization") == Some("Bearer abc")));
        assert_eq!(requests[1].header("new-api-user"), Some("1"));
    }

    #[tokio::test]
    async fn zero_quota_per_unit_yields_null_unit() {
        let upstream = one_api_upstream("0");
        let client = Client::new();

        let query = format!(
            "baseURL={}&token=abc&userId=1",
            encoded(&upstream.base_url)
        );
        let response = handle_quota(&client, &quota_request(&query)).await;

        assert_eq!(response.status, 200);
        let body = response.body_json().expect("body should be JSON");
        assert!(body["unit"].is_null());
        assert_eq!(body["quotaPerUnit"], 0);
    }

    #[tokio::test]
    async fn upstream_failure_is_a_server_error() {
        let upstream = spawn_upstream(|_| MockReply::json(502, r#"{"message":"down"}"#));
        let client = Client::new();

        let query = format!(
            "baseURL={}&token=abc&userId=1",
            encoded(&upstream.base_url)
        );
        let response = handle_quota(&client, &quota_request(&query)).await;

        assert_eq!(response.status, 500);
        let body = response.body_json().expect("body should be JSON");
        assert_eq!(body["error"], "Failed to fetch provider quota");
        assert!(body["details"]
            .as_str()
            .is_some_and(|details| details.contains("HTTP 502")));
    }
}
