use reqwest::Client;
use serde_json::{Number, Value};
use url::Url;

use crate::common::format_http_error;
use crate::error::{BackendError, Result};

use super::QuotaResult;

pub const STATUS_PATH: &str = "/api/status";
pub const USER_SELF_PATH: &str = "/api/user/self";
pub const USER_ID_HEADER: &str = "New-Api-User";
pub const ORIGINAL_URL_HEADER: &str = "original-url";

/// How the two provider calls leave this process.
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    Direct,
    /// Through a forwarding proxy that reads the target from `original-url`.
    ViaProxy(&'a Url),
}

#[derive(Debug, Clone)]
pub struct AggregatedQuota {
    pub quota_per_unit: Number,
    pub quota: Number,
    pub status_data: Value,
    pub user_data: Value,
}

impl AggregatedQuota {
    pub fn result(&self) -> QuotaResult {
        QuotaResult::new(as_f64(&self.quota_per_unit), as_f64(&self.quota))
    }
}

/// Reads `data.quota_per_unit` from `/api/status`, then `data.quota` from
/// `/api/user/self`. The two calls run one after the other.
pub async fn fetch_quota(
    client: &Client,
    route: Route<'_>,
    base_url: &str,
    token: &str,
    user_id: &str,
) -> Result<AggregatedQuota> {
    let status_url = endpoint_url(base_url, STATUS_PATH)?;
    let status_data = get_json(client, route, &status_url, token, None, "status request").await?;
    let quota_per_unit = read_number(&status_data, "quota_per_unit", "status response")?;

    let user_url = endpoint_url(base_url, USER_SELF_PATH)?;
    let user_data = get_json(
        client,
        route,
        &user_url,
        token,
        Some(user_id),
        "user request",
    )
    .await?;
    let quota = read_number(&user_data, "quota", "user response")?;

    Ok(AggregatedQuota {
        quota_per_unit,
        quota,
        status_data,
        user_data,
    })
}

/// Resolves `path` against the base URL the way a browser `new URL(path, base)` does:
/// an absolute path replaces whatever path the base carried.
pub fn endpoint_url(base_url: &str, path: &str) -> Result<Url> {
    let base = Url::parse(base_url.trim())
        .map_err(|err| BackendError::Upstream(format!("invalid base URL '{base_url}': {err}")))?;
    base.join(path)
        .map_err(|err| BackendError::Upstream(format!("invalid endpoint URL: {err}")))
}

async fn get_json(
    client: &Client,
    route: Route<'_>,
    target: &Url,
    token: &str,
    user_id: Option<&str>,
    context: &str,
) -> Result<Value> {
    let mut request = match route {
        Route::Direct => client.get(target.clone()),
        Route::ViaProxy(proxy) => client
            .get(proxy.clone())
            .header(ORIGINAL_URL_HEADER, target.as_str()),
    };
    request = request
        .header("accept", "application/json")
        .bearer_auth(token);
    if let Some(user_id) = user_id {
        request = request.header(USER_ID_HEADER, user_id);
    }

    let response = request
        .send()
        .await
        .map_err(|err| BackendError::Upstream(format!("{context} failed: {err}")))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| BackendError::Upstream(format!("{context} body read failed: {err}")))?;

    if !status.is_success() {
        let message = format_http_error(&format!("{context} failed"), status, &body);
        return Err(BackendError::Upstream(message));
    }

    serde_json::from_str::<Value>(&body)
        .map_err(|err| BackendError::Upstream(format!("{context} decode failed: {err}")))
}

fn read_number(payload: &Value, field: &str, context: &str) -> Result<Number> {
    match payload.get("data").and_then(|data| data.get(field)) {
        Some(Value::Number(number)) => Ok(number.clone()),
        Some(other) => Err(BackendError::Upstream(format!(
            "{context} data.{field} is not a number: {other}"
        ))),
        None => Err(BackendError::Upstream(format!(
            "{context} is missing data.{field}"
        ))),
    }
}

fn as_f64(number: &Number) -> f64 {
    number.as_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_upstream, MockReply};

    fn one_api_upstream(quota_per_unit: &str, quota: &str) -> crate::test_support::MockUpstream {
        let status_body = format!(r#"{{"success":true,"data":{{"quota_per_unit":{quota_per_unit}}}}}"#);
        let user_body = format!(r#"{{"success":true,"data":{{"id":1,"quota":{quota}}}}}"#);
        spawn_upstream(move |request| {
            if request.header("authorization") != Some("Bearer abc") {
                return MockReply::json(401, r#"{"message":"unauthorized"}"#);
            }
            match request.path() {
                STATUS_PATH => MockReply::json(200, &status_body),
                USER_SELF_PATH if request.header("new-api-user") == Some("1") => {
                    MockReply::json(200, &user_body)
                }
                USER_SELF_PATH => MockReply::json(401, r#"{"message":"missing user"}"#),
                _ => MockReply::json(404, r#"{"message":"not found"}"#),
            }
        })
    }

    #[test]
    fn endpoint_url_replaces_base_path() {
        let url = endpoint_url("https://x.test/v1/", STATUS_PATH).expect("url should resolve");
        assert_eq!(url.as_str(), "https://x.test/api/status");
        assert!(endpoint_url("x.test", STATUS_PATH).is_err());
    }

    #[tokio::test]
    async fn fetches_both_endpoints_directly() {
        let upstream = one_api_upstream("500000", "1000000");
        let client = Client::new();

        let aggregated = fetch_quota(&client, Route::Direct, &upstream.base_url, "abc", "1")
            .await
            .expect("quota should be fetched");

        assert_eq!(aggregated.quota_per_unit.as_u64(), Some(500_000));
        assert_eq!(aggregated.quota.as_u64(), Some(1_000_000));
        assert_eq!(aggregated.result().unit, 2.0);
        assert_eq!(aggregated.user_data["data"]["id"], 1);

        let paths = upstream.paths();
        assert_eq!(paths, vec![STATUS_PATH.to_string(), USER_SELF_PATH.to_string()]);
    }

    #[tokio::test]
    async fn upstream_rejection_is_an_error() {
        let upstream = one_api_upstream("500000", "1000000");
        let client = Client::new();

        let err = fetch_quota(&client, Route::Direct, &upstream.base_url, "wrong", "1")
            .await
            .expect_err("bad token should fail");
        assert!(err.to_string().contains("status request failed: HTTP 401"));
    }

    #[tokio::test]
    async fn missing_field_is_an_error() {
        let upstream = spawn_upstream(|_| MockReply::json(200, r#"{"data":{}}"#));
        let client = Client::new();

        let err = fetch_quota(&client, Route::Direct, &upstream.base_url, "abc", "1")
            .await
            .expect_err("missing quota_per_unit should fail");
        assert!(err
            .to_string()
            .contains("status response is missing data.quota_per_unit"));
    }

    #[tokio::test]
    async fn non_json_body_is_an_error() {
        let upstream = spawn_upstream(|_| MockReply::text(200, "<html>maintenance</html>"));
        let client = Client::new();

        let err = fetch_quota(&client, Route::Direct, &upstream.base_url, "abc", "1")
            .await
            .expect_err("html body should fail");
        assert!(err.to_string().contains("status request decode failed"));
    }
}
