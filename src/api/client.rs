use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{ApiError, Charge, ChargeStatus, Debt, DebtStatus, Stats};
use crate::cache::{CacheGroup, QueryKey};
use crate::config::RealtimeConfig;
use crate::session::Credential;

/// List endpoints answer with either a bare array or `{ "data": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Wrapped { data: items } => items,
        }
    }
}

/// REST client for the queries the cache observers refetch.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    credential: Credential,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &RealtimeConfig, credential: Credential) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Request(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            credential,
            timeout: config.request_timeout,
        })
    }

    pub fn debts_key(status: Option<DebtStatus>) -> QueryKey {
        QueryKey::new(CacheGroup::Debts, status_param(status.map(|s| s.as_str())))
    }

    pub fn charges_key(status: Option<ChargeStatus>) -> QueryKey {
        QueryKey::new(CacheGroup::Charges, status_param(status.map(|s| s.as_str())))
    }

    pub fn stats_key() -> QueryKey {
        QueryKey::group(CacheGroup::Stats)
    }

    pub async fn list_debts(&self, status: Option<DebtStatus>) -> Result<Vec<Debt>, ApiError> {
        let listing: Listing<Debt> = self.get_json("/debts", status.map(|s| s.as_str())).await?;
        Ok(listing.into_vec())
    }

    pub async fn list_charges(&self, status: Option<ChargeStatus>) -> Result<Vec<Charge>, ApiError> {
        let listing: Listing<Charge> = self.get_json("/charges", status.map(|s| s.as_str())).await?;
        Ok(listing.into_vec())
    }

    pub async fn stats(&self) -> Result<Stats, ApiError> {
        self.get_json("/stats", None).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, status: Option<&str>) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).bearer_auth(self.credential.expose());
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.timeout)
            } else {
                ApiError::from(e)
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        debug!(%url, bytes = bytes.len(), "api response");
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }
}

fn status_param(status: Option<&str>) -> String {
    status.map(|s| format!("status={s}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&RealtimeConfig::new(server.base_url()), Credential::new("secret")).unwrap()
    }

    #[tokio::test]
    async fn lists_debts_with_status_filter_and_bearer() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/debts")
                .query_param("status", "pending")
                .header("authorization", "Bearer secret");
            then.status(200).json_body(json!([{
                "id": "d1",
                "debtorName": "Alice",
                "amount": 12500,
                "status": "pending",
                "createdAt": "2026-03-01T12:00:00Z"
            }]));
        });

        let debts = client(&server).list_debts(Some(DebtStatus::Pending)).await.unwrap();

        mock.assert();
        assert_eq!(debts.len(), 1);
        assert_eq!(debts[0].debtor_name.as_deref(), Some("Alice"));
        assert_eq!(debts[0].status, DebtStatus::Pending);
    }

    #[tokio::test]
    async fn accepts_wrapped_charge_listing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/charges");
            then.status(200).json_body(json!({ "data": [{
                "id": "c1",
                "debtId": "d1",
                "amount": 5000,
                "status": "overdue",
                "dueDate": "2026-02-10",
                "installment": 2
            }]}));
        });

        let charges = client(&server).list_charges(None).await.unwrap();
        assert_eq!(charges[0].status, ChargeStatus::Overdue);
        assert_eq!(charges[0].installment, Some(2));
    }

    #[tokio::test]
    async fn maps_auth_and_server_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/stats");
            then.status(401);
        });
        server.mock(|when, then| {
            when.method(GET).path("/debts");
            then.status(503).body("maintenance");
        });

        let api = client(&server);
        assert!(matches!(api.stats().await, Err(ApiError::Unauthorized(401))));
        match api.list_debts(None).await {
            Err(ApiError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/stats");
            then.status(200).body("not json");
        });

        assert!(matches!(client(&server).stats().await, Err(ApiError::Decode(_))));
    }

    #[test]
    fn cache_keys_follow_groups() {
        assert_eq!(ApiClient::debts_key(None), QueryKey::group(CacheGroup::Debts));
        assert_eq!(
            ApiClient::charges_key(Some(ChargeStatus::Pending)).to_string(),
            "charges?status=pending"
        );
        assert_eq!(ApiClient::stats_key().group, CacheGroup::Stats);
    }
}
