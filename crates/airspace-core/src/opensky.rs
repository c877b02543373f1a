//! HTTP client for the OpenSky state-vector API.

use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::{header::ACCEPT, header::RETRY_AFTER, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Geographic region polled every tick, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BoundingBox {
    pub lamin: f64,
    pub lomin: f64,
    pub lamax: f64,
    pub lomax: f64,
}

impl Default for BoundingBox {
    /// Utah and the surrounding airspace.
    fn default() -> Self {
        Self {
            lamin: 37.0,
            lomin: -112.0,
            lamax: 49.0,
            lomax: -110.0,
        }
    }
}

impl BoundingBox {
    pub fn new(lamin: f64, lomin: f64, lamax: f64, lomax: f64) -> Self {
        Self {
            lamin,
            lomin,
            lamax,
            lomax,
        }
    }

    /// Reject out-of-range or inverted boxes.
    pub fn validate(&self) -> Result<(), String> {
        for (name, lat) in [("lamin", self.lamin), ("lamax", self.lamax)] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(format!("{} {} is outside [-90, 90]", name, lat));
            }
        }
        for (name, lon) in [("lomin", self.lomin), ("lomax", self.lomax)] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(format!("{} {} is outside [-180, 180]", name, lon));
            }
        }
        if self.lamin >= self.lamax {
            return Err(format!(
                "Bounding box is inverted: lamin {} >= lamax {}",
                self.lamin, self.lamax
            ));
        }
        if self.lomin >= self.lomax {
            return Err(format!(
                "Bounding box is inverted: lomin {} >= lomax {}",
                self.lomin, self.lomax
            ));
        }
        Ok(())
    }

    /// Query parameters in shortest decimal form (`37`, not `37.0`).
    fn query_pairs(&self) -> [(&'static str, String); 4] {
        [
            ("lamin", self.lamin.to_string()),
            ("lomin", self.lomin.to_string()),
            ("lamax", self.lamax.to_string()),
            ("lomax", self.lomax.to_string()),
        ]
    }
}

/// Body of a `states/all` response.
#[derive(Debug, Clone, Deserialize)]
pub struct StatesResponse {
    /// Snapshot time, epoch seconds.
    pub time: i64,
    /// Positional arrays; `null` when nothing is in the box.
    pub states: Option<Vec<Vec<Value>>>,
}

impl StatesResponse {
    pub fn states(&self) -> &[Vec<Value>] {
        self.states.as_deref().unwrap_or(&[])
    }
}

/// Anything that can return a snapshot of the region.
#[async_trait]
pub trait StateVectorSource: Send + Sync {
    async fn fetch_states(
        &self,
        bbox: &BoundingBox,
        token: &str,
    ) -> Result<StatesResponse, ApiError>;
}

/// OpenSky REST client.
pub struct OpenSkyClient {
    client: Client,
    api_url: String,
}

impl OpenSkyClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("airspace/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl StateVectorSource for OpenSkyClient {
    async fn fetch_states(
        &self,
        bbox: &BoundingBox,
        token: &str,
    ) -> Result<StatesResponse, ApiError> {
        debug!(url = %self.api_url, ?bbox, "Fetching state vectors");

        let response = self
            .client
            .get(&self.api_url)
            .query(&bbox.query_pairs())
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                serde_json::from_slice(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(ApiError::RateLimited { retry_after })
            }
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(ApiError::Unauthorized {
                    status: status.as_u16(),
                })
            }
            status => Err(ApiError::Status {
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> OpenSkyClient {
        OpenSkyClient::new(
            format!("{}/api/states/all", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_bounding_box_validation() {
        assert!(BoundingBox::default().validate().is_ok());
        assert!(BoundingBox::new(49.0, -112.0, 37.0, -110.0).validate().is_err());
        assert!(BoundingBox::new(37.0, -110.0, 49.0, -112.0).validate().is_err());
        assert!(BoundingBox::new(-95.0, -112.0, 49.0, -110.0).validate().is_err());
        assert!(BoundingBox::new(37.0, -190.0, 49.0, -110.0).validate().is_err());
    }

    #[test]
    fn test_query_pairs_format() {
        let pairs = BoundingBox::new(45.8, 5.9, 47.8, -10.5).query_pairs();
        assert_eq!(pairs[0], ("lamin", "45.8".to_string()));
        assert_eq!(pairs[3], ("lomax", "-10.5".to_string()));

        let pairs = BoundingBox::default().query_pairs();
        assert_eq!(pairs[0], ("lamin", "37".to_string()));
        assert_eq!(pairs[1], ("lomin", "-112".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_sends_bbox_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/all"))
            .and(query_param("lamin", "37"))
            .and(query_param("lomin", "-112"))
            .and(query_param("lamax", "49"))
            .and(query_param("lomax", "-110"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "time": 1_700_000_000,
                "states": [["a1b2c3", "UAL1", "US", 1, 2, null, null, null, false,
                            null, null, null, null, null, null, false, 0]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let response = client
            .fetch_states(&BoundingBox::default(), "tok-1")
            .await
            .unwrap();

        assert_eq!(response.time, 1_700_000_000);
        assert_eq!(response.states().len(), 1);
    }

    #[tokio::test]
    async fn test_null_states_is_empty_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"time": 5, "states": null})),
            )
            .mount(&server)
            .await;

        let response = client_for(&server)
            .await
            .fetch_states(&BoundingBox::default(), "t")
            .await
            .unwrap();
        assert!(response.states().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .fetch_states(&BoundingBox::default(), "t")
            .await
            .unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let bbox = BoundingBox::default();

        let err = client.fetch_states(&bbox, "stale").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { status: 401 }));

        let err = client.fetch_states(&bbox, "fresh").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .fetch_states(&BoundingBox::default(), "t")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }
}
