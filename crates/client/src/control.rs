//! HTTP client for the capture server's control plane.

use std::time::Duration;

use {
    reqwest::Method,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_json::Value,
    tracing::debug,
};

use crate::error::ControlError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A capture job on the server, identified by platform and room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub platform: String,
    pub rid: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize)]
struct StartRequest<'a> {
    rid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cookie: Option<&'a str>,
}

pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<Secret<String>>,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>, token: Option<Secret<String>>) -> Result<Self, ControlError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Server greeting; doubles as a reachability check.
    pub async fn welcome(&self) -> Result<String, ControlError> {
        Ok(self.request(Method::GET, "/", None::<&()>).await?.message)
    }

    pub async fn services(&self) -> Result<Vec<Service>, ControlError> {
        self.data(Method::GET, "/all", None::<&()>).await
    }

    pub async fn platform_services(&self, platform: &str) -> Result<Vec<Service>, ControlError> {
        self.data(Method::GET, &format!("/{platform}"), None::<&()>).await
    }

    pub async fn service(&self, platform: &str, rid: &str) -> Result<Service, ControlError> {
        self.data(Method::GET, &format!("/{platform}/{rid}"), None::<&()>)
            .await
    }

    pub async fn start_service(
        &self,
        platform: &str,
        rid: &str,
        cookie: Option<&str>,
    ) -> Result<Service, ControlError> {
        let body = StartRequest {
            rid,
            cookie: cookie.filter(|c| !c.is_empty()),
        };
        self.data(Method::POST, &format!("/{platform}"), Some(&body))
            .await
    }

    pub async fn stop_service(&self, platform: &str, rid: &str) -> Result<Service, ControlError> {
        self.data(Method::DELETE, &format!("/{platform}/{rid}"), None::<&()>)
            .await
    }

    async fn data<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ControlError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.request(method, path, body).await?;
        Ok(serde_json::from_value(response.data)?)
    }

    async fn request<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<ApiResponse, ControlError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}/api/v1{path}", self.base_url);
        debug!(%method, %url, "control plane request");

        let mut request = self.http.request(method, &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let bytes = request.send().await?.bytes().await?;
        let response: ApiResponse = serde_json::from_slice(&bytes)?;
        if response.code != 200 && response.code != 201 {
            return Err(ControlError::Api {
                code: response.code,
                message: response.message,
            });
        }
        Ok(response)
    }
}
