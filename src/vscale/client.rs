//! `reqwest` client for the Vscale public API.
//!
//! API documentation: <https://developers.vscale.io/documentation/api/v1/>

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::api::{
    ApiConnector, ApiFuture, CreateScaletRequest, Scalet, ScaletApi, SshKey, Task, VscaleApiError,
};
use crate::wait::{Poll, WaitError, WaitPolicy, poll_until};

/// Production API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.vscale.io/v1";

/// Environment variable overriding [`DEFAULT_API_URL`].
pub const API_URL_ENV: &str = "VSCALE_API_URL";

const TOKEN_HEADER: &str = "X-Token";
const TASK_HEADER: &str = "Vscale-Task-Id";
const ERROR_HEADER: &str = "Vscale-Error-Message";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pacing for provider task completion.
pub const TASK_WAIT: WaitPolicy = WaitPolicy::new(Duration::from_secs(1), Duration::from_secs(600));

#[derive(Serialize)]
struct SshKeyRequest<'a> {
    key: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct ScaletActionRequest {
    id: String,
}

/// Authenticated Vscale API client.
#[derive(Clone, Debug)]
pub struct VscaleClient {
    http: Client,
    base_url: String,
    token: String,
    task_wait: WaitPolicy,
    cancel: CancellationToken,
}

impl VscaleClient {
    /// Builds a client for `base_url` authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`VscaleApiError::InvalidBaseUrl`] when the URL does not parse
    /// or the HTTP client cannot be initialised.
    pub fn new(token: impl Into<String>, base_url: &str) -> Result<Self, VscaleApiError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        Url::parse(trimmed).map_err(|err| VscaleApiError::InvalidBaseUrl {
            url: base_url.to_owned(),
            message: err.to_string(),
        })?;
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| VscaleApiError::InvalidBaseUrl {
                url: base_url.to_owned(),
                message: err.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: trimmed.to_owned(),
            token: token.into(),
            task_wait: TASK_WAIT,
            cancel: CancellationToken::new(),
        })
    }

    /// Overrides the pacing used while waiting for provider tasks.
    #[must_use]
    pub const fn with_task_wait(mut self, policy: WaitPolicy) -> Self {
        self.task_wait = policy;
        self
    }

    /// Stops task waits when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!(%method, url, "vscale request");
        self.http
            .request(method, url)
            .header(TOKEN_HEADER, &self.token)
    }

    async fn send(&self, builder: RequestBuilder, url: &str) -> Result<Response, VscaleApiError> {
        let response = builder
            .send()
            .await
            .map_err(|err| VscaleApiError::Transport {
                url: url.to_owned(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let header_message = error_header(response.headers());
        let body = response.text().await.unwrap_or_default();
        let message = header_message
            .or_else(|| Some(body.trim().to_owned()).filter(|text| !text.is_empty()))
            .unwrap_or_else(|| status.to_string());
        warn!(url, status = status.as_u16(), %message, "vscale API error");
        Err(VscaleApiError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(
        response: Response,
        url: &str,
    ) -> Result<T, VscaleApiError> {
        let body = response
            .bytes()
            .await
            .map_err(|err| VscaleApiError::Transport {
                url: url.to_owned(),
                message: err.to_string(),
            })?;
        serde_json::from_slice(&body).map_err(|err| VscaleApiError::Decode {
            url: url.to_owned(),
            message: err.to_string(),
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, VscaleApiError> {
        let url = self.url(path);
        let response = self.send(self.request(Method::GET, &url), &url).await?;
        Self::decode(response, &url).await
    }

    /// Sends a mutating request and, when the provider started a task,
    /// waits for it before decoding the response.
    async fn mutate<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, VscaleApiError>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let url = self.url(path);
        let mut builder = self.request(method, &url);
        if let Some(payload) = body {
            builder = builder.json(payload);
        }
        let response = self.send(builder, &url).await?;
        let task_id = task_header(response.headers());
        let value = Self::decode(response, &url).await?;
        if let Some(id) = task_id {
            self.wait_task(&id).await?;
        }
        Ok(value)
    }

    async fn wait_task(&self, task_id: &str) -> Result<(), VscaleApiError> {
        let owned_path = format!("/tasks/{task_id}");
        let path = owned_path.as_str();
        let action = format!("task {task_id}");
        let outcome = poll_until(&action, self.task_wait, &self.cancel, move || async move {
            let task: Task = self.fetch(path).await?;
            if task.error == Some(true) {
                return Err(VscaleApiError::TaskFailed {
                    task_id: task.id,
                    method: task.method,
                });
            }
            Ok(if task.done { Poll::Ready(()) } else { Poll::Pending })
        })
        .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(WaitError::Probe(err)) => Err(err),
            Err(other) => Err(VscaleApiError::TaskWait {
                task_id: task_id.to_owned(),
                message: other.to_string(),
            }),
        }
    }

    async fn scalet_action(&self, ctid: i64, action: &str) -> Result<Scalet, VscaleApiError> {
        let body = ScaletActionRequest {
            id: ctid.to_string(),
        };
        self.mutate(
            Method::PATCH,
            &format!("/scalets/{ctid}/{action}"),
            Some(&body),
        )
        .await
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn error_header(headers: &HeaderMap) -> Option<String> {
    header_value(headers, ERROR_HEADER)
}

fn task_header(headers: &HeaderMap) -> Option<String> {
    header_value(headers, TASK_HEADER)
}

impl ScaletApi for VscaleClient {
    fn create_ssh_key<'a>(&'a self, key: &'a str, name: &'a str) -> ApiFuture<'a, SshKey> {
        Box::pin(async move {
            let body = SshKeyRequest {
                key: key.trim(),
                name,
            };
            self.mutate(Method::POST, "/sshkeys", Some(&body)).await
        })
    }

    fn remove_ssh_key(&self, id: i64) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let url = self.url(&format!("/sshkeys/{id}"));
            self.send(self.request(Method::DELETE, &url), &url).await?;
            Ok(())
        })
    }

    fn create_scalet<'a>(&'a self, request: &'a CreateScaletRequest) -> ApiFuture<'a, Scalet> {
        Box::pin(async move { self.mutate(Method::POST, "/scalets", Some(request)).await })
    }

    fn get_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move { self.fetch(&format!("/scalets/{ctid}")).await })
    }

    fn start_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move { self.scalet_action(ctid, "start").await })
    }

    fn stop_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move { self.scalet_action(ctid, "stop").await })
    }

    fn restart_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move { self.scalet_action(ctid, "restart").await })
    }

    fn remove_scalet(&self, ctid: i64) -> ApiFuture<'_, Scalet> {
        Box::pin(async move {
            self.mutate::<Scalet, ()>(Method::DELETE, &format!("/scalets/{ctid}"), None)
                .await
        })
    }
}

/// Connector producing [`VscaleClient`]s against a fixed endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpConnector {
    base_url: String,
    task_wait: WaitPolicy,
}

impl HttpConnector {
    /// Connector for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            task_wait: TASK_WAIT,
        }
    }

    /// Connector for [`API_URL_ENV`], falling back to [`DEFAULT_API_URL`].
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = std::env::var(API_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned());
        Self::new(base_url)
    }

    /// Overrides the pacing used while waiting for provider tasks.
    #[must_use]
    pub const fn with_task_wait(mut self, policy: WaitPolicy) -> Self {
        self.task_wait = policy;
        self
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl ApiConnector for HttpConnector {
    type Api = VscaleClient;

    fn connect(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<Self::Api, VscaleApiError> {
        Ok(VscaleClient::new(access_token, &self.base_url)?
            .with_task_wait(self.task_wait)
            .with_cancellation(cancel.clone()))
    }
}
