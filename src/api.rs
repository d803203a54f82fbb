use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rand::{Rng, rng};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::time;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Settings;
use crate::models::{Address, CheckResult, CheckedSystem, Customer, ModelError, parse_systems};

const SESSION_EXPIRED_MESSAGE: &str = "Session expired.";

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error("session expired, please log in again")]
    SessionExpired,
    #[error("invalid account name and/or password")]
    InvalidCredentials,
    #[error("administrative tasks are currently running on the system")]
    Busy,
    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Decode(#[from] ModelError),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(ModelError::Json(e))
    }
}

/// Cookies handed out by the session service at login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Session {
    pub(crate) account: String,
    pub(crate) cookies: Vec<String>,
    pub(crate) created: DateTime<Utc>,
}

impl Session {
    fn cookie_header(&self) -> String {
        self.cookies.join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct DeployRequest {
    pub(crate) system: u32,
    pub(crate) customer: u32,
    pub(crate) address: Address,
    pub(crate) connection: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) weather: Option<String>,
    pub(crate) annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AdminAction {
    Beep(u32),
    Reboot(u32),
    Application { system: u32, disable: bool },
    Sync(u32),
    Deploy(DeployRequest),
}

impl AdminAction {
    fn endpoint(&self) -> &'static str {
        match self {
            AdminAction::Beep(_) => "administer/beep",
            AdminAction::Reboot(_) => "administer/reboot",
            AdminAction::Application { .. } => "administer/application",
            AdminAction::Sync(_) => "administer/sync",
            AdminAction::Deploy(_) => "administer/deploy",
        }
    }

    fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(match self {
            AdminAction::Beep(system) | AdminAction::Reboot(system) | AdminAction::Sync(system) => {
                json!({ "system": system })
            }
            AdminAction::Application {
                system,
                disable: false,
            } => json!({ "system": system }),
            AdminAction::Application {
                system,
                disable: true,
            } => json!({ "system": system, "disable": true }),
            AdminAction::Deploy(request) => serde_json::to_value(request)?,
        })
    }

    pub(crate) fn system(&self) -> u32 {
        match self {
            AdminAction::Beep(system)
            | AdminAction::Reboot(system)
            | AdminAction::Sync(system)
            | AdminAction::Application { system, .. } => *system,
            AdminAction::Deploy(request) => request.system,
        }
    }
}

pub(crate) struct ApiClient {
    client: Client,
    base_url: String,
    session_url: Url,
    session: Option<Session>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ApiClient {
    pub(crate) fn new(settings: &Settings, session: Option<Session>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            session_url: Url::parse(&settings.session_url)?,
            session,
            max_attempts: settings.max_fetch_attempts.max(1),
            retry_delay: Duration::from_secs(1),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(Url::parse(&format!("{}/{}", self.base_url, path))?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session {
            Some(session) if !session.cookies.is_empty() => {
                request.header(COOKIE, session.cookie_header())
            }
            _ => request,
        }
    }

    async fn error_for_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "No body".to_string());
        if status == StatusCode::UNAUTHORIZED || body.contains(SESSION_EXPIRED_MESSAGE) {
            return Err(ApiError::SessionExpired);
        }
        Err(ApiError::Status { status, body })
    }

    /// GETs are idempotent, so transport errors and 5xx are retried with backoff.
    async fn get_text(&self, url: Url, headers: &[(&str, String)]) -> Result<String, ApiError> {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            let mut request = self.authorized(self.client.get(url.clone()));
            for (name, value) in headers {
                request = request.header(*name, value);
            }

            let error = match request.send().await {
                Ok(response) => match Self::error_for_status(response).await {
                    Ok(response) => return Ok(response.text().await?),
                    Err(e) => e,
                },
                Err(e) => ApiError::Transport(e),
            };

            if !error.is_retryable() || attempts >= self.max_attempts {
                return Err(error);
            }

            warn!(attempt = attempts, url = %url, error = %error, "request failed, retrying");
            time::sleep(delay).await;
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            let jitter_ms: u64 = rng().random_range(0..=delay_ms.min(1000));
            delay = delay
                .saturating_mul(2)
                .saturating_add(Duration::from_millis(jitter_ms));
        }
    }

    pub(crate) async fn login(&mut self, account: &str, passwd: &str) -> Result<Session, ApiError> {
        let response = self
            .client
            .post(self.session_url.clone())
            .json(&json!({ "account": account, "passwd": passwd }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::InvalidCredentials);
        }
        let response = Self::error_for_status(response).await?;

        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .map(|pair| pair.trim().to_string())
            .filter(|pair| !pair.is_empty())
            .collect();
        if cookies.is_empty() {
            warn!(account = %account, "login succeeded but no session cookie was set");
        }

        let session = Session {
            account: account.to_string(),
            cookies,
            created: Utc::now(),
        };
        info!(account = %account, "logged in");
        self.session = Some(session.clone());
        Ok(session)
    }

    pub(crate) async fn logout(&mut self) -> Result<(), ApiError> {
        let response = self
            .authorized(self.client.delete(self.session_url.clone()))
            .send()
            .await?;
        self.session = None;
        match Self::error_for_status(response).await {
            Ok(_) | Err(ApiError::SessionExpired) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Returns the parsed systems together with the raw body for caching.
    pub(crate) async fn get_stats(&self) -> Result<(Vec<CheckedSystem>, String), ApiError> {
        let raw = self.get_text(self.endpoint("stats")?, &[]).await?;
        let systems = parse_systems(&raw)?;
        debug!(systems = systems.len(), "fetched stats");
        Ok((systems, raw))
    }

    pub(crate) async fn get_system_details(
        &self,
        system: u32,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<CheckResult>, ApiError> {
        let headers = [
            ("from", from.format("%Y-%m-%d").to_string()),
            ("until", until.format("%Y-%m-%d").to_string()),
        ];
        let raw = self
            .get_text(self.endpoint(&format!("details/{}", system))?, &headers)
            .await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub(crate) async fn check_system(&self, system: u32) -> Result<CheckResult, ApiError> {
        let raw = self
            .get_text(self.endpoint(&format!("check/{}", system))?, &[])
            .await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Customers the logged-in account may deploy systems to.
    pub(crate) async fn get_customers(&self) -> Result<Vec<Customer>, ApiError> {
        let raw = self.get_text(self.endpoint("customers")?, &[]).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub(crate) async fn get_types(&self) -> Result<Vec<String>, ApiError> {
        let raw = self.get_text(self.endpoint("types")?, &[]).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Administrative actions are sent exactly once.
    pub(crate) async fn administer(&self, action: &AdminAction) -> Result<(), ApiError> {
        let url = self.endpoint(action.endpoint())?;
        let response = self
            .authorized(self.client.post(url))
            .json(&action.payload()?)
            .send()
            .await?;

        match Self::error_for_status(response).await {
            Ok(_) => {
                info!(system = action.system(), action = action.endpoint(), "action accepted");
                Ok(())
            }
            Err(ApiError::Status { status, .. })
                if status == StatusCode::SERVICE_UNAVAILABLE
                    && matches!(action, AdminAction::Reboot(_)) =>
            {
                Err(ApiError::Busy)
            }
            Err(e) => Err(e),
        }
    }
}
