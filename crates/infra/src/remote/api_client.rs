//! REST client for the FinTrack server
//!
//! Implements the sync engine's [`RemoteClient`] port and the connectivity
//! monitor's [`ReachabilityProbe`] over the shared [`HttpClient`].
//!
//! - Bearer token and its user captured on login, dropped on logout
//! - `Idempotency-Key` header on replayed mutations
//! - HTTP statuses classified into [`SyncError`] variants

use std::time::Duration;

use async_trait::async_trait;
use fintrack_core::connectivity::ReachabilityProbe;
use fintrack_core::sync::{RemoteClient, SyncError};
use fintrack_domain::constants::{BEARER_PREFIX, IDEMPOTENCY_KEY_HEADER};
use fintrack_domain::{
    Category, Config, Credentials, LoginResponse, RegisterRequest, RegisterResponse, Transaction,
    TransactionFilter,
};
use parking_lot::RwLock;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::http::HttpClient;

/// Configuration for [`ApiClient`]
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL including the `/api` prefix, e.g. `http://localhost:8080/api`
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Timeout for data calls
    pub request_timeout: Duration,
    /// Timeout for the reachability probe
    pub probe_timeout: Duration,
    /// Transport-level attempts per call. Replay has its own retry budget,
    /// so this stays at 1 unless a caller opts in.
    pub max_attempts: usize,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ApiClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.remote.base_url.clone(),
            connect_timeout: config.remote.connect_timeout(),
            request_timeout: config.remote.request_timeout(),
            probe_timeout: config.connectivity.probe_timeout(),
            max_attempts: 1,
        }
    }
}

/// Token issued by a login together with the user it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    pub token: String,
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP adapter for the remote ledger API
pub struct ApiClient {
    http: HttpClient,
    config: ApiClientConfig,
    session: RwLock<Option<ClientSession>>,
}

impl ApiClient {
    /// Create a client with the given configuration
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be built
    pub fn new(config: ApiClientConfig) -> Result<Self, SyncError> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .max_attempts(config.max_attempts)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HttpClient: {e}")))?;

        Ok(Self { http, config, session: RwLock::new(None) })
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Bearer token from the last successful login, if any
    pub fn token(&self) -> Option<String> {
        self.session.read().as_ref().map(|session| session.token.clone())
    }

    pub fn session(&self) -> Option<ClientSession> {
        self.session.read().clone()
    }

    /// Install a session obtained elsewhere (e.g. persisted across restarts)
    pub fn restore_session(&self, session: Option<ClientSession>) {
        *self.session.write() = session;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.session.read().as_ref() {
            Some(session) => {
                builder.header(AUTHORIZATION, format!("{BEARER_PREFIX}{}", session.token))
            }
            None => builder,
        }
    }

    fn mutation(&self, method: Method, path: &str, idempotency_key: Option<&str>) -> RequestBuilder {
        let builder = self.request(method, path);
        match idempotency_key {
            Some(key) => builder.header(IDEMPOTENCY_KEY_HEADER, key),
            None => builder,
        }
    }

    /// Send and turn any non-2xx status into a classified error
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, SyncError> {
        let response = self
            .http
            .send(builder)
            .await
            .map_err(|err| transport_error(&err, self.config.request_timeout))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.error)
            .unwrap_or(body);
        let err = status_error(status, &message);
        debug!(%status, error = %err, "remote call failed");
        Err(err)
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, SyncError> {
        let response = self.execute(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Client(format!("Failed to parse response: {e}")))
    }
}

#[async_trait]
impl RemoteClient for ApiClient {
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, SyncError> {
        let response: LoginResponse = self
            .execute_json(self.http.request(Method::POST, self.url("/auth/login")).json(credentials))
            .await?;

        *self.session.write() =
            Some(ClientSession { token: response.token.clone(), user_id: response.user_id });
        info!(user_id = response.user_id, "logged in");
        Ok(response)
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, SyncError> {
        self.execute_json(self.http.request(Method::POST, self.url("/auth/register")).json(request))
            .await
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<(), SyncError> {
        let builder = self.request(Method::POST, "/auth/logout");
        // The token is forgotten whether or not the server heard about it
        let had_session = self.session.write().take().is_some();
        if !had_session {
            return Ok(());
        }

        self.execute(builder).await?;
        info!("logged out");
        Ok(())
    }

    fn session_user(&self) -> Option<i64> {
        self.session.read().as_ref().map(|session| session.user_id)
    }

    #[instrument(skip(self))]
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, SyncError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(start) = filter.start_date {
            query.push(("startDate", start.to_string()));
        }
        if let Some(end) = filter.end_date {
            query.push(("endDate", end.to_string()));
        }
        if let Some(category_id) = filter.category_id {
            query.push(("categoryId", category_id.to_string()));
        }

        self.execute_json(self.request(Method::GET, "/transactions").query(&query)).await
    }

    #[instrument(skip(self, transaction))]
    async fn create_transaction(
        &self,
        transaction: &Transaction,
        idempotency_key: Option<&str>,
    ) -> Result<Transaction, SyncError> {
        self.execute_json(
            self.mutation(Method::POST, "/transactions", idempotency_key).json(transaction),
        )
        .await
    }

    #[instrument(skip(self, transaction), fields(id = ?transaction.id()))]
    async fn update_transaction(
        &self,
        transaction: &Transaction,
        idempotency_key: Option<&str>,
    ) -> Result<Transaction, SyncError> {
        self.execute_json(
            self.mutation(Method::PUT, "/transactions", idempotency_key).json(transaction),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_transaction(
        &self,
        id: i64,
        idempotency_key: Option<&str>,
    ) -> Result<(), SyncError> {
        self.execute(self.mutation(Method::DELETE, &format!("/transactions/{id}"), idempotency_key))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> Result<Vec<Category>, SyncError> {
        self.execute_json(self.request(Method::GET, "/categories")).await
    }

    #[instrument(skip(self, category), fields(name = %category.name))]
    async fn create_category(
        &self,
        category: &Category,
        idempotency_key: Option<&str>,
    ) -> Result<Category, SyncError> {
        self.execute_json(self.mutation(Method::POST, "/categories", idempotency_key).json(category))
            .await
    }

    #[instrument(skip(self, category), fields(id = ?category.id))]
    async fn update_category(
        &self,
        category: &Category,
        idempotency_key: Option<&str>,
    ) -> Result<Category, SyncError> {
        self.execute_json(self.mutation(Method::PUT, "/categories", idempotency_key).json(category))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_category(&self, id: i64, idempotency_key: Option<&str>) -> Result<(), SyncError> {
        self.execute(self.mutation(Method::DELETE, &format!("/categories/{id}"), idempotency_key))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReachabilityProbe for ApiClient {
    async fn is_reachable(&self) -> bool {
        let builder = self.request(Method::GET, "/categories").timeout(self.config.probe_timeout);
        match self.http.send(builder).await {
            // Any answer, even 401, proves the server is there
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "reachability probe failed");
                false
            }
        }
    }
}

/// Classify a response status
fn status_error(status: StatusCode, message: &str) -> SyncError {
    let detail = if message.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), message)
    };

    match status.as_u16() {
        401 | 403 => SyncError::Auth(detail),
        409 => SyncError::Conflict(detail),
        429 => SyncError::RateLimit(detail),
        400..=499 => SyncError::Client(detail),
        500..=599 => SyncError::Server(detail),
        _ => {
            warn!(%status, "unexpected HTTP status");
            SyncError::Server(detail)
        }
    }
}

/// Classify a transport failure
fn transport_error(err: &reqwest::Error, timeout: Duration) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout(timeout)
    } else if err.is_connect() {
        SyncError::Network(format!("connection failed: {err}"))
    } else if err.is_builder() {
        SyncError::Config(format!("invalid request: {err}"))
    } else {
        SyncError::Network(err.to_string())
    }
}
