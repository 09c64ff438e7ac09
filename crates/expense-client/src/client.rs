//! Typed expense API client.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::watch;

use crate::auth::{token_prefix, AuthEvent, AuthPipeline};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::models::{
    AuthResponse, Category, CategoryPayload, DashboardStats, Expense, LoginRequest,
    MessageResponse, NewExpense, PasswordResetRequest, RegisterRequest, Session, VerifyOtpRequest,
};
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, HttpTransport, Transport};

/// API paths.
pub mod endpoints {
    pub const LOGIN: &str = "/api/auth/login/";
    pub const REGISTER: &str = "/api/auth/register/";
    pub const TOKEN_REFRESH: &str = crate::auth::REFRESH_PATH;
    pub const REQUEST_PASSWORD_RESET: &str = "/api/auth/request-password-reset/";
    pub const VERIFY_OTP: &str = "/api/auth/verify-otp/";
    pub const EXPENSES: &str = "/api/expenses/";
    pub const DASHBOARD_STATS: &str = "/api/expenses/dashboard_stats/";
    pub const CATEGORIES: &str = "/api/categories/";

    pub fn expense(id: i64) -> String {
        format!("{}{}/", EXPENSES, id)
    }

    pub fn category(id: i64) -> String {
        format!("{}{}/", CATEGORIES, id)
    }
}

/// HTTP client for the expense API.
///
/// Cheap to clone; clones share the session store and the refresh gate, so
/// parallel calls cooperate on token renewal.
#[derive(Clone)]
pub struct ApiClient {
    pipeline: Arc<AuthPipeline>,
    store: Arc<dyn TokenStore>,
}

impl ApiClient {
    /// Create a client talking HTTP to `config.base_url`.
    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport), store))
    }

    /// Create a client over a custom transport.
    pub fn with_transport(transport: Arc<dyn Transport>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            pipeline: Arc::new(AuthPipeline::new(store.clone(), transport)),
            store,
        }
    }

    /// Watch authentication state; flips to [`AuthEvent::LoggedOut`] when the
    /// session is cleared.
    pub fn subscribe(&self) -> watch::Receiver<AuthEvent> {
        self.pipeline.subscribe()
    }

    pub fn session(&self) -> Result<Session> {
        self.store.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store
            .get()
            .map(|session| session.access_token.is_some())
            .unwrap_or(false)
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.pipeline.execute(request).await?.error_for_status()?.json()
    }

    async fn call_empty(&self, request: ApiRequest) -> Result<()> {
        self.pipeline.execute(request).await?.error_for_status()?;
        Ok(())
    }

    fn start_session(&self, auth: &AuthResponse) -> Result<()> {
        self.store
            .set(&auth.tokens.access, Some(&auth.tokens.refresh), Some(&auth.user))?;
        self.pipeline.publish(AuthEvent::Authenticated);
        tracing::info!(
            username = %auth.user.username,
            token = token_prefix(&auth.tokens.access),
            "Session started"
        );
        Ok(())
    }

    // Authentication

    /// Log in and persist the returned session.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        let request = ApiRequest::post(endpoints::LOGIN)
            .without_refresh()
            .json(&LoginRequest { username, password })?;
        let auth: AuthResponse = self.call(request).await?;
        self.start_session(&auth)?;
        Ok(auth)
    }

    /// Create an account and persist the returned session.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<AuthResponse> {
        let request = ApiRequest::post(endpoints::REGISTER)
            .without_refresh()
            .json(&RegisterRequest {
                username,
                email,
                password,
            })?;
        let auth: AuthResponse = self.call(request).await?;
        self.start_session(&auth)?;
        Ok(auth)
    }

    /// Forget the local session.
    pub fn logout(&self) -> Result<()> {
        self.store.clear()?;
        self.pipeline.publish(AuthEvent::LoggedOut);
        tracing::info!("Logged out");
        Ok(())
    }

    /// Ask the server to email a password-reset OTP.
    pub async fn request_password_reset(&self, email: &str) -> Result<MessageResponse> {
        let request = ApiRequest::post(endpoints::REQUEST_PASSWORD_RESET)
            .without_refresh()
            .json(&PasswordResetRequest { email })?;
        self.call(request).await
    }

    /// Set a new password using the emailed OTP.
    pub async fn verify_otp(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> Result<MessageResponse> {
        let request = ApiRequest::post(endpoints::VERIFY_OTP)
            .without_refresh()
            .json(&VerifyOtpRequest {
                email,
                otp,
                new_password,
            })?;
        self.call(request).await
    }

    // Expenses

    pub async fn list_expenses(&self) -> Result<Vec<Expense>> {
        self.call(ApiRequest::get(endpoints::EXPENSES)).await
    }

    pub async fn create_expense(&self, expense: &NewExpense) -> Result<Expense> {
        self.call(ApiRequest::post(endpoints::EXPENSES).json(expense)?)
            .await
    }

    pub async fn update_expense(&self, id: i64, expense: &NewExpense) -> Result<Expense> {
        self.call(ApiRequest::put(endpoints::expense(id)).json(expense)?)
            .await
    }

    pub async fn delete_expense(&self, id: i64) -> Result<()> {
        self.call_empty(ApiRequest::delete(endpoints::expense(id)))
            .await
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.call(ApiRequest::get(endpoints::DASHBOARD_STATS)).await
    }

    // Categories

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.call(ApiRequest::get(endpoints::CATEGORIES)).await
    }

    pub async fn create_category(&self, name: &str) -> Result<Category> {
        self.call(ApiRequest::post(endpoints::CATEGORIES).json(&CategoryPayload { name })?)
            .await
    }

    pub async fn update_category(&self, id: i64, name: &str) -> Result<Category> {
        self.call(ApiRequest::put(endpoints::category(id)).json(&CategoryPayload { name })?)
            .await
    }

    /// Rejected by the server while expenses still reference the category.
    pub async fn delete_category(&self, id: i64) -> Result<()> {
        self.call_empty(ApiRequest::delete(endpoints::category(id)))
            .await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").finish_non_exhaustive()
    }
}
