//! Credential authentication for the waste-dispatch backend
//!
//! Thin client over the `/auth/v1` endpoints: sign up with profile metadata,
//! password sign-in, sign-out, and user lookup. The protocol itself lives on
//! the backend; this crate only shapes requests and keeps the current session.

use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors raised by the auth client
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,
}

/// Authenticated user as returned by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Access/refresh token pair plus the user it belongs to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub user: User,
}

/// Result of a sign-up call.
///
/// Projects with email confirmation enabled answer with the bare user and no
/// tokens; otherwise a full session comes back.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(Session),
    Pending(User),
}

impl SignUpResponse {
    pub fn user(&self) -> &User {
        match self {
            Self::Session(session) => &session.user,
            Self::Pending(user) => user,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Session(session) => Some(session),
            Self::Pending(_) => None,
        }
    }
}

/// Client options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Keep the session returned by sign-in/sign-up for later calls
    pub persist_session: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
        }
    }
}

/// Auth client
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<Session>>>,
}

impl Auth {
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
        }
    }

    /// Base URL this client talks to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Register a new account. `data` is stored as user metadata, which the
    /// backend trigger copies into the `profiles` row.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: serde_json::Value,
    ) -> Result<SignUpResponse, AuthError> {
        let url = format!("{}/auth/v1/signup", self.url);

        let payload = serde_json::json!({
            "email": email,
            "password": password,
            "data": data,
        });

        debug!("POST {}", url);
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            warn!("sign-up rejected: {}", error_text);
            return Err(AuthError::ApiError(error_text));
        }

        let body: SignUpResponse = response.json().await?;
        if let Some(session) = body.session() {
            self.store_session(session.clone());
        }
        info!("signed up user {}", body.user().id);

        Ok(body)
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.url);

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        debug!("POST {}", url);
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            warn!("sign-in rejected: {}", error_text);
            return Err(AuthError::ApiError(error_text));
        }

        let session: Session = response.json().await?;
        self.store_session(session.clone());
        info!("signed in user {}", session.user.id);

        Ok(session)
    }

    /// Current session, if any
    pub fn get_session(&self) -> Option<Session> {
        let guard = self
            .current_session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    /// Replace the current session
    pub fn set_session(&self, session: Option<Session>) {
        let mut guard = self
            .current_session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = session;
    }

    /// Access token of the current session
    pub fn access_token(&self) -> Option<String> {
        self.get_session().map(|s| s.access_token)
    }

    /// Fetch the user behind the current session
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;

        let url = format!("{}/auth/v1/user", self.url);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::ApiError(error_text));
        }

        Ok(response.json().await?)
    }

    /// Sign out and drop the local session
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;

        let url = format!("{}/auth/v1/logout", self.url);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::ApiError(error_text));
        }

        self.set_session(None);
        info!("signed out user {}", session.user.id);

        Ok(())
    }

    fn store_session(&self, session: Session) {
        if self.options.persist_session {
            self.set_session(Some(session));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_body() -> serde_json::Value {
        json!({
            "access_token": "test_access_token",
            "refresh_token": "test_refresh_token",
            "expires_in": 3600,
            "token_type": "bearer",
            "user": {
                "id": "test_user_id",
                "email": "test@example.com",
                "phone": null,
                "app_metadata": {},
                "user_metadata": {},
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            }
        })
    }

    #[tokio::test]
    async fn sign_in_stores_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "test_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let auth = Auth::new(
            &mock_server.uri(),
            "test_key",
            Client::new(),
            AuthOptions::default(),
        );

        let session = auth
            .sign_in_with_password("test@example.com", "password123")
            .await
            .unwrap();

        assert_eq!(session.access_token, "test_access_token");
        assert_eq!(auth.access_token().as_deref(), Some("test_access_token"));
    }

    #[tokio::test]
    async fn sign_in_failure_is_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&mock_server)
            .await;

        let auth = Auth::new(
            &mock_server.uri(),
            "test_key",
            Client::new(),
            AuthOptions::default(),
        );

        let result = auth.sign_in_with_password("x@example.com", "bad").await;
        match result {
            Err(AuthError::ApiError(body)) => assert!(body.contains("invalid_grant")),
            other => panic!("expected ApiError, got {:?}", other),
        }
        assert!(auth.get_session().is_none());
    }

    #[tokio::test]
    async fn sign_up_sends_metadata_and_accepts_pending_user() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(body_partial_json(json!({
                "email": "new@example.com",
                "data": { "full_name": "Ama K.", "phone": "+22990000000" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "new_user_id",
                "email": "new@example.com",
                "phone": null
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let auth = Auth::new(
            &mock_server.uri(),
            "test_key",
            Client::new(),
            AuthOptions::default(),
        );

        let response = auth
            .sign_up(
                "new@example.com",
                "secret",
                json!({ "full_name": "Ama K.", "phone": "+22990000000" }),
            )
            .await
            .unwrap();

        assert_eq!(response.user().id, "new_user_id");
        assert!(response.session().is_none());
        assert!(auth.get_session().is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("Authorization", "Bearer test_access_token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let auth = Auth::new(
            &mock_server.uri(),
            "test_key",
            Client::new(),
            AuthOptions::default(),
        );
        let session: Session = serde_json::from_value(session_body()).unwrap();
        auth.set_session(Some(session));

        auth.sign_out().await.unwrap();
        assert!(auth.get_session().is_none());
    }

    #[test]
    fn sign_out_without_session_fails() {
        tokio_test::block_on(async {
            let auth = Auth::new(
                "https://example.supabase.co",
                "test_key",
                Client::new(),
                AuthOptions::default(),
            );
            assert!(matches!(
                auth.sign_out().await,
                Err(AuthError::MissingSession)
            ));
        });
    }
}
