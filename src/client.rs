//! Shared handle over the auth, rows and feed clients

use crate::config::{ClientOptions, DispatchConfig};
use crate::error::{DispatchError, Result};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use waste_dispatch_auth::{Auth, AuthOptions, Session};
use waste_dispatch_postgrest::PostgrestClient;
use waste_dispatch_realtime::{RealtimeClient, RealtimeClientOptions};

pub(crate) const PROFILES: &str = "profiles";
pub(crate) const COLLECTION_REQUESTS: &str = "collection_requests";

/// Entry point for every dispatch operation.
///
/// Cheap to clone: the HTTP pool, session and socket are shared.
#[derive(Clone)]
pub struct DispatchClient {
    config: DispatchConfig,
    http: reqwest::Client,
    auth: Arc<Auth>,
    realtime: RealtimeClient,
}

impl DispatchClient {
    pub fn new(config: DispatchConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| {
            DispatchError::Initialization(format!("Failed to create HTTP client: {}", e))
        })?;

        let base = config.url.as_str().trim_end_matches('/');
        let auth = Auth::new(base, &config.anon_key, http.clone(), AuthOptions::default());
        let realtime_base = match &config.options.realtime_url {
            Some(url) => url.as_str().trim_end_matches('/'),
            None => base,
        };
        let realtime = RealtimeClient::new_with_options(
            realtime_base,
            &config.anon_key,
            RealtimeClientOptions {
                heartbeat_interval: config.options.heartbeat_interval,
            },
        );

        info!(url = %base, "dispatch client initialized");

        Ok(Self {
            config,
            http,
            auth: Arc::new(auth),
            realtime,
        })
    }

    /// Build a client from `SUPABASE_URL` / `SUPABASE_ANON_KEY`
    pub fn from_env() -> Result<Self> {
        Self::new(DispatchConfig::from_env()?)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.config.options
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }

    /// Current session or `NotAuthenticated`
    pub fn session(&self) -> Result<Session> {
        self.auth.get_session().ok_or(DispatchError::NotAuthenticated)
    }

    pub fn current_user_id(&self) -> Result<Uuid> {
        let session = self.session()?;
        Ok(Uuid::parse_str(&session.user.id)?)
    }

    /// Query builder on `table`, authenticated as the signed-in user
    pub fn from(&self, table: &str) -> Result<PostgrestClient> {
        let session = self.session()?;
        Ok(PostgrestClient::new(
            self.config.url.as_str(),
            &self.config.anon_key,
            table,
            self.http.clone(),
        )
        .with_auth(&session.access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_access_requires_session() {
        let config = DispatchConfig::new("https://abc.supabase.co", "anon").unwrap();
        let client = DispatchClient::new(config).unwrap();
        assert!(matches!(
            client.from("profiles"),
            Err(DispatchError::NotAuthenticated)
        ));
        assert!(matches!(
            client.current_user_id(),
            Err(DispatchError::NotAuthenticated)
        ));
    }

    #[test]
    fn realtime_host_can_be_overridden() {
        let feed = url::Url::parse("http://127.0.0.1:4000/").unwrap();
        let config = DispatchConfig::new("https://abc.supabase.co", "anon")
            .unwrap()
            .with_options(ClientOptions::default().with_realtime_url(feed));
        let client = DispatchClient::new(config).unwrap();
        assert_eq!(
            client.realtime().endpoint().unwrap().as_str(),
            "ws://127.0.0.1:4000/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }
}
