//! Connection settings and client options

use crate::error::{DispatchError, Result};
use std::time::Duration;
use url::Url;

/// Options shared by every backend call
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout applied to every HTTP request
    pub request_timeout: Option<Duration>,

    /// Schema watched by change-feed subscriptions
    pub db_schema: String,

    /// Realtime heartbeat period
    pub heartbeat_interval: Duration,

    /// Estimated kilograms of waste per collection
    pub waste_kg_per_collection: u32,

    /// Number of rows in the admin "recent collections" list
    pub recent_limit: u32,

    /// Change-feed host, when it is not served from the project URL
    pub realtime_url: Option<Url>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            db_schema: "public".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            waste_kg_per_collection: 15,
            recent_limit: 10,
            realtime_url: None,
        }
    }
}

impl ClientOptions {
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    pub fn with_db_schema(mut self, value: &str) -> Self {
        self.db_schema = value.to_string();
        self
    }

    pub fn with_heartbeat_interval(mut self, value: Duration) -> Self {
        self.heartbeat_interval = value;
        self
    }

    pub fn with_waste_kg_per_collection(mut self, value: u32) -> Self {
        self.waste_kg_per_collection = value;
        self
    }

    pub fn with_recent_limit(mut self, value: u32) -> Self {
        self.recent_limit = value;
        self
    }

    pub fn with_realtime_url(mut self, value: Url) -> Self {
        self.realtime_url = Some(value);
        self
    }
}

/// Backend location and credentials
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub url: Url,
    pub anon_key: String,
    pub options: ClientOptions,
}

impl DispatchConfig {
    /// Validates the URL and rejects an empty key.
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        if anon_key.trim().is_empty() {
            return Err(DispatchError::Config("anon_key cannot be empty".to_string()));
        }
        Ok(Self {
            url,
            anon_key: anon_key.to_string(),
            options: ClientOptions::default(),
        })
    }

    /// Reads `SUPABASE_URL` and `SUPABASE_ANON_KEY`, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let url = std::env::var("SUPABASE_URL").map_err(|_| {
            DispatchError::Config("SUPABASE_URL environment variable not found".to_string())
        })?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY").map_err(|_| {
            DispatchError::Config("SUPABASE_ANON_KEY environment variable not found".to_string())
        })?;
        Self::new(&url, &anon_key)
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }
}
