//! Row access for the waste-dispatch backend
//!
//! A small PostgREST client: equality and set-membership filters, ordering,
//! limits, exact counts, and insert/update/upsert returning the affected rows.
//!
//! ```no_run
//! # async fn demo() -> Result<(), waste_dispatch_postgrest::PostgrestError> {
//! use waste_dispatch_postgrest::{PostgrestClient, SortOrder};
//!
//! let rows: Vec<serde_json::Value> = PostgrestClient::new(
//!     "https://project.supabase.co",
//!     "anon-key",
//!     "collection_requests",
//!     reqwest::Client::new(),
//! )
//! .select("*")
//! .eq("status", "pending")
//! .order("created_at", SortOrder::Descending)
//! .execute()
//! .await?;
//! # Ok(())
//! # }
//! ```

use log::{debug, warn};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// Error body returned by PostgREST
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Missing or malformed Content-Range header: {0}")]
    CountUnavailable(String),
}

impl PostgrestError {
    fn from_response(status: StatusCode, body: String) -> Self {
        match serde_json::from_str::<PostgrestApiErrorDetails>(&body) {
            Ok(details) => PostgrestError::ApiError { details, status },
            Err(_) => PostgrestError::UnparsedApiError {
                message: body,
                status,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Query builder bound to one table
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    api_key: String,
    table: String,
    http_client: Client,
    auth_token: Option<String>,
    select: Option<String>,
    // ordered pairs; a column may carry several filters (e.g. gte + lte)
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<u32>,
    on_conflict: Option<String>,
}

impl PostgrestClient {
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
            http_client,
            auth_token: None,
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
            on_conflict: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Send requests with the user's bearer token instead of the anon key
    pub fn with_auth(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    /// Columns to return. Embedded resources such as
    /// `*,profiles:user_id(full_name,phone)` are passed through unchanged.
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn eq(self, column: &str, value: &str) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: &str) -> Self {
        self.filter(column, "neq", value)
    }

    pub fn gte(self, column: &str, value: &str) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lte(self, column: &str, value: &str) -> Self {
        self.filter(column, "lte", value)
    }

    pub fn in_list(self, column: &str, values: &[&str]) -> Self {
        let list = format!("({})", values.join(","));
        self.filter(column, "in", &list)
    }

    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        self.order = Some(format!("{}.{}", column, order.as_str()));
        self
    }

    pub fn limit(mut self, count: u32) -> Self {
        self.limit = Some(count);
        self
    }

    /// Conflict target used by [`upsert`](Self::upsert)
    pub fn on_conflict(mut self, columns: &str) -> Self {
        self.on_conflict = Some(columns.to_string());
        self
    }

    fn filter(mut self, column: &str, operator: &str, value: &str) -> Self {
        self.filters
            .push((column.to_string(), format!("{}.{}", operator, value)));
        self
    }

    pub(crate) fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(select) = &self.select {
                pairs.append_pair("select", select);
            }
            for (column, filter) in &self.filters {
                pairs.append_pair(column, filter);
            }
            if let Some(order) = &self.order {
                pairs.append_pair("order", order);
            }
            if let Some(limit) = self.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(columns) = &self.on_conflict {
                pairs.append_pair("on_conflict", columns);
            }
        }
        // drop a dangling '?' left by an empty query
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self.auth_token.as_deref().unwrap_or(&self.api_key);
        self.http_client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    /// Fetch all matching rows
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, PostgrestError> {
        let url = self.build_url()?;
        debug!("GET {}", url);

        let response = self.request(Method::GET, url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PostgrestError::from_response(status, body));
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Fetch exactly one row. Zero (or several) matches yield `None`.
    pub async fn single<T: DeserializeOwned>(&self) -> Result<Option<T>, PostgrestError> {
        let url = self.build_url()?;
        debug!("GET {} (single)", url);

        let response = self
            .request(Method::GET, url)
            .header("Accept", OBJECT_MEDIA_TYPE)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_ACCEPTABLE {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PostgrestError::from_response(status, body));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Exact number of matching rows, without transferring them
    pub async fn count(&self) -> Result<u64, PostgrestError> {
        let url = self.build_url()?;
        debug!("HEAD {} (count)", url);

        let response = self
            .request(Method::HEAD, url)
            .header("Prefer", "count=exact")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PostgrestError::from_response(status, String::new()));
        }

        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        parse_content_range(range)
    }

    /// Insert rows and return them as stored
    pub async fn insert<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        self.write(Method::POST, values, "return=representation")
            .await
    }

    /// Update the rows matching the current filters
    pub async fn update<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        if self.filters.is_empty() {
            warn!("update on '{}' without filters touches every row", self.table);
        }
        self.write(Method::PATCH, values, "return=representation")
            .await
    }

    /// Insert, merging into existing rows on primary-key (or `on_conflict`) clash
    pub async fn upsert<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        values: &T,
    ) -> Result<Vec<R>, PostgrestError> {
        self.write(
            Method::POST,
            values,
            "resolution=merge-duplicates,return=representation",
        )
        .await
    }

    async fn write<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: Method,
        values: &T,
        prefer: &str,
    ) -> Result<Vec<R>, PostgrestError> {
        let url = self.build_url()?;
        debug!("{} {}", method, url);

        let response = self
            .request(method, url)
            .header("Prefer", prefer)
            .json(values)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PostgrestError::from_response(status, body));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str::<Vec<R>>(&body)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`
fn parse_content_range(value: &str) -> Result<u64, PostgrestError> {
    value
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse::<u64>().ok())
        .ok_or_else(|| PostgrestError::CountUnavailable(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, table: &str) -> PostgrestClient {
        PostgrestClient::new(&server.uri(), "fake-key", table, Client::new())
    }

    #[test]
    fn build_url_keeps_repeated_columns() {
        let c = PostgrestClient::new("http://localhost", "k", "collection_requests", Client::new())
            .select("*")
            .gte("completed_at", "2024-01-01")
            .lte("completed_at", "2024-01-31")
            .in_list("status", &["in_progress", "accepted"])
            .order("created_at", SortOrder::Descending)
            .limit(10);

        let url = c.build_url().unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("select".into(), "*".into()),
                ("completed_at".into(), "gte.2024-01-01".into()),
                ("completed_at".into(), "lte.2024-01-31".into()),
                ("status".into(), "in.(in_progress,accepted)".into()),
                ("order".into(), "created_at.desc".into()),
                ("limit".into(), "10".into()),
            ]
        );
    }

    #[test]
    fn content_range_totals() {
        assert_eq!(parse_content_range("0-24/3573").unwrap(), 3573);
        assert_eq!(parse_content_range("*/0").unwrap(), 0);
        assert!(matches!(
            parse_content_range(""),
            Err(PostgrestError::CountUnavailable(_))
        ));
        assert!(parse_content_range("0-9/*").is_err());
    }

    #[test]
    fn bad_base_url_fails_before_sending() {
        let c = PostgrestClient::new("not a url", "k", "profiles", Client::new());
        let result = tokio_test::block_on(c.execute::<Value>());
        assert!(matches!(result, Err(PostgrestError::UrlParseError(_))));
    }

    #[tokio::test]
    async fn select_with_filter() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/collection_requests"))
            .and(query_param("select", "*"))
            .and(query_param("status", "eq.pending"))
            .and(header("apikey", "fake-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "a", "status": "pending" },
                { "id": "b", "status": "pending" }
            ])))
            .mount(&mock_server)
            .await;

        let rows: Vec<Value> = client(&mock_server, "collection_requests")
            .select("*")
            .eq("status", "pending")
            .execute()
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], "b");
    }

    #[tokio::test]
    async fn bearer_token_replaces_anon_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let rows: Vec<Value> = client(&mock_server, "profiles")
            .with_auth("user-jwt")
            .select("role")
            .execute()
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn single_returns_none_on_406() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(header("Accept", OBJECT_MEDIA_TYPE))
            .respond_with(ResponseTemplate::new(406).set_body_json(json!({
                "code": "PGRST116",
                "message": "JSON object requested, multiple (or no) rows returned"
            })))
            .mount(&mock_server)
            .await;

        let row: Option<Value> = client(&mock_server, "profiles")
            .select("role")
            .eq("id", "nobody")
            .single()
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn count_reads_content_range() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/rest/v1/collection_requests"))
            .and(query_param("status", "eq.completed"))
            .and(header("Prefer", "count=exact"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "0-6/7"))
            .mount(&mock_server)
            .await;

        let total = client(&mock_server, "collection_requests")
            .select("*")
            .eq("status", "completed")
            .count()
            .await
            .unwrap();
        assert_eq!(total, 7);
    }

    #[tokio::test]
    async fn update_returns_rows_and_maps_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/collection_requests"))
            .and(query_param("id", "eq.r1"))
            .and(body_json(json!({ "status": "cancelled" })))
            .and(header("Prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "r1", "status": "cancelled" }
            ])))
            .mount(&mock_server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/collection_requests"))
            .and(query_param("id", "eq.r2"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "code": "42501",
                "message": "permission denied for table collection_requests"
            })))
            .mount(&mock_server)
            .await;

        let updated: Vec<Value> = client(&mock_server, "collection_requests")
            .eq("id", "r1")
            .update(&json!({ "status": "cancelled" }))
            .await
            .unwrap();
        assert_eq!(updated[0]["status"], "cancelled");

        let denied = client(&mock_server, "collection_requests")
            .eq("id", "r2")
            .update::<_, Value>(&json!({ "status": "cancelled" }))
            .await;
        match denied {
            Err(PostgrestError::ApiError { details, status }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(details.code.as_deref(), Some("42501"));
            }
            other => panic!("expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn upsert_sets_merge_preference() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("on_conflict", "id"))
            .and(header_exists("Prefer"))
            .respond_with(ResponseTemplate::new(201).set_body_string(""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let rows: Vec<Value> = client(&mock_server, "profiles")
            .on_conflict("id")
            .upsert(&json!({ "id": "u1", "role": "user" }))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
