//! Operations for collectors: pick up pending requests and close them out

use crate::client::{DispatchClient, COLLECTION_REQUESTS, PROFILES};
use crate::consumer::ProfileView;
use crate::error::{DispatchError, Result};
use crate::live::LiveQuery;
use crate::models::{CollectionRequest, Profile, RequestStatus, RequestWithRequester};
use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use waste_dispatch_postgrest::SortOrder;

const WITH_REQUESTER: &str = "*,profiles:user_id(full_name,phone)";

/// Figures shown on the collector dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorDashboard {
    pub full_name: Option<String>,
    pub total_collections: u64,
    pub pending_requests: u64,
    pub completed_today: u64,
    pub total_waste_kg: u64,
}

impl DispatchClient {
    /// Open requests with the requester's name and phone, newest first
    pub async fn pending_requests(&self) -> Result<Vec<RequestWithRequester>> {
        let rows = self
            .from(COLLECTION_REQUESTS)?
            .select(WITH_REQUESTER)
            .eq("status", RequestStatus::Pending.as_str())
            .order("created_at", SortOrder::Descending)
            .execute()
            .await?;
        Ok(rows)
    }

    /// Open requests as bare rows, for the map
    pub async fn pending_markers(&self) -> Result<Vec<CollectionRequest>> {
        let rows = self
            .from(COLLECTION_REQUESTS)?
            .select("*")
            .eq("status", RequestStatus::Pending.as_str())
            .execute()
            .await?;
        Ok(rows)
    }

    /// Take a request. Nothing stops two collectors racing; the last write wins.
    #[instrument(skip(self))]
    pub async fn accept(&self, request_id: Uuid) -> Result<CollectionRequest> {
        let collector_id = self.current_user_id()?;
        let updated = self
            .update_request(
                request_id,
                json!({
                    "status": RequestStatus::Accepted,
                    "collector_id": collector_id,
                }),
            )
            .await?;
        info!(%request_id, %collector_id, "request accepted");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn reject(&self, request_id: Uuid) -> Result<CollectionRequest> {
        let updated = self
            .update_request(request_id, json!({ "status": RequestStatus::Cancelled }))
            .await?;
        info!(%request_id, "request rejected");
        Ok(updated)
    }

    /// Requests this collector has taken and not finished
    pub async fn active_collections(&self) -> Result<Vec<RequestWithRequester>> {
        let collector_id = self.current_user_id()?;
        let rows = self
            .from(COLLECTION_REQUESTS)?
            .select(WITH_REQUESTER)
            .in_list(
                "status",
                &[
                    RequestStatus::InProgress.as_str(),
                    RequestStatus::Accepted.as_str(),
                ],
            )
            .eq("collector_id", &collector_id.to_string())
            .order("created_at", SortOrder::Descending)
            .execute()
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn mark_completed(&self, request_id: Uuid) -> Result<CollectionRequest> {
        let updated = self
            .update_request(
                request_id,
                json!({
                    "status": RequestStatus::Completed,
                    "completed_at": Utc::now(),
                }),
            )
            .await?;
        info!(%request_id, "collection completed");
        Ok(updated)
    }

    pub async fn dashboard(&self) -> Result<CollectorDashboard> {
        let collector_id = self.current_user_id()?.to_string();
        let profile: Option<Profile> = self
            .from(PROFILES)?
            .select("*")
            .eq("id", &collector_id)
            .single()
            .await?;

        let total_collections = self
            .from(COLLECTION_REQUESTS)?
            .eq("collector_id", &collector_id)
            .in_list(
                "status",
                &[
                    RequestStatus::Completed.as_str(),
                    RequestStatus::InProgress.as_str(),
                ],
            )
            .count()
            .await?;

        let pending_requests = self
            .from(COLLECTION_REQUESTS)?
            .eq("status", RequestStatus::Pending.as_str())
            .count()
            .await?;

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let completed_today = self
            .from(COLLECTION_REQUESTS)?
            .eq("collector_id", &collector_id)
            .eq("status", RequestStatus::Completed.as_str())
            .gte("completed_at", &today)
            .count()
            .await?;

        Ok(CollectorDashboard {
            full_name: profile.and_then(|p| p.full_name),
            total_collections,
            pending_requests,
            completed_today,
            total_waste_kg: total_collections * u64::from(self.options().waste_kg_per_collection),
        })
    }

    pub async fn profile(&self) -> Result<ProfileView> {
        self.my_profile().await
    }

    /// Pending list kept fresh by the change feed
    pub async fn watch_pending(&self) -> Result<LiveQuery<RequestWithRequester>> {
        let client = self.clone();
        LiveQuery::spawn(
            self.realtime(),
            &self.options().db_schema,
            COLLECTION_REQUESTS,
            move || {
                let client = client.clone();
                async move { client.pending_requests().await }
            },
        )
        .await
    }

    /// Active list kept fresh by the change feed
    pub async fn watch_active(&self) -> Result<LiveQuery<RequestWithRequester>> {
        let client = self.clone();
        LiveQuery::spawn(
            self.realtime(),
            &self.options().db_schema,
            COLLECTION_REQUESTS,
            move || {
                let client = client.clone();
                async move { client.active_collections().await }
            },
        )
        .await
    }

    async fn update_request(
        &self,
        request_id: Uuid,
        changes: serde_json::Value,
    ) -> Result<CollectionRequest> {
        let rows: Vec<CollectionRequest> = self
            .from(COLLECTION_REQUESTS)?
            .eq("id", &request_id.to_string())
            .update(&changes)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DispatchError::NotFound(format!("collection request {}", request_id)))
    }
}

