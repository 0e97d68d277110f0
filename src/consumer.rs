//! Operations for people requesting pickups

use crate::client::{DispatchClient, COLLECTION_REQUESTS, PROFILES};
use crate::error::{DispatchError, Result};
use crate::models::{CollectionRequest, Coordinates, NewCollectionRequest, Profile, RequestStatus};
use tracing::{debug, info};
use waste_dispatch_postgrest::SortOrder;

/// Tally of a consumer's own requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub estimated_waste_kg: u64,
}

impl ConsumerStats {
    pub fn from_requests(requests: &[CollectionRequest], kg_per_collection: u32) -> Self {
        let mut stats = ConsumerStats {
            total: requests.len() as u64,
            ..Default::default()
        };
        for request in requests {
            match request.status {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::Completed => stats.completed += 1,
                RequestStatus::Cancelled => stats.cancelled += 1,
                RequestStatus::Accepted | RequestStatus::InProgress => {}
            }
        }
        stats.estimated_waste_kg = stats.completed * u64::from(kg_per_collection);
        stats
    }
}

/// What the profile screen shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileView {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl DispatchClient {
    /// File a pending pickup at `at` for the signed-in user
    pub async fn request_collection(&self, at: Coordinates) -> Result<CollectionRequest> {
        let user_id = self.current_user_id()?;
        let rows: Vec<CollectionRequest> = self
            .from(COLLECTION_REQUESTS)?
            .insert(&NewCollectionRequest::pending(user_id, at))
            .await?;
        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::NotFound("created collection request".to_string()))?;
        info!(request_id = %created.id, "collection requested");
        Ok(created)
    }

    /// The signed-in user's requests, newest first
    pub async fn my_requests(&self) -> Result<Vec<CollectionRequest>> {
        let user_id = self.current_user_id()?;
        let rows: Vec<CollectionRequest> = self
            .from(COLLECTION_REQUESTS)?
            .select("*")
            .eq("user_id", &user_id.to_string())
            .order("created_at", SortOrder::Descending)
            .execute()
            .await?;
        debug!(count = rows.len(), "fetched own requests");
        Ok(rows)
    }

    pub async fn my_stats(&self) -> Result<ConsumerStats> {
        let requests = self.my_requests().await?;
        Ok(ConsumerStats::from_requests(
            &requests,
            self.options().waste_kg_per_collection,
        ))
    }

    /// Profile row of the signed-in user, merged with the account email
    pub async fn my_profile(&self) -> Result<ProfileView> {
        let session = self.session()?;
        let user_id = self.current_user_id()?;
        let profile: Option<Profile> = self
            .from(PROFILES)?
            .select("*")
            .eq("id", &user_id.to_string())
            .single()
            .await?;

        let (full_name, phone) = match profile {
            Some(p) => (p.full_name, p.phone),
            None => (None, None),
        };
        Ok(ProfileView {
            full_name,
            email: session.user.email,
            phone,
        })
    }
}
