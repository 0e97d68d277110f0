//! Admin dashboard: global counts, recent activity, collector ranking and CSV export

use crate::client::{DispatchClient, COLLECTION_REQUESTS, PROFILES};
use crate::error::{DispatchError, Result};
use crate::models::{Profile, RequestStatus, RequestWithParties, Role};
use crate::progress::percent_of;
use std::str::FromStr;
use tracing::debug;
use waste_dispatch_postgrest::SortOrder;

const WITH_PARTIES: &str =
    "*,users:user_id(full_name,email),collectors:collector_id(full_name,email)";

const CSV_HEADER: &str = "ID,Status,Date,User,Collector,Address,Latitude,Longitude";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminStats {
    pub total_users: u64,
    pub total_collectors: u64,
    pub total_requests: u64,
    pub pending_requests: u64,
    pub completed_requests: u64,
    pub total_waste_kg: u64,
}

impl AdminStats {
    /// Requests neither pending nor completed
    pub fn in_flight(&self) -> u64 {
        self.total_requests
            .saturating_sub(self.pending_requests)
            .saturating_sub(self.completed_requests)
    }

    /// `count` as a percentage of all requests
    pub fn share(&self, count: u64) -> f64 {
        percent_of(count, self.total_requests)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorPerformance {
    pub profile: Profile,
    pub completed_collections: u64,
    pub waste_collected_kg: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(RequestStatus),
}

impl FromStr for StatusFilter {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        Ok(StatusFilter::Only(s.parse()?))
    }
}

/// Status dropdown plus free-text search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionFilter {
    pub status: StatusFilter,
    pub query: String,
}

impl CollectionFilter {
    pub fn matches(&self, row: &RequestWithParties) -> bool {
        if let StatusFilter::Only(status) = self.status {
            if row.request.status != status {
                return false;
            }
        }

        let query = self.query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        [
            row.user_name(),
            row.collector_name(),
            row.request.address.as_deref(),
        ]
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&query))
    }

    pub fn apply<'a>(&self, rows: &'a [RequestWithParties]) -> Vec<&'a RequestWithParties> {
        rows.iter().filter(|row| self.matches(row)).collect()
    }
}

/// First eight characters of an id, for display
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One header line, then one line per row
pub fn export_csv<'a, I>(rows: I) -> String
where
    I: IntoIterator<Item = &'a RequestWithParties>,
{
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for row in rows {
        let request = &row.request;
        let id = request.id.to_string();
        let date = request.created_at.format("%Y-%m-%d").to_string();
        let latitude = request.latitude.to_string();
        let longitude = request.longitude.to_string();
        let fields = [
            id.as_str(),
            request.status.as_str(),
            date.as_str(),
            row.user_name().unwrap_or("N/A"),
            row.collector_name().unwrap_or("N/A"),
            request.address.as_deref().unwrap_or("N/A"),
            latitude.as_str(),
            longitude.as_str(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

impl DispatchClient {
    pub async fn admin_stats(&self) -> Result<AdminStats> {
        let total_users = self
            .from(PROFILES)?
            .eq("role", Role::User.as_str())
            .count()
            .await?;
        let total_collectors = self
            .from(PROFILES)?
            .eq("role", Role::Collector.as_str())
            .count()
            .await?;
        let total_requests = self.from(COLLECTION_REQUESTS)?.count().await?;
        let pending_requests = self
            .from(COLLECTION_REQUESTS)?
            .eq("status", RequestStatus::Pending.as_str())
            .count()
            .await?;
        let completed_requests = self
            .from(COLLECTION_REQUESTS)?
            .eq("status", RequestStatus::Completed.as_str())
            .count()
            .await?;

        Ok(AdminStats {
            total_users,
            total_collectors,
            total_requests,
            pending_requests,
            completed_requests,
            total_waste_kg: completed_requests
                * u64::from(self.options().waste_kg_per_collection),
        })
    }

    /// Newest requests with both parties embedded
    pub async fn recent_collections(&self) -> Result<Vec<RequestWithParties>> {
        let rows = self
            .from(COLLECTION_REQUESTS)?
            .select(WITH_PARTIES)
            .order("created_at", SortOrder::Descending)
            .limit(self.options().recent_limit)
            .execute()
            .await?;
        Ok(rows)
    }

    /// Completed collections per collector, one count query each
    pub async fn collector_performance(&self) -> Result<Vec<CollectorPerformance>> {
        let collectors: Vec<Profile> = self
            .from(PROFILES)?
            .select("*")
            .eq("role", Role::Collector.as_str())
            .execute()
            .await?;
        debug!(count = collectors.len(), "ranking collectors");

        let factor = u64::from(self.options().waste_kg_per_collection);
        let mut ranking = Vec::with_capacity(collectors.len());
        for profile in collectors {
            let completed = self
                .from(COLLECTION_REQUESTS)?
                .eq("collector_id", &profile.id.to_string())
                .eq("status", RequestStatus::Completed.as_str())
                .count()
                .await?;
            ranking.push(CollectorPerformance {
                profile,
                completed_collections: completed,
                waste_collected_kg: completed * factor,
            });
        }
        Ok(ranking)
    }
}
