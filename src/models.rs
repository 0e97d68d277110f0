//! Rows of the `profiles` and `collection_requests` tables

use crate::error::{DispatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account role stored on the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Collector,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Collector => "collector",
            Role::Admin => "admin",
        }
    }
}

// anything unrecognised is treated as a regular user
impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "collector" => Role::Collector,
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Lifecycle of a collection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// French display label
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "En attente",
            RequestStatus::Accepted => "À collecter",
            RequestStatus::InProgress => "En cours",
            RequestStatus::Completed => "Terminée",
            RequestStatus::Cancelled => "Annulée",
        }
    }

    /// Accepted by a collector and not finished yet
    pub fn is_active(&self) -> bool {
        matches!(self, RequestStatus::Accepted | RequestStatus::InProgress)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "in_progress" => Ok(RequestStatus::InProgress),
            "completed" => Ok(RequestStatus::Completed),
            "cancelled" | "canceled" => Ok(RequestStatus::Cancelled),
            other => Err(DispatchError::InvalidInput(format!(
                "Statut inconnu: {}",
                other
            ))),
        }
    }
}

/// A point on the map, in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(DispatchError::InvalidInput(format!(
                "Latitude invalide: {}",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(DispatchError::InvalidInput(format!(
                "Longitude invalide: {}",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub collector_id: Option<Uuid>,
    pub status: RequestStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl CollectionRequest {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Profile fields embedded next to a request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartyInfo {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Request with the requester's profile (`profiles:user_id(...)` embed)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestWithRequester {
    #[serde(flatten)]
    pub request: CollectionRequest,
    #[serde(rename = "profiles", default)]
    pub requester: Option<PartyInfo>,
}

impl RequestWithRequester {
    pub fn requester_name(&self) -> Option<&str> {
        self.requester.as_ref().and_then(|p| p.full_name.as_deref())
    }

    pub fn requester_phone(&self) -> Option<&str> {
        self.requester.as_ref().and_then(|p| p.phone.as_deref())
    }
}

/// Request with both parties (`users:user_id(...)` and `collectors:collector_id(...)` embeds)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestWithParties {
    #[serde(flatten)]
    pub request: CollectionRequest,
    #[serde(default)]
    pub users: Option<PartyInfo>,
    #[serde(default)]
    pub collectors: Option<PartyInfo>,
}

impl RequestWithParties {
    pub fn user_name(&self) -> Option<&str> {
        self.users.as_ref().and_then(|p| p.full_name.as_deref())
    }

    pub fn collector_name(&self) -> Option<&str> {
        self.collectors.as_ref().and_then(|p| p.full_name.as_deref())
    }
}

/// Insert payload for a new pickup
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewCollectionRequest {
    pub user_id: Uuid,
    pub status: RequestStatus,
    pub latitude: f64,
    pub longitude: f64,
}

impl NewCollectionRequest {
    pub fn pending(user_id: Uuid, at: Coordinates) -> Self {
        Self {
            user_id,
            status: RequestStatus::Pending,
            latitude: at.latitude,
            longitude: at.longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_role_is_user() {
        let profile: Profile = serde_json::from_value(json!({
            "id": "6f1c1a52-2b34-4c55-9a0e-3f9a3c2a1b01",
            "user_id": "6f1c1a52-2b34-4c55-9a0e-3f9a3c2a1b01",
            "role": "superhero"
        }))
        .unwrap();
        assert_eq!(profile.role, Role::User);
        assert_eq!(serde_json::to_value(Role::Collector).unwrap(), json!("collector"));
    }

    #[test]
    fn status_spellings_and_labels() {
        let status: RequestStatus = serde_json::from_value(json!("canceled")).unwrap();
        assert_eq!(status, RequestStatus::Cancelled);
        assert_eq!(
            serde_json::to_value(RequestStatus::InProgress).unwrap(),
            json!("in_progress")
        );
        assert_eq!(RequestStatus::InProgress.label(), "En cours");
        assert_eq!(RequestStatus::Accepted.label(), "À collecter");
        assert!(RequestStatus::Accepted.is_active());
        assert!(!RequestStatus::Pending.is_active());
        assert_eq!("Canceled".parse::<RequestStatus>().unwrap(), RequestStatus::Cancelled);
        assert!("lost".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn coordinates_are_range_checked() {
        assert!(Coordinates::new(6.37, 2.39).is_ok());
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, -180.5).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn embedded_requester_is_parsed() {
        let row: RequestWithRequester = serde_json::from_value(json!({
            "id": "0b8e6f9e-7a0c-4a8e-b1a4-5d3c2e1f0a01",
            "user_id": "6f1c1a52-2b34-4c55-9a0e-3f9a3c2a1b01",
            "collector_id": null,
            "status": "pending",
            "latitude": 6.3703,
            "longitude": 2.3912,
            "created_at": "2024-05-01T10:00:00+00:00",
            "completed_at": null,
            "profiles": { "full_name": "Ama K.", "phone": "+22990000000" }
        }))
        .unwrap();
        assert_eq!(row.request.status, RequestStatus::Pending);
        assert_eq!(row.requester_name(), Some("Ama K."));
        assert_eq!(row.requester_phone(), Some("+22990000000"));
        assert_eq!(row.request.coordinates().latitude, 6.3703);
    }
}
