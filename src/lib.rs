//! Waste collection dispatch client
//!
//! Consumers request pickups, collectors accept and complete them, and an
//! admin view aggregates the numbers. Every operation reads or writes the
//! `profiles` and `collection_requests` tables of a Supabase backend; live
//! lists re-run their query whenever the change feed reports a row change.
//!
//! # Example
//!
//! ```no_run
//! use waste_dispatch::{DispatchClient, DispatchConfig, Home};
//!
//! # async fn run() -> waste_dispatch::Result<()> {
//! let config = DispatchConfig::new("https://your-project-url.supabase.co", "your-anon-key")?;
//! let client = DispatchClient::new(config)?;
//!
//! if client.login("collector@example.com", "secret").await? == Home::Collector {
//!     for row in client.pending_requests().await? {
//!         println!("{} {}", row.request.id, row.request.status.label());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod client;
pub mod collector;
pub mod config;
pub mod consumer;
pub mod error;
pub mod live;
pub mod models;
pub mod navigation;
pub mod progress;
pub mod session;

pub use admin::{
    export_csv, short_id, AdminStats, CollectionFilter, CollectorPerformance, StatusFilter,
};
pub use client::DispatchClient;
pub use collector::CollectorDashboard;
pub use config::{ClientOptions, DispatchConfig};
pub use consumer::{ConsumerStats, ProfileView};
pub use error::{Action, DispatchError, Result};
pub use live::{LiveQuery, Snapshot};
pub use models::{
    CollectionRequest, Coordinates, NewCollectionRequest, PartyInfo, Profile, RequestStatus,
    RequestWithParties, RequestWithRequester, Role,
};
pub use navigation::{dial_link, format_coordinates, map_link, Itinerary, Platform};
pub use progress::{percent_of, ProgressRing};
pub use session::{Home, SignupForm, SignupOutcome};
