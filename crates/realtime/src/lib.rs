//! Change-feed subscriptions for the waste-dispatch backend
//!
//! Speaks the Phoenix channel protocol used by the backend's realtime
//! service: one websocket, a heartbeat, and per-topic `phx_join` carrying the
//! `postgres_changes` bindings. Each row change is handed to the callbacks
//! registered for the matching table.

mod channel;
mod client;
mod error;
mod message;

pub use channel::{ChannelBuilder, PostgresChanges, Subscription};
pub use client::{ConnectionState, RealtimeClient, RealtimeClientOptions};
pub use error::RealtimeError;
pub use message::{ChangeEvent, ChangeEventType, RealtimeMessage};
