//! Queries that re-run whenever their table changes.
//!
//! A [`LiveQuery`] fetches once, subscribes to every change on the table and
//! re-fetches on each event. Results are published whole; there is no merge
//! or diff against the previous snapshot.

use crate::error::Result;
use std::future::Future;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;
use waste_dispatch_realtime::{ChangeEventType, PostgresChanges, RealtimeClient, Subscription};

/// Latest state of a live query
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot<T> {
    Loading,
    Ready(Vec<T>),
    Failed(String),
}

impl<T> Snapshot<T> {
    pub fn rows(&self) -> Option<&[T]> {
        match self {
            Snapshot::Ready(rows) => Some(rows),
            _ => None,
        }
    }
}

/// Dropping a live query stops re-fetching and leaves its channel.
pub struct LiveQuery<T> {
    snapshots: watch::Receiver<Snapshot<T>>,
    subscription: Option<Subscription>,
    task: JoinHandle<()>,
}

impl<T> LiveQuery<T>
where
    T: Send + Sync + 'static,
{
    /// Run `fetch` now and again after every change on `schema.table`
    pub async fn spawn<F, Fut>(
        realtime: &RealtimeClient,
        schema: &str,
        table: &str,
        fetch: F,
    ) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        let (snapshot_tx, snapshots) = watch::channel(Snapshot::Loading);
        let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel::<()>();

        let changes = PostgresChanges::new(table)
            .schema(schema)
            .event(ChangeEventType::All);
        let channel_name = format!("{}-{}", table, Uuid::new_v4());
        let subscription = realtime
            .channel(&channel_name)
            .on_postgres_changes(changes, move |event| {
                debug!(table = %event.table, kind = event.event_type.as_str(), "change received");
                let _ = refresh_tx.send(());
            })
            .subscribe()
            .await?;
        info!(topic = subscription.topic(), "live query subscribed");

        let task = tokio::spawn(async move {
            loop {
                let snapshot = match fetch().await {
                    Ok(rows) => Snapshot::Ready(rows),
                    Err(e) => {
                        error!(error = %e, "live query fetch failed");
                        Snapshot::Failed(e.to_string())
                    }
                };
                if snapshot_tx.send(snapshot).is_err() {
                    break;
                }
                if refresh_rx.recv().await.is_none() {
                    break;
                }
            }
        });

        Ok(Self {
            snapshots,
            subscription: Some(subscription),
            task,
        })
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshots.clone()
    }

    /// Leave the channel and stop re-fetching
    pub async fn stop(mut self) -> Result<()> {
        self.task.abort();
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await?;
        }
        Ok(())
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T: Clone> LiveQuery<T> {
    pub fn latest(&self) -> Snapshot<T> {
        self.snapshots.borrow().clone()
    }
}
