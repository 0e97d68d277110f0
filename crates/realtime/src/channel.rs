use crate::client::RealtimeClient;
use crate::error::RealtimeError;
use crate::message::{
    ChangeEvent, ChangeEventType, RealtimeMessage, PHX_JOIN, POSTGRES_CHANGES,
};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Binding for row changes on one table
#[derive(Debug, Clone, PartialEq)]
pub struct PostgresChanges {
    schema: String,
    table: String,
    event: ChangeEventType,
    filter: Option<String>,
}

impl PostgresChanges {
    /// Listen to every change on `table` in the `public` schema
    pub fn new(table: &str) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.to_string(),
            event: ChangeEventType::All,
            filter: None,
        }
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub fn event(mut self, event: ChangeEventType) -> Self {
        self.event = event;
        self
    }

    /// Server-side row filter, e.g. `collector_id=eq.42`
    pub fn filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Whether `event` belongs to this binding.
    ///
    /// Only `eq` filters are re-checked locally; anything else is trusted to
    /// the server.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.schema != self.schema || event.table != self.table {
            return false;
        }
        if !self.event.accepts(event.event_type) {
            return false;
        }
        match self.filter.as_deref().and_then(parse_eq_filter) {
            Some((column, expected)) => {
                let row = if event.record.is_object() && !event.record[column].is_null() {
                    &event.record
                } else {
                    &event.old_record
                };
                match &row[column] {
                    Value::String(s) => s == expected,
                    Value::Null => false,
                    other => other.to_string() == expected,
                }
            }
            None => true,
        }
    }

    pub(crate) fn to_config(&self) -> Value {
        let mut config = json!({
            "event": self.event.as_str(),
            "schema": self.schema,
            "table": self.table,
        });
        if let Some(filter) = &self.filter {
            config["filter"] = json!(filter);
        }
        config
    }
}

fn parse_eq_filter(filter: &str) -> Option<(&str, &str)> {
    let (column, rest) = filter.split_once('=')?;
    let value = rest.strip_prefix("eq.")?;
    Some((column, value))
}

/// A joined topic and the callbacks bound to it
pub(crate) struct Channel {
    topic: String,
    callbacks: RwLock<HashMap<Uuid, (PostgresChanges, ChangeCallback)>>,
}

impl Channel {
    fn new(topic: String) -> Self {
        Self {
            topic,
            callbacks: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) async fn handle_message(&self, message: &RealtimeMessage) {
        if message.event != POSTGRES_CHANGES {
            debug!("Ignoring '{}' on {}", message.event, self.topic);
            return;
        }

        let event = match ChangeEvent::from_payload(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Malformed change on {}: {}", self.topic, e);
                return;
            }
        };

        // clone out so callbacks run without holding the lock
        let targets: Vec<ChangeCallback> = self
            .callbacks
            .read()
            .await
            .values()
            .filter(|(binding, _)| binding.matches(&event))
            .map(|(_, callback)| callback.clone())
            .collect();

        debug!(
            "{} {} on {}.{} -> {} callback(s)",
            self.topic,
            event.event_type.as_str(),
            event.schema,
            event.table,
            targets.len()
        );
        for callback in targets {
            callback(event.clone());
        }
    }
}

/// Collects bindings before joining a channel
pub struct ChannelBuilder<'a> {
    client: &'a RealtimeClient,
    name: String,
    bindings: Vec<(PostgresChanges, ChangeCallback)>,
}

impl<'a> ChannelBuilder<'a> {
    pub(crate) fn new(client: &'a RealtimeClient, name: &str) -> Self {
        Self {
            client,
            name: name.to_string(),
            bindings: Vec::new(),
        }
    }

    pub fn on_postgres_changes<F>(mut self, changes: PostgresChanges, callback: F) -> Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let callback: ChangeCallback = Arc::new(callback);
        self.bindings.push((changes, callback));
        self
    }

    /// Connect if needed, register the channel and send the join
    pub async fn subscribe(self) -> Result<Subscription, RealtimeError> {
        if self.bindings.is_empty() {
            return Err(RealtimeError::SubscriptionError(format!(
                "Channel '{}' has no bindings",
                self.name
            )));
        }

        self.client.connect().await?;

        let topic = format!("realtime:{}", self.name);
        let channel = Arc::new(Channel::new(topic.clone()));
        let mut configs = Vec::with_capacity(self.bindings.len());
        {
            let mut callbacks = channel.callbacks.write().await;
            for (binding, callback) in self.bindings {
                configs.push(binding.to_config());
                callbacks.insert(Uuid::new_v4(), (binding, callback));
            }
        }

        self.client
            .channels
            .write()
            .await
            .insert(topic.clone(), channel);

        let access_token = self.client.access_token.read().await.clone();
        let mut payload = json!({
            "config": {
                "postgres_changes": configs,
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = json!(token);
        }

        let join = RealtimeMessage::new(&topic, PHX_JOIN, payload, Some(self.client.next_ref()));
        if let Err(e) = self.client.send_message(&join).await {
            self.client.channels.write().await.remove(&topic);
            return Err(e);
        }
        info!("Joined {}", topic);

        Ok(Subscription {
            client: self.client.clone(),
            topic,
            active: true,
        })
    }
}

/// Handle on a joined channel.
///
/// Dropping it without [`Subscription::unsubscribe`] leaves the channel from a
/// background task, provided a tokio runtime is still running.
pub struct Subscription {
    client: RealtimeClient,
    topic: String,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Leave the channel; no more callbacks fire afterwards
    pub async fn unsubscribe(mut self) -> Result<(), RealtimeError> {
        self.active = false;
        self.client.leave_channel(&self.topic).await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Subscription {} dropped outside a runtime", self.topic);
            return;
        };
        let client = self.client.clone();
        let topic = std::mem::take(&mut self.topic);
        runtime.spawn(async move {
            if let Err(e) = client.leave_channel(&topic).await {
                warn!("Leaving {} on drop failed: {}", topic, e);
            }
        });
    }
}
