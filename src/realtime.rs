use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rocket::tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub const SCHEMA: &str = "public";

/// Tables whose mutations are announced on the feed.
pub const TABLES: [&str; 5] = ["workshops", "recorded_sessions", "challenges", "concepts", "users"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    pub kind: ChangeKind,
    pub id: i64,
}

impl ChangeEvent {
    pub fn topic(&self) -> String {
        format!("{}:{}", self.schema, self.table)
    }
}

/// One broadcast channel per `schema:table` topic, created on first use.
#[derive(Clone)]
pub struct ChangeFeed {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>>,
    capacity: usize,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(128)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    pub fn is_known_table(table: &str) -> bool {
        TABLES.contains(&table)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<ChangeEvent> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.sender(&format!("{SCHEMA}:{table}")).subscribe()
    }

    /// Announces a committed mutation. Returns how many listeners saw it.
    #[instrument(skip(self))]
    pub fn publish(&self, table: &str, kind: ChangeKind, id: i64) -> usize {
        let event = ChangeEvent {
            schema: SCHEMA.to_string(),
            table: table.to_string(),
            kind,
            id,
        };

        let receivers = self.sender(&event.topic()).send(event).unwrap_or(0);
        debug!(receivers, "Change event published");
        receivers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_only_see_their_table() {
        let feed = ChangeFeed::default();
        let mut workshops = feed.subscribe("workshops");
        let mut concepts = feed.subscribe("concepts");

        feed.publish("workshops", ChangeKind::Delete, 7);

        let event = workshops.recv().await.unwrap();
        assert_eq!(event.topic(), "public:workshops");
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.id, 7);
        assert!(concepts.try_recv().is_err());
    }

    #[test]
    fn publishing_without_listeners_is_fine() {
        let feed = ChangeFeed::default();
        assert_eq!(feed.publish("challenges", ChangeKind::Insert, 1), 0);
    }
}
