use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::{Event, EventListing, FavoriteBeaches, Notification, NotificationListing, User};

#[async_trait]
pub trait DataInterface: Send + Sync {
    async fn init(&mut self) -> anyhow::Result<()>;

    async fn create_transaction(&self) -> anyhow::Result<Box<dyn DataInterfaceAccessTransaction>>;
}

/// Storage primitives. Nothing is persisted until `commit`; dropping a
/// transaction without committing discards its changes.
#[async_trait]
pub trait DataInterfaceAccessTransaction: Send + Sync {
    async fn commit(&self) -> anyhow::Result<()>;
    async fn rollback(&self) -> anyhow::Result<()>;

    async fn new_user(&self, user: User) -> anyhow::Result<User>;

    async fn find_user_by_username(&self, username: String) -> anyhow::Result<Option<User>>;

    async fn update_user_email(&self, username: String, email: Option<String>)
        -> anyhow::Result<()>;

    async fn update_user_password(&self, username: String, password: String)
        -> anyhow::Result<()>;

    async fn update_user_favorites(
        &self,
        username: String,
        favorite_beaches: FavoriteBeaches,
    ) -> anyhow::Result<()>;

    async fn update_user_notifications_enabled(
        &self,
        username: String,
        notifications_enabled: bool,
    ) -> anyhow::Result<()>;

    async fn delete_user(&self, username: String) -> anyhow::Result<()>;

    async fn new_notification(&self, notification: Notification) -> anyhow::Result<Notification>;

    async fn find_notification_by_id(&self, id: i64) -> anyhow::Result<Option<Notification>>;

    /// Newest first.
    async fn find_notifications_by_username(
        &self,
        username: String,
        pending_only: bool,
    ) -> anyhow::Result<Vec<NotificationListing>>;

    async fn count_pending_notifications(&self, username: String) -> anyhow::Result<i64>;

    async fn mark_notification_received(&self, id: i64) -> anyhow::Result<()>;

    async fn delete_notification_by_id(&self, id: i64) -> anyhow::Result<()>;

    async fn delete_notifications_by_username(
        &self,
        username: String,
        received_only: bool,
    ) -> anyhow::Result<()>;

    async fn new_event(&self, event: Event) -> anyhow::Result<Event>;

    async fn find_event_by_id(&self, id: i64) -> anyhow::Result<Option<Event>>;

    /// Soonest first. With `after` set, only events strictly later than it.
    async fn find_events_by_username(
        &self,
        username: String,
        after: Option<NaiveDateTime>,
    ) -> anyhow::Result<Vec<EventListing>>;

    async fn count_events(&self, username: String) -> anyhow::Result<i64>;

    async fn delete_event_by_id(&self, id: i64) -> anyhow::Result<()>;

    async fn delete_events_by_username(&self, username: String) -> anyhow::Result<()>;

    /// Returns how many events were removed.
    async fn delete_events_before(&self, before: NaiveDateTime) -> anyhow::Result<u64>;
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DataInterfaceType {
    MySql,
    Memory,
}

impl fmt::Display for DataInterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataInterfaceType::MySql => write!(f, "mysql"),
            DataInterfaceType::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for DataInterfaceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(DataInterfaceType::MySql),
            "memory" => Ok(DataInterfaceType::Memory),
            other => Err(format!(
                "unknown data interface {other:?}, expected \"mysql\" or \"memory\""
            )),
        }
    }
}
