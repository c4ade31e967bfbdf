use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{NaiveDateTime, SubsecRound, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    beach_day_error::BeachDayError,
    data_interface::{DataInterface, DataInterfaceAccessTransaction},
    model::{Event, EventListing, FavoriteBeaches, Notification, NotificationListing, User},
};

#[derive(Debug, Clone, Default)]
struct MemoryStore {
    users: BTreeMap<String, User>,
    notifications: BTreeMap<i64, Notification>,
    events: BTreeMap<i64, Event>,
    last_user_id: i64,
    last_notification_id: i64,
    last_event_id: i64,
}

/// Keeps everything in process. Transactions are serialized: each one holds
/// the store until it commits, rolls back or is dropped.
#[derive(Clone, Default)]
pub struct DataInterfaceMemory {
    store: Arc<Mutex<MemoryStore>>,
}

impl DataInterfaceMemory {
    pub fn new() -> Self {
        DataInterfaceMemory::default()
    }
}

#[async_trait]
impl DataInterface for DataInterfaceMemory {
    async fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn create_transaction(&self) -> anyhow::Result<Box<dyn DataInterfaceAccessTransaction>> {
        let guard = self.store.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(Arc::new(Mutex::new(
            DataInterfaceTransactionMemory {
                transaction: Some(MemoryTransaction { guard, working }),
            },
        ))))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryStore>,
    working: MemoryStore,
}

struct DataInterfaceTransactionMemory {
    transaction: Option<MemoryTransaction>,
}

macro_rules! working_store {
    ($dit:ident) => {
        &mut $dit
            .transaction
            .as_mut()
            .ok_or(anyhow::anyhow!("Already taken"))?
            .working
    };
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

fn require_owner(store: &MemoryStore, username: &str) -> anyhow::Result<()> {
    if !store.users.contains_key(username) {
        anyhow::bail!("foreign key violation: no user {username:?}");
    }
    Ok(())
}

#[async_trait]
impl DataInterfaceAccessTransaction for Arc<Mutex<DataInterfaceTransactionMemory>> {
    async fn commit(&self) -> anyhow::Result<()> {
        let MemoryTransaction { mut guard, working } = self
            .lock()
            .await
            .transaction
            .take()
            .ok_or(anyhow::anyhow!("Already taken"))?;
        *guard = working;
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        self.lock()
            .await
            .transaction
            .take()
            .ok_or(anyhow::anyhow!("Already taken"))?;
        Ok(())
    }

    async fn new_user(&self, mut user: User) -> anyhow::Result<User> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        if store.users.contains_key(&user.username) {
            anyhow::bail!(BeachDayError::UserAlreadyExists);
        }
        if user.email.is_some() && store.users.values().any(|other| other.email == user.email) {
            anyhow::bail!(BeachDayError::EmailAlreadyInUse);
        }
        store.last_user_id += 1;
        user.id = Some(store.last_user_id);
        store.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn find_user_by_username(&self, username: String) -> anyhow::Result<Option<User>> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        Ok(store.users.get(&username).cloned())
    }

    async fn update_user_email(
        &self,
        username: String,
        email: Option<String>,
    ) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        if email.is_some()
            && store
                .users
                .values()
                .any(|other| other.username != username && other.email == email)
        {
            anyhow::bail!(BeachDayError::EmailAlreadyInUse);
        }
        if let Some(user) = store.users.get_mut(&username) {
            user.email = email;
        }
        Ok(())
    }

    async fn update_user_password(&self, username: String, password: String) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        if let Some(user) = store.users.get_mut(&username) {
            user.password = password;
        }
        Ok(())
    }

    async fn update_user_favorites(
        &self,
        username: String,
        favorite_beaches: FavoriteBeaches,
    ) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        if let Some(user) = store.users.get_mut(&username) {
            user.favorite_beaches = favorite_beaches;
        }
        Ok(())
    }

    async fn update_user_notifications_enabled(
        &self,
        username: String,
        notifications_enabled: bool,
    ) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        if let Some(user) = store.users.get_mut(&username) {
            user.notifications_enabled = notifications_enabled;
        }
        Ok(())
    }

    async fn delete_user(&self, username: String) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        let referenced = store
            .notifications
            .values()
            .any(|notification| notification.username == username)
            || store.events.values().any(|event| event.username == username);
        if referenced {
            anyhow::bail!("foreign key violation: user {username:?} still has rows");
        }
        store.users.remove(&username);
        Ok(())
    }

    async fn new_notification(&self, mut notification: Notification) -> anyhow::Result<Notification> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        require_owner(store, &notification.username)?;
        store.last_notification_id += 1;
        notification.notification_id = Some(store.last_notification_id);
        notification.creation_time = notification.creation_time.or_else(|| Some(now()));
        store
            .notifications
            .insert(store.last_notification_id, notification.clone());
        Ok(notification)
    }

    async fn find_notification_by_id(&self, id: i64) -> anyhow::Result<Option<Notification>> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        Ok(store.notifications.get(&id).cloned())
    }

    async fn find_notifications_by_username(
        &self,
        username: String,
        pending_only: bool,
    ) -> anyhow::Result<Vec<NotificationListing>> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        let owner = store.users.get(&username);
        let mut listings: Vec<NotificationListing> = store
            .notifications
            .iter()
            .filter(|(_, notification)| notification.username == username)
            .filter(|(_, notification)| !pending_only || !notification.was_received)
            .map(|(id, notification)| NotificationListing {
                creation_time: notification.creation_time,
                notification_title: notification.notification_title.clone(),
                message: notification.message.clone(),
                email: owner.and_then(|user| user.email.clone()),
                notifications_enabled: owner.map_or(false, |user| user.notifications_enabled),
                notification_id: *id,
                username: notification.username.clone(),
            })
            .collect();
        listings.sort_by(|a, b| {
            (b.creation_time, b.notification_id).cmp(&(a.creation_time, a.notification_id))
        });
        Ok(listings)
    }

    async fn count_pending_notifications(&self, username: String) -> anyhow::Result<i64> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        Ok(store
            .notifications
            .values()
            .filter(|notification| notification.username == username && !notification.was_received)
            .count() as i64)
    }

    async fn mark_notification_received(&self, id: i64) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        if let Some(notification) = store.notifications.get_mut(&id) {
            notification.was_received = true;
        }
        Ok(())
    }

    async fn delete_notification_by_id(&self, id: i64) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        store.notifications.remove(&id);
        Ok(())
    }

    async fn delete_notifications_by_username(
        &self,
        username: String,
        received_only: bool,
    ) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        store.notifications.retain(|_, notification| {
            notification.username != username || (received_only && !notification.was_received)
        });
        Ok(())
    }

    async fn new_event(&self, mut event: Event) -> anyhow::Result<Event> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        require_owner(store, &event.username)?;
        store.last_event_id += 1;
        event.event_id = Some(store.last_event_id);
        event.event_time = event.event_time.map(|time| time.trunc_subsecs(0));
        store.events.insert(store.last_event_id, event.clone());
        Ok(event)
    }

    async fn find_event_by_id(&self, id: i64) -> anyhow::Result<Option<Event>> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        Ok(store.events.get(&id).cloned())
    }

    async fn find_events_by_username(
        &self,
        username: String,
        after: Option<NaiveDateTime>,
    ) -> anyhow::Result<Vec<EventListing>> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        let email = store
            .users
            .get(&username)
            .and_then(|user| user.email.clone());
        let mut listings: Vec<EventListing> = store
            .events
            .iter()
            .filter(|(_, event)| event.username == username)
            .filter(|(_, event)| match after {
                Some(after) => event.event_time.map_or(false, |time| time > after),
                None => true,
            })
            .map(|(id, event)| EventListing {
                event_time: event.event_time,
                event_message: event.event_message.clone(),
                beach_id: event.beach_id.clone(),
                email: email.clone(),
                event_id: *id,
                username: event.username.clone(),
            })
            .collect();
        listings.sort_by(|a, b| (a.event_time, a.event_id).cmp(&(b.event_time, b.event_id)));
        Ok(listings)
    }

    async fn count_events(&self, username: String) -> anyhow::Result<i64> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        Ok(store
            .events
            .values()
            .filter(|event| event.username == username)
            .count() as i64)
    }

    async fn delete_event_by_id(&self, id: i64) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        store.events.remove(&id);
        Ok(())
    }

    async fn delete_events_by_username(&self, username: String) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        store.events.retain(|_, event| event.username != username);
        Ok(())
    }

    async fn delete_events_before(&self, before: NaiveDateTime) -> anyhow::Result<u64> {
        let mut data_interface_transaction = self.lock().await;
        let store = working_store!(data_interface_transaction);
        let count = store.events.len();
        store
            .events
            .retain(|_, event| event.event_time.map_or(true, |time| time >= before));
        Ok((count - store.events.len()) as u64)
    }
}
