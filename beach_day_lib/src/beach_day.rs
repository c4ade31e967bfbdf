use std::path::PathBuf;

use chrono::{Duration, NaiveDateTime, SubsecRound, Utc};

use crate::{
    auth,
    beach_day_error::BeachDayError,
    beach_day_file::BeachDayFile,
    data_interface::{DataInterface, DataInterfaceAccessTransaction, DataInterfaceType},
    data_interfaces::{
        data_interface_memory::DataInterfaceMemory, data_interface_mysql::DataInterfaceMySql,
    },
    model::{
        validate_alphanumeric, Event, EventListing, Notification, NotificationListing, User,
        MAX_BEACH_ID_LEN, MAX_EMAIL_LEN, MAX_FAVORITES_LEN, MAX_NOTIFICATION_TITLE_LEN,
        MAX_USERNAME_LEN,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationFilter {
    Pending,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationRemoval {
    Received,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Future,
    All,
}

pub struct BeachDay {
    pub data_interface: Box<dyn DataInterface>,
    pub beach_day_file: BeachDayFile,
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn valid_beach_id(beach_id: &str) -> bool {
    !beach_id.is_empty() && beach_id.len() <= MAX_BEACH_ID_LEN && validate_alphanumeric(beach_id)
}

async fn require_user(
    transaction: &dyn DataInterfaceAccessTransaction,
    username: &str,
) -> anyhow::Result<User> {
    match transaction.find_user_by_username(username.to_owned()).await? {
        Some(user) => Ok(user),
        None => anyhow::bail!(BeachDayError::UserNotFound),
    }
}

async fn owned_notification(
    transaction: &dyn DataInterfaceAccessTransaction,
    username: &str,
    id: Option<i64>,
) -> anyhow::Result<Notification> {
    let Some(id) = id else {
        anyhow::bail!(BeachDayError::UserDoesntOwnNotification);
    };
    match transaction.find_notification_by_id(id).await? {
        None => anyhow::bail!(BeachDayError::ZeroNotifications),
        Some(notification) if notification.username != username => {
            anyhow::bail!(BeachDayError::UserDoesntOwnNotification)
        }
        Some(notification) => Ok(notification),
    }
}

async fn owned_event(
    transaction: &dyn DataInterfaceAccessTransaction,
    username: &str,
    id: Option<i64>,
) -> anyhow::Result<Event> {
    let Some(id) = id else {
        anyhow::bail!(BeachDayError::UserDoesntOwnEvent);
    };
    match transaction.find_event_by_id(id).await? {
        None => anyhow::bail!(BeachDayError::ZeroEvents),
        Some(event) if event.username != username => {
            anyhow::bail!(BeachDayError::UserDoesntOwnEvent)
        }
        Some(event) => Ok(event),
    }
}

impl BeachDay {
    pub async fn new(beach_day_file: BeachDayFile) -> anyhow::Result<BeachDay> {
        let mut data_interface: Box<dyn DataInterface> = match &beach_day_file.data_interface {
            DataInterfaceType::MySql => {
                Box::new(DataInterfaceMySql::new(beach_day_file.url.clone()))
            }
            DataInterfaceType::Memory => Box::new(DataInterfaceMemory::new()),
        };

        data_interface.init().await?;

        Ok(BeachDay {
            data_interface,
            beach_day_file,
        })
    }

    pub fn with_data_interface(
        data_interface: Box<dyn DataInterface>,
        beach_day_file: BeachDayFile,
    ) -> BeachDay {
        BeachDay {
            data_interface,
            beach_day_file,
        }
    }

    pub async fn create(beach_day_file: BeachDayFile, file_name: PathBuf) -> anyhow::Result<()> {
        beach_day_file.save_file(file_name)?;
        Ok(())
    }

    /// Resolves a client token to the username it was issued for.
    pub fn authenticate(&self, jwt: Option<&str>) -> Result<String, BeachDayError> {
        auth::verify(jwt, &self.beach_day_file.jwt_secret).map(|claims| claims.username)
    }

    pub async fn register(&self, username: String, password: String) -> anyhow::Result<User> {
        if username.is_empty()
            || username.len() > MAX_USERNAME_LEN
            || !validate_alphanumeric(&username)
            || password.is_empty()
        {
            anyhow::bail!(BeachDayError::InvalidRequest);
        }

        let hash = auth::hash_password(password, self.beach_day_file.bcrypt_cost).await?;
        let transaction = self.data_interface.create_transaction().await?;
        if transaction
            .find_user_by_username(username.clone())
            .await?
            .is_some()
        {
            anyhow::bail!(BeachDayError::UserAlreadyExists);
        }
        let created_user = transaction.new_user(User::new(username, hash)).await?;
        transaction.commit().await?;
        tracing::info!("registered user {}", created_user.username);
        Ok(created_user)
    }

    /// Checks the password and returns a fresh token.
    pub async fn log_in(&self, username: String, password: String) -> anyhow::Result<String> {
        let transaction = self.data_interface.create_transaction().await?;
        let user = require_user(&*transaction, &username).await?;
        transaction.rollback().await?;

        if !auth::verify_password(password, user.password).await? {
            anyhow::bail!(BeachDayError::IncorrectPassword);
        }
        auth::sign(
            &user.username,
            &self.beach_day_file.jwt_secret,
            Duration::minutes(self.beach_day_file.token_ttl_minutes),
        )
    }

    pub async fn get_email(&self, username: String) -> anyhow::Result<String> {
        let transaction = self.data_interface.create_transaction().await?;
        let user = require_user(&*transaction, &username).await?;
        Ok(user.email.unwrap_or_else(|| "null".to_owned()))
    }

    pub async fn set_email(&self, username: String, email: Option<String>) -> anyhow::Result<()> {
        let email = email.filter(|email| !email.trim().is_empty());
        if email.as_ref().map_or(false, |email| email.len() > MAX_EMAIL_LEN) {
            anyhow::bail!(BeachDayError::InvalidRequest);
        }
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        transaction.update_user_email(username, email).await?;
        transaction.commit().await?;
        Ok(())
    }

    pub async fn change_password(&self, username: String, password: String) -> anyhow::Result<()> {
        if password.is_empty() {
            anyhow::bail!(BeachDayError::InvalidRequest);
        }
        let hash = auth::hash_password(password, self.beach_day_file.bcrypt_cost).await?;
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        transaction.update_user_password(username, hash).await?;
        transaction.commit().await?;
        Ok(())
    }

    /// Removes the user together with their notifications and events.
    pub async fn delete_account(&self, username: String) -> anyhow::Result<()> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        transaction
            .delete_notifications_by_username(username.clone(), false)
            .await?;
        transaction.delete_events_by_username(username.clone()).await?;
        transaction.delete_user(username.clone()).await?;
        transaction.commit().await?;
        tracing::info!("deleted user {username}");
        Ok(())
    }

    pub async fn get_notifications_enabled(&self, username: String) -> anyhow::Result<bool> {
        let transaction = self.data_interface.create_transaction().await?;
        Ok(require_user(&*transaction, &username)
            .await?
            .notifications_enabled)
    }

    pub async fn set_notifications_enabled(
        &self,
        username: String,
        enabled: bool,
    ) -> anyhow::Result<()> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        transaction
            .update_user_notifications_enabled(username, enabled)
            .await?;
        transaction.commit().await?;
        Ok(())
    }

    pub async fn get_favorites(&self, username: String) -> anyhow::Result<Vec<String>> {
        let transaction = self.data_interface.create_transaction().await?;
        Ok(require_user(&*transaction, &username)
            .await?
            .favorite_beaches
            .into_beaches())
    }

    pub async fn add_favorite(&self, username: String, beach_id: String) -> anyhow::Result<()> {
        if !valid_beach_id(&beach_id) {
            anyhow::bail!(BeachDayError::InvalidRequest);
        }
        let transaction = self.data_interface.create_transaction().await?;
        let mut favorite_beaches = require_user(&*transaction, &username)
            .await?
            .favorite_beaches;
        favorite_beaches.add(&beach_id)?;
        if favorite_beaches.encode().len() > MAX_FAVORITES_LEN {
            anyhow::bail!(BeachDayError::InvalidRequest);
        }
        transaction
            .update_user_favorites(username, favorite_beaches)
            .await?;
        transaction.commit().await?;
        Ok(())
    }

    pub async fn remove_favorite(&self, username: String, beach_id: String) -> anyhow::Result<()> {
        let transaction = self.data_interface.create_transaction().await?;
        let mut favorite_beaches = require_user(&*transaction, &username)
            .await?
            .favorite_beaches;
        favorite_beaches.remove(&beach_id)?;
        transaction
            .update_user_favorites(username, favorite_beaches)
            .await?;
        transaction.commit().await?;
        Ok(())
    }

    pub async fn clear_favorites(&self, username: String) -> anyhow::Result<()> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        transaction
            .update_user_favorites(username, Default::default())
            .await?;
        transaction.commit().await?;
        Ok(())
    }

    pub async fn add_notification(
        &self,
        username: String,
        title: Option<String>,
        message: Option<String>,
    ) -> anyhow::Result<Notification> {
        if title
            .as_ref()
            .map_or(false, |title| title.chars().count() > MAX_NOTIFICATION_TITLE_LEN)
        {
            anyhow::bail!(BeachDayError::InvalidRequest);
        }
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        let created_notification = transaction
            .new_notification(Notification {
                notification_id: None,
                creation_time: Some(now().trunc_subsecs(0)),
                notification_title: title,
                message,
                was_received: false,
                username,
            })
            .await?;
        transaction.commit().await?;
        Ok(created_notification)
    }

    /// Pending notifications only.
    pub async fn count_notifications(&self, username: String) -> anyhow::Result<i64> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        transaction.count_pending_notifications(username).await
    }

    pub async fn receive_notification(&self, username: String, id: Option<i64>) -> anyhow::Result<()> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        let notification = owned_notification(&*transaction, &username, id).await?;
        if let Some(id) = notification.notification_id {
            transaction.mark_notification_received(id).await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    pub async fn get_notifications(
        &self,
        username: String,
        filter: NotificationFilter,
    ) -> anyhow::Result<Vec<NotificationListing>> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        let notifications = transaction
            .find_notifications_by_username(username, filter == NotificationFilter::Pending)
            .await?;
        if notifications.is_empty() {
            anyhow::bail!(BeachDayError::ZeroNotifications);
        }
        Ok(notifications)
    }

    pub async fn get_notification_by_id(
        &self,
        username: String,
        id: Option<i64>,
    ) -> anyhow::Result<Notification> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        owned_notification(&*transaction, &username, id).await
    }

    /// Fails with `ZeroNotifications` when the user has no notifications at
    /// all, even if `removal` would only touch received ones.
    pub async fn remove_notifications(
        &self,
        username: String,
        removal: NotificationRemoval,
    ) -> anyhow::Result<()> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        if transaction
            .find_notifications_by_username(username.clone(), false)
            .await?
            .is_empty()
        {
            anyhow::bail!(BeachDayError::ZeroNotifications);
        }
        transaction
            .delete_notifications_by_username(username, removal == NotificationRemoval::Received)
            .await?;
        transaction.commit().await?;
        Ok(())
    }

    pub async fn remove_notification_by_id(
        &self,
        username: String,
        id: Option<i64>,
    ) -> anyhow::Result<()> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        let notification = owned_notification(&*transaction, &username, id).await?;
        if let Some(id) = notification.notification_id {
            transaction.delete_notification_by_id(id).await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    pub async fn add_event(
        &self,
        username: String,
        time: NaiveDateTime,
        title: Option<String>,
        beach_id: String,
    ) -> anyhow::Result<Event> {
        if !valid_beach_id(&beach_id) {
            anyhow::bail!(BeachDayError::InvalidRequest);
        }
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        let created_event = transaction
            .new_event(Event {
                event_id: None,
                event_time: Some(time),
                event_message: title,
                beach_id: Some(beach_id),
                username,
            })
            .await?;
        transaction.commit().await?;
        Ok(created_event)
    }

    pub async fn count_events(&self, username: String) -> anyhow::Result<i64> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        transaction.count_events(username).await
    }

    pub async fn get_events(
        &self,
        username: String,
        filter: EventFilter,
    ) -> anyhow::Result<Vec<EventListing>> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        let after = match filter {
            EventFilter::Future => Some(now()),
            EventFilter::All => None,
        };
        let events = transaction.find_events_by_username(username, after).await?;
        if events.is_empty() {
            anyhow::bail!(BeachDayError::ZeroEvents);
        }
        Ok(events)
    }

    pub async fn get_event_by_id(&self, username: String, id: Option<i64>) -> anyhow::Result<Event> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        owned_event(&*transaction, &username, id).await
    }

    pub async fn remove_events(&self, username: String) -> anyhow::Result<()> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        if transaction.count_events(username.clone()).await? == 0 {
            anyhow::bail!(BeachDayError::ZeroEvents);
        }
        transaction.delete_events_by_username(username).await?;
        transaction.commit().await?;
        Ok(())
    }

    pub async fn remove_event_by_id(&self, username: String, id: Option<i64>) -> anyhow::Result<()> {
        let transaction = self.data_interface.create_transaction().await?;
        require_user(&*transaction, &username).await?;
        let event = owned_event(&*transaction, &username, id).await?;
        if let Some(id) = event.event_id {
            transaction.delete_event_by_id(id).await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    /// Deletes every event whose time has passed, for all users.
    pub async fn clear_past_events(&self) -> anyhow::Result<u64> {
        let transaction = self.data_interface.create_transaction().await?;
        let removed = transaction.delete_events_before(now()).await?;
        transaction.commit().await?;
        tracing::info!("cleared {removed} past events");
        Ok(removed)
    }
}
