use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{mysql::MySqlPoolOptions, FromRow, MySql, Pool, Transaction};
use tokio::sync::Mutex;

use crate::{
    beach_day_error::BeachDayError,
    data_interface::{DataInterface, DataInterfaceAccessTransaction},
    model::{Event, EventListing, FavoriteBeaches, Notification, NotificationListing, User},
};

const MAX_CONNECTIONS: u32 = 10;

pub struct DataInterfaceMySql {
    url: String,
    connection: Option<Pool<MySql>>,
}

impl DataInterfaceMySql {
    pub fn new(url: String) -> Self {
        DataInterfaceMySql {
            url,
            connection: None,
        }
    }

    pub fn pool(&self) -> anyhow::Result<Pool<MySql>> {
        self.connection
            .clone()
            .ok_or(anyhow::anyhow!("Not connected to a database!"))
    }
}

#[async_trait]
impl DataInterface for DataInterfaceMySql {
    async fn init(&mut self) -> anyhow::Result<()> {
        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(&self.url)
            .await?;
        tracing::info!("connected to mysql");
        self.connection = Some(pool);
        Ok(())
    }

    async fn create_transaction(&self) -> anyhow::Result<Box<dyn DataInterfaceAccessTransaction>> {
        let transaction = self.pool()?.begin().await?;
        Ok(Box::new(Arc::new(Mutex::new(DataInterfaceTransactionMySql {
            transaction: Some(transaction),
        }))))
    }
}

struct DataInterfaceTransactionMySql {
    transaction: Option<Transaction<'static, MySql>>,
}

macro_rules! data_transaction {
    ($dit:ident) => {
        &mut **$dit
            .transaction
            .as_mut()
            .ok_or(anyhow::anyhow!("Already taken"))?
    };
}

#[derive(FromRow)]
struct UserRecord {
    username: String,
    password: String,
    email: Option<String>,
    favorite_beaches: Option<String>,
    timezone: Option<String>,
    notifications_enabled: i64,
    id: i64,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            username: record.username,
            password: record.password,
            email: record.email,
            favorite_beaches: FavoriteBeaches::decode(record.favorite_beaches.as_deref()),
            timezone: record
                .timezone
                .unwrap_or_else(|| crate::model::DEFAULT_TIMEZONE.to_owned()),
            notifications_enabled: record.notifications_enabled != 0,
            id: Some(record.id),
        }
    }
}

#[derive(FromRow)]
struct NotificationRecord {
    notification_id: i64,
    creation_time: Option<NaiveDateTime>,
    notification_title: Option<String>,
    message: Option<String>,
    was_received: i64,
    username: Option<String>,
}

impl From<NotificationRecord> for Notification {
    fn from(record: NotificationRecord) -> Self {
        Notification {
            notification_id: Some(record.notification_id),
            creation_time: record.creation_time,
            notification_title: record.notification_title,
            message: record.message,
            was_received: record.was_received != 0,
            username: record.username.unwrap_or_default(),
        }
    }
}

#[derive(FromRow)]
struct NotificationListingRecord {
    creation_time: Option<NaiveDateTime>,
    notification_title: Option<String>,
    message: Option<String>,
    email: Option<String>,
    notifications_enabled: i64,
    notification_id: i64,
    username: String,
}

impl From<NotificationListingRecord> for NotificationListing {
    fn from(record: NotificationListingRecord) -> Self {
        NotificationListing {
            creation_time: record.creation_time,
            notification_title: record.notification_title,
            message: record.message,
            email: record.email,
            notifications_enabled: record.notifications_enabled != 0,
            notification_id: record.notification_id,
            username: record.username,
        }
    }
}

#[derive(FromRow)]
struct EventRecord {
    event_id: i64,
    event_time: Option<NaiveDateTime>,
    event_message: Option<String>,
    beach_id: Option<String>,
    username: Option<String>,
}

impl From<EventRecord> for Event {
    fn from(record: EventRecord) -> Self {
        Event {
            event_id: Some(record.event_id),
            event_time: record.event_time,
            event_message: record.event_message,
            beach_id: record.beach_id,
            username: record.username.unwrap_or_default(),
        }
    }
}

#[derive(FromRow)]
struct EventListingRecord {
    event_time: Option<NaiveDateTime>,
    event_message: Option<String>,
    beach_id: Option<String>,
    email: Option<String>,
    event_id: i64,
    username: String,
}

impl From<EventListingRecord> for EventListing {
    fn from(record: EventListingRecord) -> Self {
        EventListing {
            event_time: record.event_time,
            event_message: record.event_message,
            beach_id: record.beach_id,
            email: record.email,
            event_id: record.event_id,
            username: record.username,
        }
    }
}

#[derive(FromRow)]
struct CountRecord {
    count: i64,
}

#[async_trait]
impl DataInterfaceAccessTransaction for Arc<Mutex<DataInterfaceTransactionMySql>> {
    async fn commit(&self) -> anyhow::Result<()> {
        self.lock()
            .await
            .transaction
            .take()
            .ok_or(anyhow::anyhow!("Already taken"))?
            .commit()
            .await?;
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        self.lock()
            .await
            .transaction
            .take()
            .ok_or(anyhow::anyhow!("Already taken"))?
            .rollback()
            .await?;
        Ok(())
    }

    async fn new_user(&self, mut user: User) -> anyhow::Result<User> {
        let mut data_interface_transaction = self.lock().await;
        let result = sqlx::query(include_str!("../../mysql_sqls/users/new.sql"))
            .bind(&user.username)
            .bind(&user.password)
            .bind(&user.email)
            .bind(user.favorite_beaches.encode())
            .bind(&user.timezone)
            .bind(user.notifications_enabled)
            .execute(data_transaction!(data_interface_transaction))
            .await;
        match result {
            Ok(done) => {
                user.id = Some(done.last_insert_id() as i64);
                Ok(user)
            }
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                anyhow::bail!(BeachDayError::UserAlreadyExists)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn find_user_by_username(&self, username: String) -> anyhow::Result<Option<User>> {
        let mut data_interface_transaction = self.lock().await;
        let record = sqlx::query_as::<_, UserRecord>(include_str!(
            "../../mysql_sqls/users/find/by_username.sql"
        ))
        .bind(username)
        .fetch_optional(data_transaction!(data_interface_transaction))
        .await?;
        Ok(record.map(User::from))
    }

    async fn update_user_email(
        &self,
        username: String,
        email: Option<String>,
    ) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let result = sqlx::query(include_str!("../../mysql_sqls/users/update_email.sql"))
            .bind(email)
            .bind(username)
            .execute(data_transaction!(data_interface_transaction))
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                anyhow::bail!(BeachDayError::EmailAlreadyInUse)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn update_user_password(&self, username: String, password: String) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        sqlx::query(include_str!("../../mysql_sqls/users/update_password.sql"))
            .bind(password)
            .bind(username)
            .execute(data_transaction!(data_interface_transaction))
            .await?;
        Ok(())
    }

    async fn update_user_favorites(
        &self,
        username: String,
        favorite_beaches: FavoriteBeaches,
    ) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        sqlx::query(include_str!("../../mysql_sqls/users/update_favorites.sql"))
            .bind(favorite_beaches.encode())
            .bind(username)
            .execute(data_transaction!(data_interface_transaction))
            .await?;
        Ok(())
    }

    async fn update_user_notifications_enabled(
        &self,
        username: String,
        notifications_enabled: bool,
    ) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        sqlx::query(include_str!(
            "../../mysql_sqls/users/update_notifications_enabled.sql"
        ))
        .bind(notifications_enabled)
        .bind(username)
        .execute(data_transaction!(data_interface_transaction))
        .await?;
        Ok(())
    }

    async fn delete_user(&self, username: String) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        sqlx::query(include_str!("../../mysql_sqls/users/delete.sql"))
            .bind(username)
            .execute(data_transaction!(data_interface_transaction))
            .await?;
        Ok(())
    }

    async fn new_notification(&self, notification: Notification) -> anyhow::Result<Notification> {
        let mut data_interface_transaction = self.lock().await;
        let id = sqlx::query(include_str!("../../mysql_sqls/notifications/new.sql"))
            .bind(notification.creation_time)
            .bind(&notification.notification_title)
            .bind(&notification.message)
            .bind(notification.was_received)
            .bind(&notification.username)
            .execute(data_transaction!(data_interface_transaction))
            .await?
            .last_insert_id();
        let record = sqlx::query_as::<_, NotificationRecord>(include_str!(
            "../../mysql_sqls/notifications/find/by_id.sql"
        ))
        .bind(id as i64)
        .fetch_one(data_transaction!(data_interface_transaction))
        .await?;
        Ok(record.into())
    }

    async fn find_notification_by_id(&self, id: i64) -> anyhow::Result<Option<Notification>> {
        let mut data_interface_transaction = self.lock().await;
        let record = sqlx::query_as::<_, NotificationRecord>(include_str!(
            "../../mysql_sqls/notifications/find/by_id.sql"
        ))
        .bind(id)
        .fetch_optional(data_transaction!(data_interface_transaction))
        .await?;
        Ok(record.map(Notification::from))
    }

    async fn find_notifications_by_username(
        &self,
        username: String,
        pending_only: bool,
    ) -> anyhow::Result<Vec<NotificationListing>> {
        let mut data_interface_transaction = self.lock().await;
        let sql = if pending_only {
            include_str!("../../mysql_sqls/notifications/find/pending_by_username.sql")
        } else {
            include_str!("../../mysql_sqls/notifications/find/by_username.sql")
        };
        let records = sqlx::query_as::<_, NotificationListingRecord>(sql)
            .bind(username)
            .fetch_all(data_transaction!(data_interface_transaction))
            .await?;
        Ok(records.into_iter().map(NotificationListing::from).collect())
    }

    async fn count_pending_notifications(&self, username: String) -> anyhow::Result<i64> {
        let mut data_interface_transaction = self.lock().await;
        let record = sqlx::query_as::<_, CountRecord>(include_str!(
            "../../mysql_sqls/notifications/count_pending.sql"
        ))
        .bind(username)
        .fetch_one(data_transaction!(data_interface_transaction))
        .await?;
        Ok(record.count)
    }

    async fn mark_notification_received(&self, id: i64) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        sqlx::query(include_str!(
            "../../mysql_sqls/notifications/mark_received.sql"
        ))
        .bind(id)
        .execute(data_transaction!(data_interface_transaction))
        .await?;
        Ok(())
    }

    async fn delete_notification_by_id(&self, id: i64) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        sqlx::query(include_str!(
            "../../mysql_sqls/notifications/delete/by_id.sql"
        ))
        .bind(id)
        .execute(data_transaction!(data_interface_transaction))
        .await?;
        Ok(())
    }

    async fn delete_notifications_by_username(
        &self,
        username: String,
        received_only: bool,
    ) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        let sql = if received_only {
            include_str!("../../mysql_sqls/notifications/delete/received_by_username.sql")
        } else {
            include_str!("../../mysql_sqls/notifications/delete/by_username.sql")
        };
        sqlx::query(sql)
            .bind(username)
            .execute(data_transaction!(data_interface_transaction))
            .await?;
        Ok(())
    }

    async fn new_event(&self, event: Event) -> anyhow::Result<Event> {
        let mut data_interface_transaction = self.lock().await;
        let id = sqlx::query(include_str!("../../mysql_sqls/events/new.sql"))
            .bind(event.event_time)
            .bind(&event.event_message)
            .bind(&event.beach_id)
            .bind(&event.username)
            .execute(data_transaction!(data_interface_transaction))
            .await?
            .last_insert_id();
        let record = sqlx::query_as::<_, EventRecord>(include_str!(
            "../../mysql_sqls/events/find/by_id.sql"
        ))
        .bind(id as i64)
        .fetch_one(data_transaction!(data_interface_transaction))
        .await?;
        Ok(record.into())
    }

    async fn find_event_by_id(&self, id: i64) -> anyhow::Result<Option<Event>> {
        let mut data_interface_transaction = self.lock().await;
        let record = sqlx::query_as::<_, EventRecord>(include_str!(
            "../../mysql_sqls/events/find/by_id.sql"
        ))
        .bind(id)
        .fetch_optional(data_transaction!(data_interface_transaction))
        .await?;
        Ok(record.map(Event::from))
    }

    async fn find_events_by_username(
        &self,
        username: String,
        after: Option<NaiveDateTime>,
    ) -> anyhow::Result<Vec<EventListing>> {
        let mut data_interface_transaction = self.lock().await;
        let records = match after {
            Some(after) => {
                sqlx::query_as::<_, EventListingRecord>(include_str!(
                    "../../mysql_sqls/events/find/future_by_username.sql"
                ))
                .bind(username)
                .bind(after)
                .fetch_all(data_transaction!(data_interface_transaction))
                .await?
            }
            None => {
                sqlx::query_as::<_, EventListingRecord>(include_str!(
                    "../../mysql_sqls/events/find/by_username.sql"
                ))
                .bind(username)
                .fetch_all(data_transaction!(data_interface_transaction))
                .await?
            }
        };
        Ok(records.into_iter().map(EventListing::from).collect())
    }

    async fn count_events(&self, username: String) -> anyhow::Result<i64> {
        let mut data_interface_transaction = self.lock().await;
        let record = sqlx::query_as::<_, CountRecord>(include_str!(
            "../../mysql_sqls/events/count.sql"
        ))
        .bind(username)
        .fetch_one(data_transaction!(data_interface_transaction))
        .await?;
        Ok(record.count)
    }

    async fn delete_event_by_id(&self, id: i64) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        sqlx::query(include_str!("../../mysql_sqls/events/delete/by_id.sql"))
            .bind(id)
            .execute(data_transaction!(data_interface_transaction))
            .await?;
        Ok(())
    }

    async fn delete_events_by_username(&self, username: String) -> anyhow::Result<()> {
        let mut data_interface_transaction = self.lock().await;
        sqlx::query(include_str!(
            "../../mysql_sqls/events/delete/by_username.sql"
        ))
        .bind(username)
        .execute(data_transaction!(data_interface_transaction))
        .await?;
        Ok(())
    }

    async fn delete_events_before(&self, before: NaiveDateTime) -> anyhow::Result<u64> {
        let mut data_interface_transaction = self.lock().await;
        let done = sqlx::query(include_str!("../../mysql_sqls/events/delete/before.sql"))
            .bind(before)
            .execute(data_transaction!(data_interface_transaction))
            .await?;
        Ok(done.rows_affected())
    }
}
