use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;

use crate::beach_day_error::BeachDayError;

/// Value the favorites column holds when a user has no favorites.
pub const NULL_BEACH: &str = "NULL_BEACH";
pub const DEFAULT_TIMEZONE: &str = "GMT";

pub const MAX_USERNAME_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 50;
pub const MAX_BEACH_ID_LEN: usize = 10;
pub const MAX_FAVORITES_LEN: usize = 3000;
pub const MAX_NOTIFICATION_TITLE_LEN: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    /// bcrypt hash, never the plain password.
    pub password: String,
    pub email: Option<String>,
    pub favorite_beaches: FavoriteBeaches,
    pub timezone: String,
    pub notifications_enabled: bool,
    pub id: Option<i64>,
}

impl User {
    pub fn new(username: String, password_hash: String) -> User {
        User {
            username,
            password: password_hash,
            email: None,
            favorite_beaches: FavoriteBeaches::default(),
            timezone: DEFAULT_TIMEZONE.to_owned(),
            notifications_enabled: false,
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub notification_id: Option<i64>,
    pub creation_time: Option<NaiveDateTime>,
    pub notification_title: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "wasReceived")]
    pub was_received: bool,
    pub username: String,
}

/// A notification joined with its owner's contact settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationListing {
    pub creation_time: Option<NaiveDateTime>,
    pub notification_title: Option<String>,
    pub message: Option<String>,
    pub email: Option<String>,
    pub notifications_enabled: bool,
    pub notification_id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event_id: Option<i64>,
    pub event_time: Option<NaiveDateTime>,
    pub event_message: Option<String>,
    pub beach_id: Option<String>,
    pub username: String,
}

/// An event joined with its owner's email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventListing {
    pub event_time: Option<NaiveDateTime>,
    pub event_message: Option<String>,
    pub beach_id: Option<String>,
    pub email: Option<String>,
    pub event_id: i64,
    pub username: String,
}

/// A user's favorite beaches, stored as one comma separated column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteBeaches(Vec<String>);

impl FavoriteBeaches {
    pub fn decode(column: Option<&str>) -> FavoriteBeaches {
        match column {
            None => FavoriteBeaches::default(),
            Some(column) if column == NULL_BEACH || column.trim().is_empty() => {
                FavoriteBeaches::default()
            }
            Some(column) => FavoriteBeaches(
                column
                    .split(',')
                    .map(str::trim)
                    .filter(|beach| !beach.is_empty())
                    .map(str::to_owned)
                    .collect(),
            ),
        }
    }

    pub fn encode(&self) -> String {
        if self.0.is_empty() {
            NULL_BEACH.to_owned()
        } else {
            self.0.join(",")
        }
    }

    pub fn beaches(&self) -> &[String] {
        &self.0
    }

    pub fn into_beaches(self) -> Vec<String> {
        self.0
    }

    pub fn contains(&self, beach: &str) -> bool {
        self.0.iter().any(|favorite| favorite == beach)
    }

    pub fn add(&mut self, beach: &str) -> Result<(), BeachDayError> {
        if self.contains(beach) {
            return Err(BeachDayError::BeachAlreadyFavorited);
        }
        self.0.push(beach.to_owned());
        Ok(())
    }

    pub fn remove(&mut self, beach: &str) -> Result<(), BeachDayError> {
        if !self.contains(beach) {
            return Err(BeachDayError::BeachNotPresent);
        }
        self.0.retain(|favorite| favorite != beach);
        Ok(())
    }
}

/// Usernames and beach ids are restricted to `[a-zA-Z0-9_]`.
pub fn validate_alphanumeric(input: &str) -> bool {
    input
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || character == '_')
}

/// Reads an event time sent by a client. Offsets are folded into UTC, and
/// times without one are taken as UTC already.
pub fn parse_event_time(input: &str) -> Result<NaiveDateTime, BeachDayError> {
    let input = input.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(input) {
        return Ok(time.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .ok_or(BeachDayError::InvalidRequest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn empty_favorites_columns() {
        assert!(FavoriteBeaches::decode(None).beaches().is_empty());
        assert!(FavoriteBeaches::decode(Some(NULL_BEACH)).beaches().is_empty());
        assert!(FavoriteBeaches::decode(Some("   ")).beaches().is_empty());
        assert_eq!(FavoriteBeaches::default().encode(), NULL_BEACH);
    }

    #[test]
    fn favorites_column_is_trimmed() {
        let favorites = FavoriteBeaches::decode(Some(" CA123, ,FL_9 ,"));
        assert_eq!(favorites.beaches(), ["CA123", "FL_9"]);
        assert_eq!(favorites.encode(), "CA123,FL_9");
    }

    #[test]
    fn adding_and_removing_favorites() {
        let mut favorites = FavoriteBeaches::default();
        favorites.add("CA123").unwrap();
        favorites.add("HI7").unwrap();
        assert_eq!(
            favorites.add("CA123"),
            Err(BeachDayError::BeachAlreadyFavorited)
        );
        favorites.remove("CA123").unwrap();
        assert_eq!(favorites.remove("CA123"), Err(BeachDayError::BeachNotPresent));
        assert_eq!(favorites.encode(), "HI7");
        favorites.remove("HI7").unwrap();
        assert_eq!(favorites.encode(), NULL_BEACH);
    }

    #[test]
    fn alphanumeric_validation() {
        assert!(validate_alphanumeric("beach_fan_42"));
        assert!(validate_alphanumeric(""));
        assert!(!validate_alphanumeric("robert'); DROP TABLE users;--"));
        assert!(!validate_alphanumeric("CA1,CA2"));
        assert!(!validate_alphanumeric("plage-été"));
    }

    #[test]
    fn event_times() {
        let noon = NaiveDate::from_ymd_opt(2025, 7, 4)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(parse_event_time("2025-07-04T12:00:00Z"), Ok(noon));
        assert_eq!(parse_event_time("2025-07-04T08:00:00-04:00"), Ok(noon));
        assert_eq!(parse_event_time("2025-07-04 12:00:00"), Ok(noon));
        assert_eq!(parse_event_time("2025-07-04T12:00"), Ok(noon));
        assert_eq!(
            parse_event_time("next tuesday"),
            Err(BeachDayError::InvalidRequest)
        );
    }
}
