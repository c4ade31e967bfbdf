use thiserror::Error;

/// Failures a request can end in. The display text is what clients see in the
/// `message` field of the response body.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeachDayError {
    #[error("This user already exists.")]
    UserAlreadyExists,
    #[error("This email is already in use.")]
    EmailAlreadyInUse,
    #[error("This user does not exist.")]
    UserNotFound,
    #[error("Password is incorrect.")]
    IncorrectPassword,
    #[error("User authentication token absent or invalid.")]
    InvalidToken,
    #[error("Beach is already in favorites.")]
    BeachAlreadyFavorited,
    #[error("Attempted to remove beach not in favorites.")]
    BeachNotPresent,
    #[error("Beach does not exist.")]
    BeachNotFound,
    #[error("No notifications of specified type.")]
    ZeroNotifications,
    #[error("No events of specified type.")]
    ZeroEvents,
    #[error("User does not own this notification.")]
    UserDoesntOwnNotification,
    #[error("User does not own this event.")]
    UserDoesntOwnEvent,
    #[error("Invalid request.")]
    InvalidRequest,
    #[error("Trouble accessing database.")]
    ProblemWithDb,
}

impl BeachDayError {
    /// Recovers the domain error carried by `error`. Anything that was not
    /// raised as a `BeachDayError` is a storage failure.
    pub fn from_anyhow(error: &anyhow::Error) -> BeachDayError {
        match error.downcast_ref::<BeachDayError>() {
            Some(beach_day_error) => *beach_day_error,
            None => BeachDayError::ProblemWithDb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bail_with(error: BeachDayError) -> anyhow::Result<()> {
        anyhow::bail!(error)
    }

    #[test]
    fn domain_errors_survive_anyhow() {
        let error = bail_with(BeachDayError::BeachNotPresent).unwrap_err();
        assert_eq!(
            BeachDayError::from_anyhow(&error),
            BeachDayError::BeachNotPresent
        );
    }

    #[test]
    fn context_does_not_hide_domain_errors() {
        let error = bail_with(BeachDayError::UserNotFound)
            .map_err(|e| e.context("loading favorites"))
            .unwrap_err();
        assert_eq!(BeachDayError::from_anyhow(&error), BeachDayError::UserNotFound);
    }

    #[test]
    fn foreign_errors_are_database_problems() {
        let error = anyhow::Error::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "gone",
        ));
        assert_eq!(BeachDayError::from_anyhow(&error), BeachDayError::ProblemWithDb);
        assert_eq!(
            BeachDayError::ProblemWithDb.to_string(),
            "Trouble accessing database."
        );
    }
}
