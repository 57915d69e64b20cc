//! Conversions from external infrastructure errors into domain errors.

use fintrack_common::storage::StorageError;
use fintrack_domain::FinTrackError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub FinTrackError);

impl From<InfraError> for FinTrackError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<FinTrackError> for InfraError {
    fn from(value: FinTrackError) -> Self {
        InfraError(value)
    }
}

trait IntoFinTrackError {
    fn into_fintrack(self) -> FinTrackError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → FinTrackError */
/* -------------------------------------------------------------------------- */

impl IntoFinTrackError for SqlError {
    fn into_fintrack(self) -> FinTrackError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        FinTrackError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        FinTrackError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        FinTrackError::Conflict("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        FinTrackError::Database("foreign key constraint violation".into())
                    }
                    _ => FinTrackError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => FinTrackError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                FinTrackError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                FinTrackError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                FinTrackError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidPath(path) => FinTrackError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => FinTrackError::Database("invalid SQL query".into()),
            other => FinTrackError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_fintrack())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError → FinTrackError */
/* -------------------------------------------------------------------------- */

impl IntoFinTrackError for StorageError {
    fn into_fintrack(self) -> FinTrackError {
        match self {
            StorageError::Rusqlite(err) => err.into_fintrack(),
            StorageError::InvalidConfig(message) => FinTrackError::Config(message),
            other => FinTrackError::Database(other.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_fintrack())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → FinTrackError */
/* -------------------------------------------------------------------------- */

impl IntoFinTrackError for HttpError {
    fn into_fintrack(self) -> FinTrackError {
        if self.is_timeout() {
            return FinTrackError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return FinTrackError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => FinTrackError::Auth(message),
                404 => FinTrackError::NotFound(message),
                409 => FinTrackError::Conflict(message),
                429 => FinTrackError::Network(message),
                400..=499 => FinTrackError::InvalidInput(message),
                _ => FinTrackError::Network(message),
            };
        }

        if self.is_decode() {
            return FinTrackError::InvalidInput(format!("undecodable response body: {self}"));
        }

        FinTrackError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_fintrack())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
