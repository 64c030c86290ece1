//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use sellerscan_domain::SellerScanError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SellerScanError);

impl From<InfraError> for SellerScanError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SellerScanError> for InfraError {
    fn from(value: SellerScanError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoSellerScanError {
    fn into_sellerscan(self) -> SellerScanError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → SellerScanError */
/* -------------------------------------------------------------------------- */

impl IntoSellerScanError for SqlError {
    fn into_sellerscan(self) -> SellerScanError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        SellerScanError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        SellerScanError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        SellerScanError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        SellerScanError::Database("foreign key constraint violation".into())
                    }
                    _ => SellerScanError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => {
                SellerScanError::NotFound("no rows returned by query".into())
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                SellerScanError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                SellerScanError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => SellerScanError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => SellerScanError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_sellerscan())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → SellerScanError */
/* -------------------------------------------------------------------------- */

impl IntoSellerScanError for r2d2::Error {
    fn into_sellerscan(self) -> SellerScanError {
        SellerScanError::Database(format!("connection pool unavailable: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_sellerscan())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SellerScanError */
/* -------------------------------------------------------------------------- */

impl IntoSellerScanError for HttpError {
    fn into_sellerscan(self) -> SellerScanError {
        if self.is_builder() {
            return SellerScanError::Config(format!("invalid HTTP client setup: {self}"));
        }
        SellerScanError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_sellerscan())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
