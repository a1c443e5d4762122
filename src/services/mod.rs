// Order lifecycle and shop-floor accounting
pub mod orders;
pub mod reports;
pub mod work_time;

// Catalogs
pub mod materials;
pub mod operations;
pub mod tech_processes;
pub mod users;

// External Services
pub mod catalog_sync;

use crate::errors::ServiceError;
use rust_decimal::Decimal;
use sea_orm::{DbErr, SqlErr};
use validator::ValidationError;

/// Turns a unique-index violation into `Conflict`; everything else stays a database error.
pub(crate) fn map_write_error(err: DbErr, conflict: impl FnOnce() -> String) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(conflict()),
        _ => ServiceError::db_error(err),
    }
}

pub(crate) fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(validate_non_negative(&dec!(0)).is_ok());
        assert!(validate_non_negative(&dec!(12.5)).is_ok());
        assert!(validate_non_negative(&dec!(-0.01)).is_err());
    }

    #[test]
    fn non_unique_errors_stay_database_errors() {
        let err = map_write_error(DbErr::Custom("boom".into()), || "dup".into());
        assert!(matches!(err, ServiceError::DatabaseError(_)));
    }
}
