pub mod customer;
pub mod invoice;
pub mod organization;
pub mod role;
pub mod user;

use uuid::Uuid;

use crate::errors::AppError;

/// Parse a TEXT uuid column. Ids are stored canonically hyphenated; a row
/// that fails to parse is corrupt data, not a caller error.
pub(crate) fn parse_uuid(raw: &str, column: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|err| AppError::internal(format!("invalid uuid in column {column}: {err}")))
}

pub(crate) fn parse_uuid_opt(raw: Option<&str>, column: &str) -> Result<Option<Uuid>, AppError> {
    raw.map(|value| parse_uuid(value, column)).transpose()
}
