use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrate() -> ServiceResult<()> {
        Err(sqlx::migrate::MigrateError::VersionMissing(1))?
    }

    #[test]
    fn migration_failures_keep_their_kind() {
        let err = migrate().expect_err("missing version");
        assert!(matches!(err, ServiceError::Migrate(_)));
        assert!(err.to_string().starts_with("migration error: "));
    }
}
