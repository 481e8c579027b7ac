//! Wraps every `sqlx::Error` this crate produces with the query text that
//! caused it, following the `DatabaseError::query(query, e)` convention used
//! throughout the per-entity query modules.

use net_core::NetworkError;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("query failed: {query}: {source}")]
    Query {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error(transparent)]
    Domain(#[from] NetworkError),
}

impl DatabaseError {
    pub fn query(query: impl Into<String>, source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::RowNotFound => Self::NotFound,
            source => Self::Query {
                query: query.into(),
                source,
            },
        }
    }

    pub fn connection(source: sqlx::Error) -> Self {
        Self::Connection(source)
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
