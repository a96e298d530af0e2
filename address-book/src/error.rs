use tokio::task::JoinError;

/// Failures reported by a [`ContactStore`](crate::repositories::ContactStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to acquire a database connection: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("statement failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error("failed to decode row: {0}")]
    Decode(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error::*;

        match err {
            Configuration(_) | Io(_) | Tls(_) | PoolTimedOut | PoolClosed | WorkerCrashed => {
                Self::Connection(err)
            }
            ColumnNotFound(_) | ColumnIndexOutOfBounds { .. } | ColumnDecode { .. } | Decode(_) => {
                Self::Decode(err)
            }
            _ => Self::Query(err),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no contact named {name:?} in the store")]
    NotInStore { name: String },
    #[error("failed to insert contact {name:?}: {source}")]
    Insert {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("bulk insert was cancelled")]
    Cancelled,
    #[error("insert task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
