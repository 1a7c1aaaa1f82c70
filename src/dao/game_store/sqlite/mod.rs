mod error;
mod migrations;
mod store;

pub use error::SqliteDaoError;
pub use store::SqliteGameStore;

use crate::dao::storage::StorageError;

impl From<SqliteDaoError> for StorageError {
    fn from(err: SqliteDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
