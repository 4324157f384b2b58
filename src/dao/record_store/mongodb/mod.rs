//! MongoDB backend. Without multi-document transactions, compare-and-set writes are
//! single-document `find_one_and_update` calls filtered on the expected state, and the
//! approved seat count is kept on the match document.

mod config;
mod connection;
mod error;
mod models;
mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoRecordStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Corrupted {
                collection,
                message,
            } => StorageError::corrupted(collection, message),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
