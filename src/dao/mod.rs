/// Row-level change feed shared by every record store.
pub mod change_feed;
/// Entity definitions persisted by the record stores.
pub mod models;
/// Record store abstraction and its backends.
pub mod record_store;
/// Backend-agnostic storage errors.
pub mod storage;
