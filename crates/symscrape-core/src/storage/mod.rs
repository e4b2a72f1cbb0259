pub mod sqlite;

pub use sqlite::SqliteMarkerStore;
