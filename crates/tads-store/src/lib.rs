pub mod cursor;
pub mod error;
pub mod history;
pub mod locks;
pub mod sqlite;
pub mod store;
pub mod stream;

pub use error::StoreError;
pub use history::HistoryService;
pub use locks::SessionLocks;
pub use sqlite::SqliteStore;
pub use store::RecordStore;
pub use stream::ChatStreamWriter;
