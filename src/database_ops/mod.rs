pub mod copy;
pub mod db;
#[cfg(test)]
pub mod memory;
pub mod schema;
pub mod store;

pub use db::PgImportStore;
pub use store::{CompletionRecord, ImportStore};
