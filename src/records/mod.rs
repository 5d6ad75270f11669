pub mod commands;
pub mod export;
pub mod models;
pub mod store;
pub mod table;

pub use models::{Entry, ValidationError};
pub use store::{RecordError, RecordStore};
pub use table::RecordTable;
