pub mod command;
pub mod connection;
pub mod lifecycle;
pub mod query;

pub use crate::domain::model::{GroupRecord, NewUser, UserRecord};
pub use crate::domain::ports::{DirectoryConnector, DirectorySession, PromptProvider};
pub use crate::utils::error::Result;
