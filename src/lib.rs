pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use adapters::ConsolePrompt;
#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{InMemoryDirectory, LdapDirectory, ScriptedPrompt};
pub use config::DirectorySettings;
pub use core::command::{Command, CommandRunner};
pub use core::lifecycle::{DisableOutcome, DisableStatus, UserLifecycleService};
pub use core::query::DirectoryQueryService;
pub use utils::error::{AdError, Result};
