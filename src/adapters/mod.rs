pub mod console;
pub mod export;
pub mod ldap;
pub mod memory;

#[cfg(feature = "cli")]
pub use console::ConsolePrompt;
pub use console::ScriptedPrompt;
pub use ldap::LdapDirectory;
pub use memory::InMemoryDirectory;
