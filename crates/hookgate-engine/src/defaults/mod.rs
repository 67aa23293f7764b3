//! Default collaborator implementations.
//!
//! In-memory and no-script variants suitable for tests and lightweight
//! embedding; the HTTP transport default is a real `reqwest`-backed client.

mod directory;
mod history;
mod script;
mod settings;
mod transport;

pub use directory::InMemoryChatDirectory;
pub use history::InMemoryHistorySink;
pub use script::DefaultScriptEngine;
pub use settings::StaticSettings;
pub use transport::ReqwestTransport;
