pub mod scripted;
pub mod ssh;
pub mod types;

pub use scripted::{ScriptedConnector, ScriptedHost};
pub use ssh::{SshConnector, SshOptions};
pub use types::{RemoteConnector, RemoteError, RemoteSession};
