pub mod server_state;

pub use server_state::{Client, Group, ServerInfo, ServerState, Source, SourceStatus};
