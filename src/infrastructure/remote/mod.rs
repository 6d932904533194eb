pub mod memory;
pub mod rest_client;

pub use memory::{InMemoryRemoteStore, RemoteTicket};
pub use rest_client::RestRemoteStore;
