pub mod offline_store;
pub mod remote_store;

pub use offline_store::OfflineStore;
pub use remote_store::{RemoteError, RemoteStore};
