//! Port implementations shipped with the runtime.

pub mod json_store;
pub mod log_notifier;
pub mod memory;

pub use json_store::JsonFileBindingStore;
pub use log_notifier::LogNotifier;
pub use memory::{BindingTable, InMemoryBindingStore, InMemoryDirectory};
