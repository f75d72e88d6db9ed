pub mod config;
pub mod client;
pub mod store;

pub use config::FirebaseConfig;
pub use client::FirebaseStore;
pub use store::{StateStore, StoreError};
