pub mod config;
pub mod domains;
pub mod error;
pub mod repositories;
pub mod service;

pub use domains::Contact;
pub use error::{Error, Result, StoreError};
pub use repositories::ContactStore;
pub use service::{ContactService, IoService};
