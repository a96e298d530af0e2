pub mod memory;
pub mod sql;

use std::collections::HashMap;

use time::Date;

use crate::{domains::Contact, error::StoreError};

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent side of the address book.
///
/// Every call is independent: implementations acquire whatever resources
/// they need for the call and release them before returning.
#[async_trait::async_trait]
pub trait ContactStore: Send + Sync {
    async fn read_all(&self) -> StoreResult<Vec<Contact>>;
    /// Returns the number of rows affected, zero when nobody has that name.
    async fn update_address(&self, first_name: &str, address: &str) -> StoreResult<u64>;
    async fn find_by_name(&self, first_name: &str) -> StoreResult<Vec<Contact>>;
    /// Both bounds are inclusive.
    async fn find_by_date_range(&self, start: Date, end: Date) -> StoreResult<Vec<Contact>>;
    async fn group_by_city_or_state(&self) -> StoreResult<HashMap<String, i64>>;
    /// Persists `contact` and hands back the same fields, without reading
    /// them back from storage.
    async fn insert(&self, contact: &Contact) -> StoreResult<Contact>;
}
