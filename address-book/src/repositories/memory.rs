//! In-process [`ContactStore`], used by tests and local runs without a
//! database.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use time::Date;

use crate::{domains::Contact, error::StoreError};

use super::{ContactStore, StoreResult};

#[derive(Default)]
pub struct MemoryContactStore {
    rows: Mutex<Vec<Contact>>,
    failing_inserts: Mutex<HashSet<String>>,
    insert_delay: Option<Duration>,
    unavailable: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = Contact>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Makes every insert sleep for `delay` before it lands.
    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    /// Inserts of contacts with this first name fail with a query error.
    pub fn fail_inserts_for(&self, first_name: impl Into<String>) {
        lock(&self.failing_inserts).insert(first_name.into());
    }

    /// While set, every operation other than `insert` fails as if no
    /// connection could be acquired.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<Contact> {
        lock(&self.rows).clone()
    }

    /// Highest number of inserts observed running at the same time.
    pub fn peak_concurrent_inserts(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(sqlx::Error::PoolTimedOut));
        }

        Ok(())
    }

    async fn insert_row(&self, contact: &Contact) -> StoreResult<Contact> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }

        if lock(&self.failing_inserts).contains(&contact.first_name) {
            let msg = format!("insert rejected for {}", contact.first_name);
            return Err(StoreError::Query(sqlx::Error::Protocol(msg)));
        }

        lock(&self.rows).push(contact.clone());
        Ok(contact.clone())
    }
}

/// Decrements the in-flight counter even when the insert future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// A poisoned lock only means another test thread panicked mid-push; the rows
// are still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

#[async_trait::async_trait]
impl ContactStore for MemoryContactStore {
    async fn read_all(&self) -> StoreResult<Vec<Contact>> {
        self.check_available()?;
        Ok(self.rows())
    }

    async fn update_address(&self, first_name: &str, address: &str) -> StoreResult<u64> {
        self.check_available()?;
        let mut rows = lock(&self.rows);
        let mut affected = 0;
        for contact in rows.iter_mut().filter(|c| c.first_name == first_name) {
            contact.address = address.to_string();
            affected += 1;
        }

        Ok(affected)
    }

    async fn find_by_name(&self, first_name: &str) -> StoreResult<Vec<Contact>> {
        self.check_available()?;
        let rows = lock(&self.rows);
        Ok(rows
            .iter()
            .filter(|c| c.first_name == first_name)
            .cloned()
            .collect())
    }

    async fn find_by_date_range(&self, start: Date, end: Date) -> StoreResult<Vec<Contact>> {
        self.check_available()?;
        let rows = lock(&self.rows);
        Ok(rows
            .iter()
            .filter(|c| c.start_date.is_some_and(|d| start <= d && d <= end))
            .cloned()
            .collect())
    }

    async fn group_by_city_or_state(&self) -> StoreResult<HashMap<String, i64>> {
        self.check_available()?;
        let rows = lock(&self.rows);
        let mut counts = HashMap::new();
        for contact in rows.iter() {
            *counts.entry(contact.location().to_string()).or_insert(0) += 1;
        }

        Ok(counts)
    }

    async fn insert(&self, contact: &Contact) -> StoreResult<Contact> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        self.insert_row(contact).await
    }
}
