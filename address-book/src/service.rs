use std::{collections::HashMap, sync::Arc};

use time::Date;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    domains::Contact,
    error::{Error, Result},
    repositories::ContactStore,
};

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Where an operation reads from and writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoService {
    /// Backed by the contact store.
    Db,
    /// Only the in-memory cache, kept in sync by an outside REST server.
    Rest,
}

/// Address book operations over a cache of contacts mirrored from a
/// [`ContactStore`].
pub struct ContactService {
    store: Arc<dyn ContactStore + Send + Sync>,
    contacts: Vec<Contact>,
    location_counts: HashMap<String, i64>,
    max_concurrency: usize,
}

impl ContactService {
    pub fn new(store: Arc<dyn ContactStore + Send + Sync>) -> Self {
        Self::with_contacts(store, Vec::new())
    }

    pub fn with_contacts(store: Arc<dyn ContactStore + Send + Sync>, contacts: Vec<Contact>) -> Self {
        Self {
            store,
            contacts,
            location_counts: HashMap::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Caps the inserts in flight during a concurrent bulk add. Zero is
    /// treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn location_counts(&self) -> &HashMap<String, i64> {
        &self.location_counts
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_from_store(&mut self) -> Result<&[Contact]> {
        self.contacts = self.store.read_all().await?;
        tracing::debug!(count = self.contacts.len(), "cache reloaded");

        Ok(&self.contacts)
    }

    pub async fn read_data(&mut self, io: IoService) -> Result<&[Contact]> {
        match io {
            IoService::Db => self.load_from_store().await,
            IoService::Rest => Ok(&self.contacts),
        }
    }

    pub fn count(&self, _io: IoService) -> usize {
        self.contacts.len()
    }

    pub fn find_by_first_name(&self, name: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.first_name == name)
    }

    fn find_by_first_name_mut(&mut self, name: &str) -> Option<&mut Contact> {
        self.contacts.iter_mut().find(|c| c.first_name == name)
    }

    /// Updates the stored address, then the cached one.
    ///
    /// When the store reports no affected rows the cache is left as it is and
    /// `Ok(0)` is returned; that is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn update_address(&mut self, name: &str, address: &str) -> Result<u64> {
        let rows = self.store.update_address(name, address).await?;
        if rows == 0 {
            tracing::debug!("no stored contact matched, cache untouched");
            return Ok(0);
        }

        if let Some(contact) = self.find_by_first_name_mut(name) {
            contact.address = address.to_string();
        }

        Ok(rows)
    }

    /// Compares the first stored contact named `name` with the cached one.
    /// A name missing from the cache is simply out of sync.
    #[tracing::instrument(skip(self))]
    pub async fn is_consistent_with_store(&self, name: &str) -> Result<bool> {
        let stored = self.store.find_by_name(name).await?;
        let Some(stored) = stored.first() else {
            return Err(Error::NotInStore {
                name: name.to_string(),
            });
        };

        Ok(self.find_by_first_name(name) == Some(stored))
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_by_date_range(&mut self, start: Date, end: Date) -> Result<&[Contact]> {
        self.contacts = self.store.find_by_date_range(start, end).await?;

        Ok(&self.contacts)
    }

    #[tracing::instrument(skip(self))]
    pub async fn group_by_location(&mut self) -> Result<&HashMap<String, i64>> {
        self.location_counts = self.store.group_by_city_or_state().await?;

        Ok(&self.location_counts)
    }

    #[tracing::instrument(skip(self, contact), fields(first_name = %contact.first_name))]
    pub async fn add_and_persist(&mut self, contact: Contact) -> Result<Contact> {
        let inserted = self
            .store
            .insert(&contact)
            .await
            .map_err(|source| Error::Insert {
                name: contact.first_name.clone(),
                source,
            })?;

        self.contacts.push(inserted.clone());
        tracing::info!("contact added");

        Ok(inserted)
    }

    /// Inserts one contact after the other, stopping at the first failure.
    /// Contacts inserted before the failure stay cached.
    pub async fn add_all_and_persist(&mut self, contacts: Vec<Contact>) -> Result<()> {
        for contact in contacts {
            self.add_and_persist(contact).await?;
        }
        tracing::debug!(count = self.contacts.len(), "sequential add finished");

        Ok(())
    }

    pub async fn add_and_persist_concurrently(&mut self, contacts: Vec<Contact>) -> Result<()> {
        self.add_and_persist_concurrently_until(contacts, CancellationToken::new())
            .await
    }

    /// Inserts every contact on its own task, at most `max_concurrency` at a
    /// time, and returns once all of them have finished.
    ///
    /// The first failure cancels the inserts that have not completed yet and
    /// is returned. Cancelling `cancel` stops the whole batch. Either way,
    /// contacts whose inserts completed are appended to the cache, in
    /// completion order. An insert cancelled while its statement was running
    /// may still have reached the store; its contact is not cached.
    #[tracing::instrument(skip_all, fields(count = contacts.len()))]
    pub async fn add_and_persist_concurrently_until(
        &mut self,
        contacts: Vec<Contact>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let batch = cancel.child_token();
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for contact in contacts {
            let store = Arc::clone(&self.store);
            let permits = Arc::clone(&permits);
            let batch = batch.clone();

            tasks.spawn(async move {
                let name = contact.first_name.clone();

                let _permit = tokio::select! {
                    biased;
                    _ = batch.cancelled() => return Err(Error::Cancelled),
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Err(Error::Cancelled),
                    },
                };

                tracing::info!(%name, "adding contact");
                let inserted = tokio::select! {
                    biased;
                    _ = batch.cancelled() => return Err(Error::Cancelled),
                    inserted = store.insert(&contact) => inserted,
                };

                match inserted {
                    Ok(inserted) => {
                        tracing::info!(%name, "contact added");
                        Ok(inserted)
                    }
                    Err(source) => Err(Error::Insert { name, source }),
                }
            });
        }

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(Error::from).and_then(|inserted| inserted) {
                Ok(contact) => self.contacts.push(contact),
                Err(err) => {
                    if first_err.is_none() {
                        tracing::warn!(%err, "bulk insert failed, cancelling the rest");
                        batch.cancel();
                        first_err = Some(err);
                    }
                }
            }
        }

        tracing::debug!(cached = self.contacts.len(), "bulk insert finished");
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Appends to the cache without touching the store. Only applies to
    /// [`IoService::Rest`].
    pub fn add_to_cache(&mut self, contact: Contact, io: IoService) {
        if io == IoService::Rest {
            self.contacts.push(contact);
        }
    }

    /// Changes the cached address without touching the store. Only applies
    /// to [`IoService::Rest`].
    pub fn update_cached_address(&mut self, name: &str, address: &str, io: IoService) {
        if io != IoService::Rest {
            return;
        }

        if let Some(contact) = self.find_by_first_name_mut(name) {
            contact.address = address.to_string();
        }
    }

    /// Drops the first cached contact named `name`. Only applies to
    /// [`IoService::Rest`].
    pub fn remove_from_cache(&mut self, name: &str, io: IoService) -> Option<Contact> {
        if io != IoService::Rest {
            return None;
        }

        let index = self.contacts.iter().position(|c| c.first_name == name)?;
        Some(self.contacts.remove(index))
    }
}
