use std::{sync::Arc, time::Duration};

use address_book::{
    repositories::memory::MemoryContactStore, Contact, ContactService, ContactStore, Error,
    IoService, StoreError,
};
use time::macros::date;
use tokio_util::sync::CancellationToken;

fn amit() -> Contact {
    Contact {
        first_name: "Amit".into(),
        last_name: "Kumar".into(),
        address: "MG Road".into(),
        city: "Pune".into(),
        state: "MH".into(),
        zip: 411001,
        phone_number: 9876543210,
        email: "a@x.com".into(),
        address_book_name: "Family".into(),
        address_book_type: Some("REST".into()),
        start_date: None,
    }
}

fn new_contact(first_name: &str, city: &str) -> Contact {
    Contact {
        first_name: first_name.into(),
        last_name: "Rao".into(),
        address: format!("{first_name} lane"),
        city: city.into(),
        state: "KA".into(),
        zip: 560001,
        phone_number: 9000000000,
        email: format!("{}@x.com", first_name.to_lowercase()),
        address_book_name: "Friends".into(),
        ..Contact::default()
    }
    .with_start_date(date!(2023 - 05 - 01))
}

fn service_over(store: &Arc<MemoryContactStore>) -> ContactService {
    ContactService::new(Arc::clone(store) as Arc<dyn ContactStore + Send + Sync>)
}

#[tokio::test]
async fn loads_finds_and_updates_a_stored_contact() {
    let store = Arc::new(MemoryContactStore::with_rows([amit()]));
    let mut service = service_over(&store);

    service.load_from_store().await.unwrap();
    assert_eq!(service.find_by_first_name("Amit"), Some(&amit()));

    let rows = service.update_address("Amit", "New Road").await.unwrap();

    assert_eq!(rows, 1);
    assert_eq!(service.find_by_first_name("Amit").unwrap().address, "New Road");
    assert!(service.is_consistent_with_store("Amit").await.unwrap());
}

#[tokio::test]
async fn reloading_an_unchanged_store_is_idempotent() {
    let store = Arc::new(MemoryContactStore::with_rows([
        amit(),
        new_contact("Ravi", "Bengaluru"),
    ]));
    let mut service = service_over(&store);

    let first = service.load_from_store().await.unwrap().to_vec();
    let second = service.read_data(IoService::Db).await.unwrap().to_vec();

    assert_eq!(first, second);
    assert_eq!(service.count(IoService::Db), 2);
}

#[tokio::test]
async fn consistency_check_reports_missing_contact() {
    let store = Arc::new(MemoryContactStore::with_rows([amit()]));
    let mut service = service_over(&store);
    service.load_from_store().await.unwrap();

    let err = service.is_consistent_with_store("Ghost").await.unwrap_err();

    assert!(matches!(err, Error::NotInStore { ref name } if name == "Ghost"));
}

#[tokio::test]
async fn consistency_check_uses_name_and_address_only() {
    let store = Arc::new(MemoryContactStore::with_rows([amit()]));
    let cached = Contact {
        phone_number: 1234567890,
        city: "Mumbai".into(),
        ..amit()
    };
    let mut service = ContactService::with_contacts(
        Arc::clone(&store) as Arc<dyn ContactStore + Send + Sync>,
        vec![cached],
    );

    assert!(service.is_consistent_with_store("Amit").await.unwrap());

    service.update_cached_address("Amit", "FC Road", IoService::Rest);
    assert!(!service.is_consistent_with_store("Amit").await.unwrap());
}

#[tokio::test]
async fn date_range_read_replaces_the_cache() {
    let store = Arc::new(MemoryContactStore::with_rows([
        amit(),
        new_contact("Ravi", "Bengaluru"),
    ]));
    let mut service = service_over(&store);
    service.load_from_store().await.unwrap();

    let found = service
        .load_by_date_range(date!(2023 - 01 - 01), date!(2023 - 12 - 31))
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].first_name, "Ravi");
    assert_eq!(service.count(IoService::Db), 1);
}

#[tokio::test]
async fn groups_contacts_by_location() {
    let store = Arc::new(MemoryContactStore::with_rows([
        amit(),
        new_contact("Ravi", "Bengaluru"),
        new_contact("Sita", "Bengaluru"),
        new_contact("Gita", ""),
    ]));
    let mut service = service_over(&store);

    let counts = service.group_by_location().await.unwrap().clone();

    assert_eq!(counts["Pune"], 1);
    assert_eq!(counts["Bengaluru"], 2);
    assert_eq!(counts["KA"], 1);
    assert_eq!(service.location_counts(), &counts);
}

#[tokio::test]
async fn sequential_add_persists_and_caches() {
    let store = Arc::new(MemoryContactStore::new());
    let mut service = service_over(&store);

    service
        .add_all_and_persist(vec![new_contact("Ravi", "Bengaluru"), new_contact("Sita", "Mysuru")])
        .await
        .unwrap();

    let names: Vec<_> = service.contacts().iter().map(|c| c.first_name.clone()).collect();
    assert_eq!(names, ["Ravi", "Sita"]);
    assert_eq!(store.rows().len(), 2);
}

#[tokio::test]
async fn sequential_add_stops_at_first_failure() {
    let store = Arc::new(MemoryContactStore::new());
    store.fail_inserts_for("Sita");
    let mut service = service_over(&store);

    let err = service
        .add_all_and_persist(vec![
            new_contact("Ravi", "Bengaluru"),
            new_contact("Sita", "Mysuru"),
            new_contact("Gita", "Hubli"),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Insert { ref name, .. } if name == "Sita"));
    assert_eq!(service.count(IoService::Db), 1);
    assert_eq!(store.rows().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_add_caches_every_contact() {
    let store = Arc::new(MemoryContactStore::new().with_insert_delay(Duration::from_millis(5)));
    let mut service = service_over(&store).with_max_concurrency(4);
    let batch: Vec<_> = (0..25)
        .map(|i| new_contact(&format!("Friend{i}"), "Bengaluru"))
        .collect();

    service.add_and_persist_concurrently(batch.clone()).await.unwrap();

    assert_eq!(service.count(IoService::Db), batch.len());
    assert_eq!(store.rows().len(), batch.len());
    for contact in &batch {
        assert!(service.contacts().contains(contact));
    }
    assert!(store.peak_concurrent_inserts() <= 4);
}

#[tokio::test]
async fn concurrent_add_surfaces_failure_without_hanging() {
    let store = Arc::new(MemoryContactStore::new());
    store.fail_inserts_for("Bad");
    let mut service = service_over(&store).with_max_concurrency(1);
    let batch = vec![
        new_contact("Bad", "Pune"),
        new_contact("Good", "Pune"),
        new_contact("Later", "Pune"),
    ];

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        service.add_and_persist_concurrently(batch),
    )
    .await
    .expect("bulk add hung");

    assert!(matches!(result, Err(Error::Insert { ref name, .. }) if name == "Bad"));
    // Whatever made it into the store before the failure is cached too.
    let rows = store.rows();
    assert_eq!(service.count(IoService::Db), rows.len());
    for row in &rows {
        assert!(service.contacts().contains(row));
    }
}

#[tokio::test]
async fn cancelling_mid_batch_stops_pending_inserts() {
    let store = Arc::new(MemoryContactStore::new().with_insert_delay(Duration::from_millis(200)));
    let mut service = service_over(&store).with_max_concurrency(2);
    let cancel = CancellationToken::new();
    let batch: Vec<_> = (0..6).map(|i| new_contact(&format!("C{i}"), "Pune")).collect();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = service
        .add_and_persist_concurrently_until(batch, cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(store.rows().is_empty());
    assert!(service.contacts().is_empty());
}

#[tokio::test]
async fn store_failures_reach_the_caller_and_keep_the_cache() {
    let store = Arc::new(MemoryContactStore::with_rows([amit()]));
    let mut service = service_over(&store);
    service.load_from_store().await.unwrap();
    store.set_unavailable(true);

    let reload = service.load_from_store().await;
    assert!(matches!(reload, Err(Error::Store(StoreError::Connection(_)))));
    assert_eq!(service.contacts(), [amit()].as_slice());

    let update = service.update_address("Amit", "New Road").await;
    assert!(matches!(update, Err(Error::Store(StoreError::Connection(_)))));
    assert_eq!(service.find_by_first_name("Amit").unwrap().address, "MG Road");

    let check = service.is_consistent_with_store("Amit").await;
    assert!(matches!(check, Err(Error::Store(StoreError::Connection(_)))));
}

#[tokio::test]
async fn unknown_first_name_is_not_found() {
    let store = Arc::new(MemoryContactStore::with_rows([amit()]));
    let mut service = service_over(&store);
    service.load_from_store().await.unwrap();

    assert!(service.find_by_first_name("Ghost").is_none());
    assert!(service.find_by_first_name("amit").is_none());
}

#[tokio::test]
async fn stored_contact_missing_from_cache_is_out_of_sync() {
    let store = Arc::new(MemoryContactStore::with_rows([amit()]));
    let service = service_over(&store);

    assert!(!service.is_consistent_with_store("Amit").await.unwrap());
}
