use std::{process, sync::Arc};

use address_book::{
    config::Settings, repositories::sql::SqlContactStore, ContactService, IoService,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        tracing::error!(%err, "address book sync failed");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    let store = SqlContactStore::connect(&settings.database).await?;
    let mut service = ContactService::new(Arc::new(store))
        .with_max_concurrency(settings.bulk.max_concurrency);

    service.load_from_store().await?;
    tracing::info!(contacts = service.count(IoService::Db), "address book loaded");

    for (location, count) in service.group_by_location().await? {
        tracing::info!(%location, count, "contacts by city or state");
    }

    Ok(())
}
