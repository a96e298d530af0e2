use std::collections::HashMap;

use sqlx::{pool::PoolConnection, postgres::PgPoolOptions, PgPool, Postgres};
use time::Date;

use crate::{config::DatabaseSettings, domains::Contact, error::StoreError};

use super::{ContactStore, StoreResult};

const CONTACT_COLUMNS: &str = "\
    first_name, \
    last_name, \
    address, \
    city, \
    state, \
    zip, \
    phone_number, \
    email, \
    address_book_type, \
    address_book_name, \
    start_date";

#[derive(Clone)]
pub struct SqlContactStore {
    pub(super) pool: PgPool,
}

impl SqlContactStore {
    pub async fn connect(settings: &DatabaseSettings) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout())
            .connect(&settings.url)
            .await
            .map_err(StoreError::Connection)?;

        tracing::info!(max_connections = settings.max_connections, "connected to database");

        Ok(Self { pool })
    }

    /// The connection goes back to the pool when the returned guard drops.
    async fn acquire(&self) -> StoreResult<PoolConnection<Postgres>> {
        self.pool.acquire().await.map_err(StoreError::Connection)
    }
}

#[async_trait::async_trait]
impl ContactStore for SqlContactStore {
    #[tracing::instrument(skip(self))]
    async fn read_all(&self) -> StoreResult<Vec<Contact>> {
        let mut conn = self.acquire().await?;

        let contacts = sqlx::query_as(&format!("SELECT {CONTACT_COLUMNS} FROM address_book"))
            .fetch_all(&mut *conn)
            .await?;

        Ok(contacts)
    }

    #[tracing::instrument(skip(self))]
    async fn update_address(&self, first_name: &str, address: &str) -> StoreResult<u64> {
        let mut conn = self.acquire().await?;

        let result = sqlx::query("UPDATE address_book SET address = $1 WHERE first_name = $2")
            .bind(address)
            .bind(first_name)
            .execute(&mut *conn)
            .await?;

        tracing::debug!(rows = result.rows_affected(), "address updated");
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_name(&self, first_name: &str) -> StoreResult<Vec<Contact>> {
        let mut conn = self.acquire().await?;

        let contacts = sqlx::query_as(&format!(
            "SELECT {CONTACT_COLUMNS} FROM address_book WHERE first_name = $1"
        ))
        .bind(first_name)
        .fetch_all(&mut *conn)
        .await?;

        Ok(contacts)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_date_range(&self, start: Date, end: Date) -> StoreResult<Vec<Contact>> {
        let mut conn = self.acquire().await?;

        let contacts = sqlx::query_as(&format!(
            "SELECT {CONTACT_COLUMNS} FROM address_book WHERE start_date BETWEEN $1 AND $2"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&mut *conn)
        .await?;

        Ok(contacts)
    }

    #[tracing::instrument(skip(self))]
    async fn group_by_city_or_state(&self) -> StoreResult<HashMap<String, i64>> {
        let mut conn = self.acquire().await?;

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "\
SELECT \
    COALESCE(NULLIF(city, ''), state) AS location, \
    COUNT(1) \
 FROM address_book \
GROUP BY location\
",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().collect())
    }

    #[tracing::instrument(skip(self, contact), fields(first_name = %contact.first_name))]
    async fn insert(&self, contact: &Contact) -> StoreResult<Contact> {
        let mut conn = self.acquire().await?;

        sqlx::query(&format!(
            "INSERT INTO address_book ({CONTACT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.address)
        .bind(&contact.city)
        .bind(&contact.state)
        .bind(contact.zip)
        .bind(contact.phone_number)
        .bind(&contact.email)
        .bind(&contact.address_book_type)
        .bind(&contact.address_book_name)
        .bind(contact.start_date)
        .execute(&mut *conn)
        .await?;

        Ok(contact.clone())
    }
}
