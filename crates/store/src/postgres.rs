use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{DriverId, EventId, PackageId, PatientId};
use domain::{DeliveryStatus, Driver, IncidentType, Package, PackageRecord};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OutboxMessage, Result, StoreError,
    store::{
        DeliveryStore, DriverDeliveryLoad, DriverLoadReader, OutboxStore, UnitOfWork, WriteMode,
    },
};

const PACKAGE_COLUMNS: &str = "id, number, patient_id, patient_name, patient_phone, \
     delivery_address, delivery_latitude, delivery_longitude, delivery_date, driver_id, \
     delivery_order, delivery_status, delivery_evidence, incident_type, incident_description, \
     updated_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Writes every staged change inside an open transaction.
    ///
    /// The caller decides whether to commit; dropping the transaction rolls
    /// everything back.
    pub async fn stage(
        tx: &mut Transaction<'_, Postgres>,
        unit_of_work: &UnitOfWork,
    ) -> Result<()> {
        for staged in unit_of_work.packages() {
            let conflict = match staged.mode {
                WriteMode::InsertIfAbsent => "ON CONFLICT (id) DO NOTHING",
                WriteMode::Upsert => {
                    "ON CONFLICT (id) DO UPDATE SET \
                     number = EXCLUDED.number, \
                     patient_id = EXCLUDED.patient_id, \
                     patient_name = EXCLUDED.patient_name, \
                     patient_phone = EXCLUDED.patient_phone, \
                     delivery_address = EXCLUDED.delivery_address, \
                     delivery_latitude = EXCLUDED.delivery_latitude, \
                     delivery_longitude = EXCLUDED.delivery_longitude, \
                     delivery_date = EXCLUDED.delivery_date, \
                     driver_id = EXCLUDED.driver_id, \
                     delivery_order = EXCLUDED.delivery_order, \
                     delivery_status = EXCLUDED.delivery_status, \
                     delivery_evidence = EXCLUDED.delivery_evidence, \
                     incident_type = EXCLUDED.incident_type, \
                     incident_description = EXCLUDED.incident_description, \
                     updated_at = EXCLUDED.updated_at"
                }
            };
            let sql = format!(
                "INSERT INTO package ({PACKAGE_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
                 {conflict}"
            );

            let record = &staged.record;
            sqlx::query(&sql)
                .bind(record.id.as_uuid())
                .bind(&record.number)
                .bind(record.patient_id.as_uuid())
                .bind(&record.patient_name)
                .bind(&record.patient_phone)
                .bind(&record.delivery_address)
                .bind(record.delivery_latitude)
                .bind(record.delivery_longitude)
                .bind(record.delivery_date)
                .bind(record.driver_id.as_uuid())
                .bind(record.delivery_order)
                .bind(record.delivery_status.as_str())
                .bind(&record.delivery_evidence)
                .bind(record.incident_type.map(|t| t.as_str()))
                .bind(&record.incident_description)
                .bind(record.updated_at)
                .execute(&mut **tx)
                .await?;
        }

        for driver in unit_of_work.drivers() {
            sqlx::query(
                r#"
                INSERT INTO driver (id, name, latitude, longitude, last_location_update)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    latitude = EXCLUDED.latitude,
                    longitude = EXCLUDED.longitude,
                    last_location_update = EXCLUDED.last_location_update
                "#,
            )
            .bind(driver.id().as_uuid())
            .bind(driver.name())
            .bind(driver.latitude())
            .bind(driver.longitude())
            .bind(driver.last_location_update())
            .execute(&mut **tx)
            .await?;
        }

        for message in unit_of_work.outbox_messages() {
            let content: serde_json::Value = serde_json::from_str(&message.content)?;
            sqlx::query(
                r#"
                INSERT INTO outbox_message (id, event_name, type, content, occurred_on_utc, processed_on_utc, error)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(message.id.as_uuid())
            .bind(&message.event_name)
            .bind(&message.message_type)
            .bind(content)
            .bind(message.occurred_on_utc)
            .bind(message.processed_on_utc)
            .bind(&message.error)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    fn row_to_package(row: PgRow) -> Result<Package> {
        let status: String = row.try_get("delivery_status")?;
        let incident: Option<String> = row.try_get("incident_type")?;

        let record = PackageRecord {
            id: PackageId::from_uuid(row.try_get::<Uuid, _>("id")?),
            number: row.try_get("number")?,
            patient_id: PatientId::from_uuid(row.try_get::<Uuid, _>("patient_id")?),
            patient_name: row.try_get("patient_name")?,
            patient_phone: row.try_get("patient_phone")?,
            delivery_address: row.try_get("delivery_address")?,
            delivery_latitude: row.try_get("delivery_latitude")?,
            delivery_longitude: row.try_get("delivery_longitude")?,
            delivery_date: row.try_get("delivery_date")?,
            driver_id: DriverId::from_uuid(row.try_get::<Uuid, _>("driver_id")?),
            delivery_order: row.try_get("delivery_order")?,
            delivery_status: status
                .parse::<DeliveryStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            delivery_evidence: row.try_get("delivery_evidence")?,
            incident_type: incident
                .map(|value| value.parse::<IncidentType>())
                .transpose()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            incident_description: row.try_get("incident_description")?,
            updated_at: row.try_get("updated_at")?,
        };

        Ok(Package::from_record(record))
    }

    fn row_to_driver(row: PgRow) -> Result<Driver> {
        Ok(Driver::restore(
            DriverId::from_uuid(row.try_get::<Uuid, _>("id")?),
            row.try_get("name")?,
            row.try_get("latitude")?,
            row.try_get("longitude")?,
            row.try_get("last_location_update")?,
        ))
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxMessage> {
        let content: serde_json::Value = row.try_get("content")?;

        Ok(OutboxMessage {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_name: row.try_get("event_name")?,
            message_type: row.try_get("type")?,
            content: serde_json::to_string(&content)?,
            occurred_on_utc: row.try_get("occurred_on_utc")?,
            processed_on_utc: row.try_get("processed_on_utc")?,
            error: row.try_get("error")?,
        })
    }
}

#[async_trait]
impl DeliveryStore for PostgresStore {
    async fn get_package(&self, id: PackageId) -> Result<Option<Package>> {
        let row = sqlx::query(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM package WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_package).transpose()
    }

    async fn get_driver(&self, id: DriverId) -> Result<Option<Driver>> {
        let row = sqlx::query(
            "SELECT id, name, latitude, longitude, last_location_update FROM driver WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_driver).transpose()
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>> {
        let rows = sqlx::query(
            "SELECT id, name, latitude, longitude, last_location_update FROM driver ORDER BY name ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_driver).collect()
    }

    async fn packages_by_driver_and_date(
        &self,
        driver_id: DriverId,
        date: NaiveDate,
    ) -> Result<Vec<Package>> {
        let rows = sqlx::query(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM package \
             WHERE driver_id = $1 AND delivery_date = $2 \
             ORDER BY delivery_order ASC, number ASC"
        ))
        .bind(driver_id.as_uuid())
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_package).collect()
    }

    async fn commit(&self, unit_of_work: UnitOfWork) -> Result<()> {
        if unit_of_work.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        Self::stage(&mut tx, &unit_of_work).await?;
        tx.commit().await?;

        tracing::debug!(
            packages = unit_of_work.packages().len(),
            drivers = unit_of_work.drivers().len(),
            outbox = unit_of_work.outbox_messages().len(),
            "Committed unit of work"
        );
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn pending_outbox_messages(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_name, type, content, occurred_on_utc, processed_on_utc, error
            FROM outbox_message
            WHERE processed_on_utc IS NULL
            ORDER BY occurred_on_utc ASC, seq ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn mark_outbox_processed(
        &self,
        id: EventId,
        processed_on: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_message
            SET processed_on_utc = $2, error = NULL
            WHERE id = $1 AND processed_on_utc IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(processed_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_outbox_failed(&self, id: EventId, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_message
            SET error = $2
            WHERE id = $1 AND processed_on_utc IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DriverLoadReader for PostgresStore {
    async fn driver_delivery_loads(&self, date: NaiveDate) -> Result<Vec<DriverDeliveryLoad>> {
        let rows = sqlx::query(
            r#"
            SELECT driver_id, COUNT(*) AS packages_count
            FROM package
            WHERE delivery_date = $1
            GROUP BY driver_id
            ORDER BY driver_id
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DriverDeliveryLoad {
                    driver_id: DriverId::from_uuid(row.try_get::<Uuid, _>("driver_id")?),
                    packages_count: row.try_get("packages_count")?,
                })
            })
            .collect()
    }
}
