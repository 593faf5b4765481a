//! Persistence for packages, drivers and the transactional outbox.
//!
//! Two interchangeable backends implement the same ports:
//! - [`InMemoryStore`] for tests and local runs
//! - [`PostgresStore`] for production, one database transaction per commit

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use outbox::{OutboxMessage, PACKAGE_STATUS_UPDATED_EVENT_NAME};
pub use postgres::PostgresStore;
pub use store::{
    DeliveryStore, DriverDeliveryLoad, DriverLoadReader, OutboxStore, StagedPackage, UnitOfWork,
    WriteMode,
};
