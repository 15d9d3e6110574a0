pub mod app_config;
pub mod capacity_repo;
pub mod database;
pub mod memory_repo;
pub mod reservation_repo;

pub use capacity_repo::PostgresCapacityRepository;
pub use database::DbClient;
pub use memory_repo::{InMemoryCapacityRepository, InMemoryReservationStore};
pub use reservation_repo::PostgresReservationStore;

/// Map a driver error into the engine's generic store failure.
pub(crate) fn store_error(err: sqlx::Error) -> pawbook_core::CoreError {
    pawbook_core::CoreError::Store(err.to_string())
}
