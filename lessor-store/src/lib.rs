pub mod app_config;
pub mod billing_repo;
pub mod database;
pub mod device_repo;
pub mod event_repo;
pub mod memory;
pub mod order_repo;
pub mod record_repo;

pub use app_config::Config;
pub use billing_repo::{PgBillingRepository, PgDepositRepository};
pub use database::DbClient;
pub use device_repo::PgDeviceRepository;
pub use event_repo::PgEventRepository;
pub use memory::MemoryStore;
pub use order_repo::PgOrderRepository;
pub use record_repo::PgRecordRepository;
