use std::sync::Arc;

use lessor_billing::BillingEngine;
use lessor_core::repository::{
    BillingRepository, DepositRepository, DeviceRepository, EventRepository, OrderRepository, RecordRepository,
};
use lessor_facts::FactsService;
use lessor_jobs::{NonReturnSweep, OverdueBillingSweep};
use lessor_rental::RentalService;
use lessor_settlement::SettlementService;
use lessor_store::app_config::JobsConfig;
use lessor_store::{
    DbClient, MemoryStore, PgBillingRepository, PgDepositRepository, PgDeviceRepository, PgEventRepository,
    PgOrderRepository, PgRecordRepository,
};

/// Repository handles over the shared record store.
#[derive(Clone)]
pub struct Repositories {
    pub orders: Arc<dyn OrderRepository>,
    pub devices: Arc<dyn DeviceRepository>,
    pub records: Arc<dyn RecordRepository>,
    pub billing: Arc<dyn BillingRepository>,
    pub deposits: Arc<dyn DepositRepository>,
    pub events: Arc<dyn EventRepository>,
}

impl Repositories {
    pub fn postgres(db: &DbClient) -> Self {
        Self {
            orders: Arc::new(PgOrderRepository::new(db.pool.clone())),
            devices: Arc::new(PgDeviceRepository::new(db.pool.clone())),
            records: Arc::new(PgRecordRepository::new(db.pool.clone())),
            billing: Arc::new(PgBillingRepository::new(db.pool.clone())),
            deposits: Arc::new(PgDepositRepository::new(db.pool.clone())),
            events: Arc::new(PgEventRepository::new(db.pool.clone())),
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            orders: store.clone(),
            devices: store.clone(),
            records: store.clone(),
            billing: store.clone(),
            deposits: store.clone(),
            events: store,
        }
    }
}

/// Shared handler state: the domain services wired over one set of
/// repositories, plus sweep defaults for the cron surface.
pub struct AppState {
    pub repos: Repositories,
    pub rentals: RentalService,
    pub billing: BillingEngine,
    pub settlement: SettlementService,
    pub facts: FactsService,
    pub billing_sweep: OverdueBillingSweep,
    pub non_return_sweep: NonReturnSweep,
    pub job_defaults: JobsConfig,
}

impl AppState {
    pub fn new(repos: Repositories, job_defaults: JobsConfig) -> Self {
        let rentals = RentalService::new(
            repos.orders.clone(),
            repos.devices.clone(),
            repos.billing.clone(),
            repos.events.clone(),
        );
        let billing = BillingEngine::new(repos.orders.clone(), repos.billing.clone(), repos.events.clone());
        let settlement = SettlementService::new(
            repos.orders.clone(),
            repos.records.clone(),
            repos.deposits.clone(),
            repos.events.clone(),
        );
        let facts = FactsService::new(
            repos.orders.clone(),
            repos.devices.clone(),
            repos.records.clone(),
            repos.events.clone(),
        );
        let billing_sweep = OverdueBillingSweep::new(repos.billing.clone(), repos.events.clone());
        let non_return_sweep =
            NonReturnSweep::new(repos.orders.clone(), repos.records.clone(), repos.events.clone());

        Self {
            repos,
            rentals,
            billing,
            settlement,
            facts,
            billing_sweep,
            non_return_sweep,
            job_defaults,
        }
    }

    /// Test/local wiring over the in-memory store.
    pub fn in_memory() -> Self {
        Self::new(
            Repositories::in_memory(),
            JobsConfig {
                dry_run: false,
                batch_size: 500,
                min_overdue_days: 0,
                auto_mark_lost: false,
            },
        )
    }
}
