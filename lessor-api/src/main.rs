//! Scheduled job runner: runs both reconciliation sweeps once against the
//! configured store and logs their reports. Invoked by an external scheduler
//! (cron/systemd timer); the scheduler context is tenant-unscoped.

use chrono::Utc;
use lessor_api::state::{AppState, Repositories};
use lessor_core::identity::CallerContext;
use lessor_jobs::SweepOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lessor_api=info,lessor_jobs=info,lessor_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = lessor_store::Config::load()?;
    tracing::info!("Starting Lessor sweep runner");

    let db = lessor_store::DbClient::new(&config.database.url).await?;
    db.ensure_schema().await?;

    let state = AppState::new(Repositories::postgres(&db), config.jobs.clone());
    let ctx = CallerContext::system();
    let today = Utc::now().date_naive();

    let opts = SweepOptions {
        dry_run: config.jobs.dry_run,
        batch_size: config.jobs.batch_size,
        min_overdue_days: config.jobs.min_overdue_days,
        auto_mark: config.jobs.auto_mark_lost,
        provider_id: None,
    };

    let billing_report = state.billing_sweep.run(&ctx, today, &opts).await?;
    tracing::info!(
        job = billing_report.job,
        scanned = billing_report.scanned,
        matched = billing_report.matched,
        applied = billing_report.applied,
        dry_run = billing_report.dry_run,
        "billing sweep finished"
    );

    let rental_report = state.non_return_sweep.run(&ctx, today, &opts).await?;
    tracing::info!(
        job = rental_report.job,
        scanned = rental_report.scanned,
        matched = rental_report.matched,
        applied = rental_report.applied,
        dry_run = rental_report.dry_run,
        "non-return sweep finished"
    );

    for failure in billing_report.failures.iter().chain(&rental_report.failures) {
        tracing::error!(failure = %failure, "sweep row failure");
    }

    Ok(())
}
