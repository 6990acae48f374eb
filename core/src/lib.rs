pub mod cli;
pub mod config;
pub mod db;
pub mod events;
pub mod images;
pub mod reclaimer;
pub mod repository;
pub mod scheduler;
pub mod services;

pub use reclaimer::{reclaim, Reclaimer};
pub use repository::RecipeRepository;

use std::sync::Arc;

use config::Config;
use reclaimer::LocalImageDir;
use scheduler::{ExistingWorkPolicy, PeriodicWork, WorkScheduler};
use services::power::{AlwaysCharging, DeviceState, SysfsPowerSupply};

/// Unique name of the periodic image cleanup job.
pub const CLEANUP_WORK_NAME: &str = "recipe_cleanup_work";

/// Open the configured database as a repository.
pub fn open_repository(cfg: &Config) -> rusqlite::Result<RecipeRepository> {
    Ok(RecipeRepository::new(db::open(&cfg.database_path)?))
}

pub fn build_reclaimer(
    repo: RecipeRepository,
    cfg: &Config,
) -> Reclaimer<RecipeRepository, LocalImageDir> {
    Reclaimer::new(repo, LocalImageDir::new(cfg.image_dir.clone()))
}

/// Power state source matching the cleanup constraint.
pub fn device_state(cfg: &Config) -> Arc<dyn DeviceState> {
    if cfg.cleanup.requires_charging {
        Arc::new(SysfsPowerSupply::new())
    } else {
        Arc::new(AlwaysCharging)
    }
}

/// Register the periodic cleanup, keeping an already scheduled one.
pub fn schedule_cleanup(scheduler: &WorkScheduler, repo: RecipeRepository, cfg: &Config) -> bool {
    let work = PeriodicWork::new(cfg.cleanup.interval)
        .requires_charging(cfg.cleanup.requires_charging);
    scheduler.enqueue_unique_periodic(
        CLEANUP_WORK_NAME,
        ExistingWorkPolicy::Keep,
        work,
        Arc::new(build_reclaimer(repo, cfg)),
    )
}
