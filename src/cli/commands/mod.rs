//! CLI command implementations.

mod config;
mod discover;
mod doctor;
mod reset;
mod run;
mod search;
mod show;
mod stage;
mod status;

pub use config::run_config;
pub use discover::run_discover;
pub use doctor::run_doctor;
pub use reset::run_reset;
pub use run::run_pipeline;
pub use search::run_search;
pub use show::run_show;
pub use stage::run_stage;
pub use status::run_status;

use crate::config::Settings;
use crate::store::Store;
use std::sync::Arc;

/// Open the configured database, creating it on first use.
fn open_store(settings: &Settings) -> anyhow::Result<Arc<Store>> {
    Ok(Arc::new(Store::open(&settings.database_path())?))
}
