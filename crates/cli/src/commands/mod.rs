pub mod checkpoint;
pub mod init;
pub mod review;
pub mod run;
pub mod status;

use anyhow::Context;
use boltstudio_config::AppConfig;

pub(crate) fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}
