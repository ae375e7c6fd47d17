use std::env;

use anyhow::Context;
use log::info;

use orchestrator::{AsyncMaster, Config, logging};

const DEFAULT_CONFIG_PATH: &str = "config.json";

fn main() -> anyhow::Result<()> {
    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = Config::load(&path).with_context(|| format!("failed to read config {path}"))?;
    logging::init(config.level_filter()?);
    logging::attach_thread_file(&config.logs_dir(), "main")
        .context("failed to open the main log file")?;
    info!("loaded config from {path}");

    let master = AsyncMaster::init(config).context("failed to initialize the run")?;
    let summary = master.start().context("training failed")?;

    info!(
        "trained {} global steps, {} threads left running",
        summary.global_steps, summary.live_threads
    );
    Ok(())
}
