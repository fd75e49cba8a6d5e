use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tsp_core::config::{ServiceConfig, WarnLevel};
use tsp_core::spat::TranslationConfig;
use tsp_runtime::{MemoryController, ScheduleManager, ScheduleReceiver};

pub fn run(config_path: &Path, bind: Option<String>) -> anyhow::Result<()> {
    let mut config = ServiceConfig::load(config_path).context("failed to load config")?;
    if let Some(bind) = bind {
        config.receiver.bind = bind;
    }

    for w in config.validate() {
        match w.level {
            WarnLevel::Error => anyhow::bail!("invalid config: {}", w.message),
            WarnLevel::Warning => tracing::warn!("{}", w.message),
        }
    }

    check_translation(&config)?;

    let controller = Arc::new(MemoryController::new(
        config.controller.backup_time_secs,
        config.controller.timing_plan_update_interval_secs,
    ));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let manager = Arc::new(
            ScheduleManager::start(controller).context("failed to start job scheduler")?,
        );
        let receiver = ScheduleReceiver::bind(&config.receiver, Arc::clone(&manager))
            .await
            .with_context(|| format!("failed to bind {}", config.receiver.bind))?;
        println!("tsp listening on {}", receiver.local_addr()?);

        let result = receiver
            .run(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;

        manager.shutdown();
        let installed = result?;
        println!("Installed {installed} schedule(s).");
        Ok(())
    })
}

/// Fail fast on a translation file that `tsp spat` would reject.
///
/// The daemon has no SPaT feed of its own, so the file is only validated here.
fn check_translation(config: &ServiceConfig) -> anyhow::Result<()> {
    let Some(path) = config.spat.translation_path.as_deref().filter(|p| p.exists()) else {
        return Ok(());
    };
    let translation = TranslationConfig::load(path)
        .with_context(|| format!("failed to load translation {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        omitted = ?translation.omitted_phases,
        "spat translation file validated"
    );
    Ok(())
}
