use anyhow::{bail, Context, Result};
use log::{debug, error, info};
use owlwatch::cli;
use owlwatch::common::logging_setup;
use owlwatch::config_loader;
use owlwatch::core::system_controller::SystemController;
use owlwatch::operations;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    let main_start_time = Instant::now();
    let matches = cli::build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(cli::DEFAULT_CONFIG_PATH);

    let config_load_start_time = Instant::now();
    let master_config = match config_loader::load_config(config_path) {
        Ok(cfg) => {
            logging_setup::initialize_logging(Some(&cfg), &matches);
            info!("✅ Configuration loaded from: {} in {:?}", config_path, config_load_start_time.elapsed());
            cfg
        }
        Err(e) => {
            logging_setup::initialize_logging(None, &matches);
            error!("❌ Failed to load master configuration from '{}': {:#}. Exiting.", config_path, e);
            return Err(e.context(format!("Failed to load master configuration from '{}'", config_path)));
        }
    };

    info!("🚀 Owlwatch starting with {} cameras configured.", master_config.cameras.len());
    let controller_init_start_time = Instant::now();
    let controller = SystemController::from_config(&master_config)
        .await
        .context("Failed to initialize the camera registry")?;
    debug!("✅ SystemController initialized in {:?}.", controller_init_start_time.elapsed());

    if let Some((operation_name, sub_matches)) = matches.subcommand() {
        debug!("🎬 Dispatching to subcommand: {}", operation_name);
        let op_start_time = Instant::now();

        let op_result: Result<()> = match operation_name {
            "monitor" => operations::monitor_op::handle_monitor_cli(&controller, sub_matches).await,
            "list-cameras" => operations::list_cameras_op::handle_list_cameras_cli(controller.registry()).await,
            "test" => operations::diagnostic_op::handle_diagnostic_cli(&controller, sub_matches).await,
            other => bail!("Subcommand '{}' not implemented.", other),
        };

        if let Err(e) = op_result {
            error!("❌ Operation '{}' failed after {:?}: {:#}", operation_name, op_start_time.elapsed(), e);
            return Err(e);
        }
        info!("✅ Operation '{}' completed successfully in {:?}.", operation_name, op_start_time.elapsed());
    } else {
        info!("🤔 No subcommand provided. Try 'monitor', 'list-cameras' or 'test'.");
    }

    info!("🏁 Owlwatch finished in {:?}.", main_start_time.elapsed());
    Ok(())
}
