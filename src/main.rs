//! Snowflake transformation - runs block/code SQL scripts in a workspace.

use snowflake_transformation::cli::Cli;
use snowflake_transformation::component::Component;
use snowflake_transformation::config::Config;
use snowflake_transformation::db::MockWarehouse;
use snowflake_transformation::error::{Result, TransformationError};
use snowflake_transformation::logging;
use snowflake_transformation::manifest::FileManifestWriter;
use tracing::{error, info};

fn main() {
    // A local .env is optional; the platform sets real variables.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    logging::init_logging();

    if let Err(e) = run(cli) {
        error!("{}: {}", e.category(), e);
        eprintln!("{e}");
        std::process::exit(e.kind().exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| TransformationError::internal(format!("Failed to start runtime: {e}")))?;

    let config_path = Config::path_in(&cli.data_dir);
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let component = Component::new(config, cli.environment());
    let writer = FileManifestWriter::for_data_dir(&cli.data_dir);

    runtime.block_on(async {
        if cli.mock_warehouse {
            info!("Running against the in-memory warehouse");
            component
                .run_with_warehouse(&MockWarehouse::new(), &writer)
                .await
        } else {
            component.run(cli.retry_policy(), &writer).await
        }
    })?;

    info!("Transformation finished");
    Ok(())
}
