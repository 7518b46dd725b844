//! `diagd`: serve the built-in command table on a Unix socket.
//!
//! ```text
//! diagd [CONFIG.toml]
//! diagd --print-config
//! ```
//!
//! `DIAGD_*` environment variables override values from the file.

use std::process::ExitCode;

use diag_engine::config::EngineConfig;
use diag_engine::error::Result;
use diag_engine::protocol::builtin;
use diag_engine::protocol::registry::RegistryBuilder;
use diag_engine::service::Daemon;
use diag_engine::utils::logging::init_logging;
use tracing::error;

fn load_config(arg: Option<&str>) -> Result<EngineConfig> {
    let config = match arg {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.with_env_overrides()
}

async fn run(config: EngineConfig) -> Result<()> {
    let registry = RegistryBuilder::new().common_table(builtin::common_table());
    Daemon::build(config, registry).await?.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--print-config") {
        print!("{}", EngineConfig::example_config());
        return ExitCode::SUCCESS;
    }

    let config = match load_config(arg.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("diagd: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _logging = match init_logging(&config.logging) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("diagd: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "diagd exited with an error");
            ExitCode::FAILURE
        }
    }
}
