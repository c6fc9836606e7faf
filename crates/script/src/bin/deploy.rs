use std::process::ExitCode;

use clap::Parser;
use peggy_contract_deployer::config::{DeployArgs, DeployConfig};
use peggy_contract_deployer::scripts::{self, deploy::DeployOutcome};
use peggy_contract_deployer::tracing as tracing_config;
use peggy_contract_deployer::utils::read_env;

// cargo run --bin deploy -- --eth-node http://localhost:8545 --cosmos-node http://localhost:26657 \
//   --eth-privkey 0x... --contract artifacts/Peggy.json --peggy-id defaultpeggyid --test-mode true \
//   --erc20-contract artifacts/TestERC20A.json

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_config::setup_logger(
        tracing_config::LoggingConfig::default()
            .with_thread_names(true)
            .use_format(read_env("LOG_FORMAT", tracing_config::LogFormat::Plain)),
    );

    let args = DeployArgs::parse();
    tracing::debug!("Args: {:?}", args);

    let config = match DeployConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            eprintln!("Error: {e}");
            return ExitCode::from(scripts::deploy::exit_code::CONFIG);
        }
    };

    let runtime = match scripts::prelude::ScriptRuntime::init(&config) {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to initialize script runtime: {e}");
            eprintln!("Error: {e}");
            return ExitCode::from(scripts::deploy::exit_code::RPC);
        }
    };

    let result = scripts::deploy::run(&config, runtime.cosmos(), runtime.deployer(), runtime.reporter()).await;
    match result {
        Ok(outcome) => {
            match &outcome {
                DeployOutcome::Deployed { bridge, erc20, .. } => {
                    tracing::info!(%erc20, "Peggy deployment complete");
                    println!("{bridge}");
                }
                DeployOutcome::DryRun { params } => {
                    tracing::info!("Dry run complete, would deploy with {params}");
                }
                DeployOutcome::NodeSyncing { latest_block_height } => {
                    tracing::error!(
                        latest_block_height,
                        "Cosmos node is still syncing, not deploying until it has caught up"
                    );
                }
            }
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            tracing::error!("Deployment failed: {e}");
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
