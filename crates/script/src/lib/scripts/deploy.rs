use alloy_primitives::Address;
use thiserror::Error;
use tracing::Instrument;

use crate::artifact::{self, ArtifactError, ContractArtifact};
use crate::config::{ConfigError, DeployConfig, Erc20Source};
use crate::cosmos_rpc::{self, CosmosRpc, DecodeError, FetchError, RpcError, ValsetFetch};
use crate::deploy::{self, BridgeDeployParams, ConstructorLayout};
use crate::eth_client::{ContractDeployer, DeployRequest, DeploymentError};
use crate::reporter::{AddressReporter, ReportError};
use crate::utils;
use crate::valset::InvalidEthereumAddress;

pub const BRIDGE_CONTRACT: &str = "Peggy";
pub const TEST_TOKEN_CONTRACT: &str = "TestERC20";

pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const NODE_SYNCING: u8 = 1;
    pub const CONFIG: u8 = 2;
    pub const ARTIFACT: u8 = 3;
    pub const RPC: u8 = 4;
    pub const DECODE: u8 = 5;
    pub const DEPLOYMENT: u8 = 6;
    pub const TIMEOUT: u8 = 7;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Deployment error: {0}")]
    Deployment(#[from] DeploymentError),

    #[error("Address report error: {0}")]
    Report(#[from] ReportError),

    #[error("Failed to store deploy params to {path:?}: {source}")]
    StoreParams {
        path: std::path::PathBuf,
        source: utils::Error,
    },
}

impl From<FetchError> for Error {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::Rpc(e) => Error::Rpc(e),
            FetchError::Decode(e) => Error::Decode(e),
        }
    }
}

impl From<InvalidEthereumAddress> for Error {
    fn from(value: InvalidEthereumAddress) -> Self {
        Error::Decode(value.into())
    }
}

impl Error {
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) | Error::StoreParams { .. } => exit_code::CONFIG,
            Error::Artifact(_) => exit_code::ARTIFACT,
            Error::Rpc(_) | Error::Report(_) => exit_code::RPC,
            Error::Decode(_) => exit_code::DECODE,
            Error::Deployment(e) if e.is_timeout() => exit_code::TIMEOUT,
            Error::Deployment(e) if e.is_transport() => exit_code::RPC,
            Error::Deployment(_) => exit_code::DEPLOYMENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Deployed {
        bridge: Address,
        erc20: Address,
        params: BridgeDeployParams,
    },
    DryRun {
        params: BridgeDeployParams,
    },
    NodeSyncing {
        latest_block_height: u64,
    },
}

impl DeployOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            DeployOutcome::Deployed { .. } | DeployOutcome::DryRun { .. } => exit_code::SUCCESS,
            DeployOutcome::NodeSyncing { .. } => exit_code::NODE_SYNCING,
        }
    }
}

pub async fn deploy_token(deployer: &impl ContractDeployer, artifact: &ContractArtifact) -> Result<Address, Error> {
    tracing::info!("Test mode, deploying ERC20 contract");
    let request = DeployRequest::new(TEST_TOKEN_CONTRACT, artifact.creation_code()?, Default::default());
    let address = deployer.deploy(request).await?;
    tracing::info!("ERC20 deployed at address {address}");
    Ok(address)
}

pub async fn deploy_bridge(
    deployer: &impl ContractDeployer,
    artifact: &ContractArtifact,
    layout: ConstructorLayout,
    params: &BridgeDeployParams,
) -> Result<Address, Error> {
    tracing::info!("Starting Peggy contract deploy");
    tracing::debug!("Constructor layout {layout:?}, parameters {params}");
    let request = DeployRequest::new(
        BRIDGE_CONTRACT,
        artifact.creation_code()?,
        deploy::encode_constructor_args(params, layout),
    );
    let address = deployer.deploy(request).await?;
    tracing::info!("Peggy deployed at address {address}");
    Ok(address)
}

fn store_params(path: &std::path::Path, params: &BridgeDeployParams) -> Result<(), Error> {
    tracing::debug!("Writing deploy params to {:?}", path.as_os_str());
    utils::write_json(path, params).map_err(|source| Error::StoreParams {
        path: path.to_owned(),
        source,
    })?;
    tracing::info!("Stored deploy params {params:?}");
    Ok(())
}

enum ResolvedToken {
    Fixed(Address),
    Deploy(ContractArtifact),
}

async fn run_impl(
    config: &DeployConfig,
    cosmos: &impl CosmosRpc,
    deployer: &impl ContractDeployer,
    reporter: &impl AddressReporter,
) -> Result<DeployOutcome, Error> {
    tracing::info!(peggy_id = ?config.peggy_id, "Deploying Peggy bridge");

    // Both artifacts are checked before any transaction is sent
    let bridge_artifact = artifact::read_artifact(&config.contract)?;
    let layout = ConstructorLayout::from_artifact(&bridge_artifact)?;
    let token = match &config.erc20 {
        Erc20Source::Fixed(address) => ResolvedToken::Fixed(*address),
        Erc20Source::DeployTestToken { artifact: path } => ResolvedToken::Deploy(artifact::read_artifact(path)?),
    };

    let erc20 = match &token {
        ResolvedToken::Fixed(address) => *address,
        ResolvedToken::Deploy(token_artifact) => deploy_token(deployer, token_artifact).await?,
    };

    tracing::info!("About to get latest Peggy valset");
    let (valset, height) = match cosmos_rpc::fetch_latest_valset(cosmos).await? {
        ValsetFetch::Ready { valset, height } => (valset, height),
        ValsetFetch::NodeSyncing { latest_block_height } => {
            return Ok(DeployOutcome::NodeSyncing { latest_block_height });
        }
    };

    let params = deploy::prepare_deploy_params(&config.peggy_id, &valset, height, erc20)?;
    tracing::info!(
        validators = params.validators.len(),
        nonce = params.valset_nonce,
        height = params.valset_height,
        "Prepared bridge constructor parameters"
    );

    if let Some(path) = &config.store_params {
        store_params(path, &params)?;
    }

    if config.dry_run {
        tracing::info!("Dryrun is set, not deploying");
        return Ok(DeployOutcome::DryRun { params });
    }

    let bridge = deploy_bridge(deployer, &bridge_artifact, layout, &params).await?;
    reporter.report_address(bridge).await?;

    Ok(DeployOutcome::Deployed { bridge, erc20, params })
}

/// Runs the whole deployment once. A syncing cosmos node is reported as
/// `DeployOutcome::NodeSyncing`, every failure as `Error`.
pub async fn run(
    config: &DeployConfig,
    cosmos: &impl CosmosRpc,
    deployer: &impl ContractDeployer,
    reporter: &impl AddressReporter,
) -> Result<DeployOutcome, Error> {
    run_impl(config, cosmos, deployer, reporter)
        .instrument(tracing::info_span!("deploy"))
        .await
}
