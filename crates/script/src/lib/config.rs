use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::{Address, FixedBytes};
use clap::Parser;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eth_client::{ProviderError, ProviderFactory};

pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required flag --{0}")]
    MissingFlag(&'static str),

    #[error("Flag --{flag}: invalid URL {value:?}: {reason}")]
    InvalidUrl {
        flag: &'static str,
        value: String,
        reason: String,
    },

    #[error("Flag --eth-privkey: {0}")]
    InvalidPrivateKey(#[from] ProviderError),

    #[error("Flag --erc20-address: invalid address {value:?}: {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("Flag --peggy-id: {id:?} is {len} bytes long, bytes32 holds at most 31")]
    PeggyIdTooLong { id: String, len: usize },

    #[error("Flag --test-mode: unrecognized value {0:?}")]
    InvalidTestMode(String),

    #[error("Flag --{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("--dry-run cannot be combined with --test-mode, the test token would have to be deployed")]
    DryRunWithTestMode,
}

/// String whose value never reaches logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for SecretString {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/*
Deploy against a local devnet, letting the script create the test token:
cargo run --bin deploy -- --eth-node http://localhost:8545 --cosmos-node http://localhost:26657 \
    --eth-privkey 0x... --contract artifacts/Peggy.json --peggy-id defaultpeggyid \
    --test-mode true --erc20-contract artifacts/TestERC20.json
*/
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Deploys the Peggy bridge contract seeded with the current cosmos valset", long_about = None)]
pub struct DeployArgs {
    /// Ethereum JSON-RPC endpoint used to deploy the contracts
    #[clap(long, env = "PEGGY_ETH_NODE")]
    pub eth_node: Option<String>,

    /// Tendermint RPC endpoint the validator set is read from
    #[clap(long, env = "PEGGY_COSMOS_NODE")]
    pub cosmos_node: Option<String>,

    /// Hex private key of the account paying for the deployment
    #[clap(long = "eth-privkey", env = "PEGGY_ETH_PRIVKEY", hide_env_values = true)]
    pub eth_privkey: Option<SecretString>,

    /// Compiled Peggy contract artifact
    #[clap(long, env = "PEGGY_CONTRACT")]
    pub contract: Option<PathBuf>,

    /// ERC20 bound to the bridge, ignored in test mode
    #[clap(long = "erc20-address", env = "PEGGY_ERC20_ADDRESS")]
    pub erc20_address: Option<String>,

    /// Identifier of this bridge instance, avoid reusing one in production
    #[clap(long = "peggy-id", env = "PEGGY_ID")]
    pub peggy_id: Option<String>,

    /// Deploy `--erc20-contract` first and bind the bridge to it
    #[clap(long = "test-mode", env = "PEGGY_TEST_MODE", num_args = 0..=1, default_missing_value = "true")]
    pub test_mode: Option<String>,

    /// Test ERC20 artifact, deployed only in test mode
    #[clap(long = "erc20-contract", env = "PEGGY_ERC20_CONTRACT")]
    pub erc20_contract: Option<PathBuf>,

    #[clap(long, env = "PEGGY_CONFIRMATION_TIMEOUT_SECS", default_value_t = DEFAULT_CONFIRMATION_TIMEOUT_SECS)]
    pub confirmation_timeout_secs: u64,

    #[clap(long, env = "PEGGY_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,

    /// Write the bridge constructor parameters to this file before deploying
    #[clap(long, env = "PEGGY_STORE_PARAMS", required = false)]
    pub store_params: Option<PathBuf>,

    /// Prepare (and optionally store) the constructor parameters without deploying
    #[clap(long, env = "PEGGY_DRY_RUN", default_value = "false")]
    pub dry_run: bool,
}

/// Bridge identifier, packed into bytes32 the way ethers' `formatBytes32String`
/// does: UTF-8, right-padded with zeros, always leaving a null terminator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeggyId {
    pub label: String,
    #[serde(with = "crate::serde_utils::serde_hex_as_string::FixedHexStringProtocol::<32>")]
    pub bytes: [u8; 32],
}

impl PeggyId {
    pub fn new(label: &str) -> Result<Self, ConfigError> {
        let raw = label.as_bytes();
        if raw.len() > 31 {
            return Err(ConfigError::PeggyIdTooLong {
                id: label.to_owned(),
                len: raw.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            label: label.to_owned(),
            bytes,
        })
    }

    pub fn as_bytes32(&self) -> FixedBytes<32> {
        FixedBytes::from(self.bytes)
    }
}

impl fmt::Debug for PeggyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{})", self.label, hex::encode(self.bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Erc20Source {
    Fixed(Address),
    DeployTestToken { artifact: PathBuf },
}

/// Validated run configuration. Built once at startup and handed to every step.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub eth_node: Url,
    pub cosmos_node: Url,
    pub eth_private_key: k256::SecretKey,
    pub contract: PathBuf,
    pub erc20: Erc20Source,
    pub peggy_id: PeggyId,
    pub confirmation_timeout: Duration,
    pub http_timeout: Duration,
    pub store_params: Option<PathBuf>,
    pub dry_run: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

fn required(value: Option<String>, flag: &'static str) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::MissingFlag(flag))
}

fn required_path(value: Option<PathBuf>, flag: &'static str) -> Result<PathBuf, ConfigError> {
    value
        .filter(|path| !path.as_os_str().is_empty())
        .ok_or(ConfigError::MissingFlag(flag))
}

fn parse_url(value: String, flag: &'static str) -> Result<Url, ConfigError> {
    Url::parse(&value).map_err(|e| ConfigError::InvalidUrl {
        flag,
        value,
        reason: e.to_string(),
    })
}

fn parse_timeout(secs: u64, flag: &'static str) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::ZeroTimeout(flag));
    }
    Ok(Duration::from_secs(secs))
}

pub fn parse_test_mode(value: Option<&str>) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" | "off" => Ok(false),
        "true" | "1" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::InvalidTestMode(raw.to_owned())),
    }
}

impl TryFrom<DeployArgs> for DeployConfig {
    type Error = ConfigError;

    fn try_from(args: DeployArgs) -> Result<Self, Self::Error> {
        let eth_node = parse_url(required(args.eth_node, "eth-node")?, "eth-node")?;
        let cosmos_node = parse_url(required(args.cosmos_node, "cosmos-node")?, "cosmos-node")?;

        let raw_key = args
            .eth_privkey
            .filter(|key| !key.expose().trim().is_empty())
            .ok_or(ConfigError::MissingFlag("eth-privkey"))?;
        let eth_private_key = ProviderFactory::decode_key(raw_key.expose())?;

        let contract = required_path(args.contract, "contract")?;
        // Packed as given, surrounding whitespace is part of the id
        let peggy_id = args
            .peggy_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::MissingFlag("peggy-id"))?;
        let peggy_id = PeggyId::new(&peggy_id)?;

        let test_mode = parse_test_mode(args.test_mode.as_deref())?;
        let erc20 = if test_mode {
            if non_empty(args.erc20_address.clone()).is_some() {
                tracing::warn!("Test mode is on, --erc20-address is ignored in favour of the deployed test token");
            }
            Erc20Source::DeployTestToken {
                artifact: required_path(args.erc20_contract, "erc20-contract")?,
            }
        } else {
            let value = required(args.erc20_address, "erc20-address")?;
            let address = value.parse::<Address>().map_err(|e| ConfigError::InvalidAddress {
                value: value.clone(),
                reason: e.to_string(),
            })?;
            Erc20Source::Fixed(address)
        };

        if args.dry_run && test_mode {
            return Err(ConfigError::DryRunWithTestMode);
        }

        Ok(Self {
            eth_node,
            cosmos_node,
            eth_private_key,
            contract,
            erc20,
            peggy_id,
            confirmation_timeout: parse_timeout(args.confirmation_timeout_secs, "confirmation-timeout-secs")?,
            http_timeout: parse_timeout(args.http_timeout_secs, "http-timeout-secs")?,
            store_params: args.store_params,
            dry_run: args.dry_run,
        })
    }
}
