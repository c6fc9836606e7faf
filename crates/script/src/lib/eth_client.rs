use alloy::network::Ethereum;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, TxHash, TxKind};
use alloy::providers::fillers::RecommendedFillers;
use alloy::providers::{PendingTransactionError, Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use alloy::transports::{RpcError, TransportErrorKind};
use tracing::Instrument;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("{contract} deployment rejected by the node: {message}")]
    Rejected { contract: String, message: String },

    #[error("{contract} deployment transaction {tx_hash} reverted")]
    Reverted { contract: String, tx_hash: TxHash },

    #[error("{contract} deployment transaction {tx_hash} was mined without a contract address")]
    MissingContractAddress { contract: String, tx_hash: TxHash },

    #[error("Timed out after {timeout:?} waiting for {contract} deployment transaction {tx_hash}")]
    Timeout {
        contract: String,
        tx_hash: TxHash,
        timeout: Duration,
    },

    #[error("Failed to confirm {contract} deployment transaction {tx_hash}: {reason}")]
    Confirmation {
        contract: String,
        tx_hash: TxHash,
        reason: String,
    },

    #[error("Ethereum node transport failure during {contract} deployment: {reason}")]
    Transport { contract: String, reason: String },
}

impl DeploymentError {
    fn from_send_error(contract: &str, error: RpcError<TransportErrorKind>) -> Self {
        match error {
            RpcError::ErrorResp(payload) => DeploymentError::Rejected {
                contract: contract.to_owned(),
                message: payload.message.to_string(),
            },
            RpcError::Transport(kind) => DeploymentError::Transport {
                contract: contract.to_owned(),
                reason: kind.to_string(),
            },
            other => DeploymentError::Rejected {
                contract: contract.to_owned(),
                message: other.to_string(),
            },
        }
    }

    fn from_receipt_error(contract: &str, tx_hash: TxHash, error: PendingTransactionError) -> Self {
        match error {
            PendingTransactionError::TransportError(RpcError::Transport(kind)) => DeploymentError::Transport {
                contract: contract.to_owned(),
                reason: kind.to_string(),
            },
            other => DeploymentError::Confirmation {
                contract: contract.to_owned(),
                tx_hash,
                reason: other.to_string(),
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DeploymentError::Timeout { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, DeploymentError::Transport { .. })
    }
}

/// Contract creation transaction: creation code followed by the ABI-encoded
/// constructor arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub contract: String,
    pub bytecode: Bytes,
    pub constructor_args: Bytes,
}

impl DeployRequest {
    pub fn new(contract: &str, bytecode: Bytes, constructor_args: Bytes) -> Self {
        Self {
            contract: contract.to_owned(),
            bytecode,
            constructor_args,
        }
    }

    pub fn creation_input(&self) -> Bytes {
        let mut input = Vec::with_capacity(self.bytecode.len() + self.constructor_args.len());
        input.extend_from_slice(&self.bytecode);
        input.extend_from_slice(&self.constructor_args);
        input.into()
    }
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait ContractDeployer: Send + Sync {
    /// Submits the creation transaction and waits until it is mined.
    /// Returns the address of the created contract.
    async fn deploy(&self, request: DeployRequest) -> Result<Address, DeploymentError>;
}

pub struct AlloyContractDeployer<P>
where
    P: Provider<Ethereum>,
{
    provider: Arc<P>,
    confirmation_timeout: Duration,
}

impl<P> AlloyContractDeployer<P>
where
    P: Provider<Ethereum>,
{
    pub fn new(provider: Arc<P>, confirmation_timeout: Duration) -> Self {
        Self {
            provider,
            confirmation_timeout,
        }
    }

    async fn deploy_impl(&self, request: DeployRequest) -> Result<Address, DeploymentError> {
        let contract = request.contract.as_str();
        let mut tx = TransactionRequest::default().input(TransactionInput::both(request.creation_input()));
        tx.to = Some(TxKind::Create);

        tracing::info!("Submitting {contract} deployment transaction");
        let pending = self
            .provider
            .send_transaction(tx)
            .instrument(tracing::info_span!("send_tx"))
            .await
            .inspect(|val| tracing::debug!("Submitted transaction {}", val.tx_hash()))
            .inspect_err(|err| tracing::error!("Failed to submit transaction {err:?}"))
            .map_err(|e| DeploymentError::from_send_error(contract, e))?;
        let tx_hash = *pending.tx_hash();

        tracing::info!("Waiting for {contract} deployment transaction {tx_hash}");
        let receipt = tokio::time::timeout(self.confirmation_timeout, pending.get_receipt())
            .instrument(tracing::info_span!("get_receipt"))
            .await
            .map_err(|_elapsed| DeploymentError::Timeout {
                contract: contract.to_owned(),
                tx_hash,
                timeout: self.confirmation_timeout,
            })?
            .inspect_err(|err| tracing::error!("Transaction failed {err:?}"))
            .map_err(|e| DeploymentError::from_receipt_error(contract, tx_hash, e))?;

        if !receipt.status() {
            tracing::error!("Transaction reverted {:#?}", receipt.transaction_hash);
            return Err(DeploymentError::Reverted {
                contract: contract.to_owned(),
                tx_hash,
            });
        }

        let address = receipt
            .contract_address
            .ok_or_else(|| DeploymentError::MissingContractAddress {
                contract: contract.to_owned(),
                tx_hash,
            })?;
        tracing::info!("{contract} deployed at {address} in transaction {tx_hash}");
        Ok(address)
    }
}

#[async_trait::async_trait]
impl<P> ContractDeployer for AlloyContractDeployer<P>
where
    P: Provider<Ethereum> + 'static,
{
    async fn deploy(&self, request: DeployRequest) -> Result<Address, DeploymentError> {
        let tracing_span = tracing::info_span!("deploy_contract", contract = request.contract.as_str());
        self.deploy_impl(request).instrument(tracing_span).await
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to convert string to hex")]
    FromHexError,
    #[error("Failed to parse private key")]
    ParsePrivateKeyError,
    #[error("Failed to deserialize private key")]
    DeserializePrivateKeyError,
}

pub type DefaultProvider = alloy::providers::fillers::FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::fillers::JoinFill<
            alloy::providers::Identity,
            <Ethereum as RecommendedFillers>::RecommendedFillers,
        >,
        alloy::providers::fillers::WalletFiller<EthereumWallet>,
    >,
    alloy::providers::RootProvider,
>;

pub type DefaultContractDeployer = AlloyContractDeployer<DefaultProvider>;

pub struct ProviderFactory {}
impl ProviderFactory {
    pub fn decode_key(private_key_raw: &str) -> Result<k256::SecretKey, ProviderError> {
        let key_str = private_key_raw
            .split("0x")
            .last()
            .ok_or(ProviderError::ParsePrivateKeyError)?
            .trim();
        let key_hex = hex::decode(key_str).map_err(|_e| ProviderError::FromHexError)?;
        if key_hex.len() != 32 {
            return Err(ProviderError::DeserializePrivateKeyError);
        }
        let key = k256::SecretKey::from_bytes((&key_hex[..]).into())
            .map_err(|_e| ProviderError::DeserializePrivateKeyError)?;
        Ok(key)
    }

    pub fn create_provider(key: k256::SecretKey, endpoint: Url) -> DefaultProvider {
        let signer: PrivateKeySigner = PrivateKeySigner::from(key);
        let wallet: EthereumWallet = EthereumWallet::from(signer);
        ProviderBuilder::new().wallet(wallet).connect_http(endpoint)
    }
}
