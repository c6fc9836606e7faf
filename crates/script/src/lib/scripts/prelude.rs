use std::sync::Arc;

use alloy::providers::WalletProvider;
use thiserror::Error;

use crate::config::DeployConfig;
use crate::cosmos_rpc::{ReqwestCosmosClient, RpcError};
use crate::eth_client::{AlloyContractDeployer, DefaultContractDeployer, DefaultProvider, ProviderFactory};
use crate::reporter::NoopAddressReporter;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to create cosmos rpc client: {0}")]
    CosmosClient(#[from] RpcError),
}

pub struct ScriptRuntime {
    pub provider: Arc<DefaultProvider>,
    pub cosmos: ReqwestCosmosClient,
    pub deployer: DefaultContractDeployer,
    pub reporter: NoopAddressReporter,
}

impl ScriptRuntime {
    pub fn init(config: &DeployConfig) -> Result<Self, Error> {
        let provider = Arc::new(ProviderFactory::create_provider(
            config.eth_private_key.clone(),
            config.eth_node.clone(),
        ));
        tracing::info!(
            eth_node = %config.eth_node,
            signer = %provider.default_signer_address(),
            "Connected ethereum provider"
        );

        let cosmos = ReqwestCosmosClient::new(config.cosmos_node.as_str(), config.http_timeout)?;
        tracing::info!(cosmos_node = %config.cosmos_node, "Created cosmos rpc client");

        let deployer = AlloyContractDeployer::new(Arc::clone(&provider), config.confirmation_timeout);

        Ok(Self {
            provider,
            cosmos,
            deployer,
            reporter: NoopAddressReporter,
        })
    }

    pub fn cosmos(&self) -> &ReqwestCosmosClient {
        &self.cosmos
    }

    pub fn deployer(&self) -> &DefaultContractDeployer {
        &self.deployer
    }

    pub fn reporter(&self) -> &NoopAddressReporter {
        &self.reporter
    }
}
