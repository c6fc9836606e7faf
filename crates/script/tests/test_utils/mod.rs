#![allow(dead_code)]
use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::Address;
use base64::Engine;
use hex_literal::hex;
use peggy_contract_deployer::config::{DeployConfig, Erc20Source, PeggyId};
use peggy_contract_deployer::cosmos_rpc::{AbciQueryResponse, MockCosmosRpc, NodeStatus, SyncInfo};
use peggy_contract_deployer::eth_client::ProviderFactory;
use peggy_contract_deployer::tracing as tracing_config;
use serde_json::json;

// anvil's first dev account
pub const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const PEGGY_ID: &str = "defaultpeggyid";
pub const VALSET_HEIGHT: u64 = 1520;

pub const FIXED_TOKEN: Address = Address::new(hex!("00000000000000000000000000000000000070ce"));
pub const DEPLOYED_TOKEN: Address = Address::new(hex!("5fbdb2315678afecb367f032d93f642f64180aa3"));
pub const DEPLOYED_BRIDGE: Address = Address::new(hex!("e7f1725e7734ce288f8367e1bb143e90bb3f0512"));

pub const BRIDGE_BYTECODE: &str = "0x608060405234801561001057600080fd5b50";
pub const TOKEN_BYTECODE: &str = "0x6080604052348015600f57600080fd5b50";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeAbi {
    Valset,
    TokenAndValset,
    Unsupported,
}

fn param(name: &str, ty: &str) -> serde_json::Value {
    json!({"name": name, "type": ty, "internalType": ty})
}

pub fn bridge_abi(kind: BridgeAbi) -> serde_json::Value {
    let mut inputs = vec![
        param("_peggyId", "bytes32"),
        param("_powerThreshold", "uint256"),
        param("_validators", "address[]"),
        param("_powers", "uint256[]"),
    ];
    match kind {
        BridgeAbi::Valset => {}
        BridgeAbi::TokenAndValset => inputs.insert(0, param("_tokenContract", "address")),
        BridgeAbi::Unsupported => inputs.truncate(2),
    }
    json!([
        {"type": "constructor", "stateMutability": "nonpayable", "inputs": inputs},
        {
            "type": "function",
            "name": "state_lastValsetNonce",
            "stateMutability": "view",
            "inputs": [],
            "outputs": [param("", "uint256")]
        }
    ])
}

pub fn token_abi() -> serde_json::Value {
    json!([
        {"type": "constructor", "stateMutability": "nonpayable", "inputs": []},
        {
            "type": "function",
            "name": "totalSupply",
            "stateMutability": "view",
            "inputs": [],
            "outputs": [param("", "uint256")]
        }
    ])
}

/// Hardhat style artifacts written to a scratch directory.
pub struct TestArtifacts {
    dir: tempfile::TempDir,
    pub bridge: PathBuf,
    pub token: PathBuf,
}

impl TestArtifacts {
    pub fn new(kind: BridgeAbi) -> Self {
        tracing_config::setup_logger(tracing_config::LoggingConfig::default_for_test());
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let bridge = dir.path().join("Peggy.json");
        let token = dir.path().join("TestERC20A.json");

        let bridge_content = json!({"contractName": "Peggy", "abi": bridge_abi(kind), "bytecode": BRIDGE_BYTECODE});
        let token_content = json!({"contractName": "TestERC20A", "abi": token_abi(), "bytecode": TOKEN_BYTECODE});
        std::fs::write(&bridge, bridge_content.to_string()).expect("Failed to write bridge artifact");
        std::fs::write(&token, token_content.to_string()).expect("Failed to write token artifact");

        Self { dir, bridge, token }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config(&self, erc20: Erc20Source) -> DeployConfig {
        DeployConfig {
            eth_node: "http://localhost:8545".parse().unwrap(),
            cosmos_node: "http://localhost:26657".parse().unwrap(),
            eth_private_key: ProviderFactory::decode_key(KEY).unwrap(),
            contract: self.bridge.clone(),
            erc20,
            peggy_id: PeggyId::new(PEGGY_ID).unwrap(),
            confirmation_timeout: Duration::from_secs(5),
            http_timeout: Duration::from_secs(5),
            store_params: None,
            dry_run: false,
        }
    }

    pub fn fixed_token_config(&self) -> DeployConfig {
        self.config(Erc20Source::Fixed(FIXED_TOKEN))
    }

    pub fn test_mode_config(&self) -> DeployConfig {
        self.config(Erc20Source::DeployTestToken {
            artifact: self.token.clone(),
        })
    }
}

/// `(ethereum_address, power)` in the order the node reports them.
pub fn valset_document(nonce: u64, members: &[(&str, u64)]) -> serde_json::Value {
    let members: Vec<serde_json::Value> = members
        .iter()
        .map(|(address, power)| json!({"power": power.to_string(), "ethereum_address": address}))
        .collect();
    json!({
        "type": "peggy/Valset",
        "value": {"nonce": nonce.to_string(), "members": members}
    })
}

pub fn encode_value(raw: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(raw)
}

pub fn synced_status(height: u64) -> NodeStatus {
    NodeStatus {
        sync_info: SyncInfo {
            latest_block_height: height,
            catching_up: false,
        },
    }
}

/// A synced node at `VALSET_HEIGHT` answering the valset query with `value`.
pub fn cosmos_returning(value: String) -> MockCosmosRpc {
    let mut rpc = MockCosmosRpc::new();
    rpc.expect_status().times(1).returning(|| Ok(synced_status(VALSET_HEIGHT)));
    rpc.expect_abci_query()
        .withf(|_path, height| *height == VALSET_HEIGHT)
        .times(1)
        .returning(move |_, _| {
            Ok(AbciQueryResponse {
                value: Some(value.clone()),
                ..Default::default()
            })
        });
    rpc
}

/// A cosmos node that must never be contacted.
pub fn untouched_cosmos() -> MockCosmosRpc {
    let mut rpc = MockCosmosRpc::new();
    rpc.expect_status().never();
    rpc.expect_abci_query().never();
    rpc
}
