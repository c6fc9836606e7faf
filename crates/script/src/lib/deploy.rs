use core::fmt;
use std::fmt::Debug;

use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactError, ContractArtifact};
use crate::config::PeggyId;
use crate::valset::{InvalidEthereumAddress, Valset};

/// 66% of `u32::MAX`, the share of total voting power the bridge requires
/// before it accepts a signed update.
pub const POWER_THRESHOLD: u64 = 2_834_678_415;

#[derive(PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct BridgeDeployParams {
    pub peggy_id: PeggyId,
    pub power_threshold: u64,
    pub erc20: Address,
    pub validators: Vec<Address>,
    pub powers: Vec<u64>,
    pub valset_nonce: u64,
    pub valset_height: u64,
}

impl fmt::Display for BridgeDeployParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeDeployParams")
            .field("peggy_id", &self.peggy_id)
            .field("power_threshold", &self.power_threshold)
            .field("erc20", &self.erc20)
            .field("validators", &self.validators)
            .field("powers", &self.powers)
            .field("valset_nonce", &self.valset_nonce)
            .field("valset_height", &self.valset_height)
            .finish()
    }
}

impl Debug for BridgeDeployParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}") // just use display
    }
}

impl BridgeDeployParams {
    pub fn total_power(&self) -> u128 {
        self.powers.iter().map(|power| u128::from(*power)).sum()
    }
}

/// Bridge constructors this deployer knows how to seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorLayout {
    /// `(bytes32 peggyId, uint256 powerThreshold, address[] validators, uint256[] powers)`
    Valset,
    /// Older bridge revisions bind the token at construction:
    /// `(address tokenContract, bytes32 peggyId, uint256 powerThreshold, address[] validators, uint256[] powers)`
    TokenAndValset,
}

impl ConstructorLayout {
    const VALSET: [&'static str; 4] = ["bytes32", "uint256", "address[]", "uint256[]"];
    const TOKEN_AND_VALSET: [&'static str; 5] = ["address", "bytes32", "uint256", "address[]", "uint256[]"];

    pub fn from_inputs(inputs: &[String]) -> Result<Self, ArtifactError> {
        if inputs.iter().map(String::as_str).eq(Self::VALSET) {
            Ok(Self::Valset)
        } else if inputs.iter().map(String::as_str).eq(Self::TOKEN_AND_VALSET) {
            Ok(Self::TokenAndValset)
        } else {
            Err(ArtifactError::UnsupportedConstructor {
                found: inputs.to_vec(),
            })
        }
    }

    pub fn from_artifact(artifact: &ContractArtifact) -> Result<Self, ArtifactError> {
        Self::from_inputs(&artifact.constructor_inputs()?)
    }
}

pub fn prepare_deploy_params(
    peggy_id: &PeggyId,
    valset: &Valset,
    valset_height: u64,
    erc20: Address,
) -> Result<BridgeDeployParams, InvalidEthereumAddress> {
    let params = BridgeDeployParams {
        peggy_id: peggy_id.clone(),
        power_threshold: POWER_THRESHOLD,
        erc20,
        validators: valset.eth_addresses()?,
        powers: valset.powers(),
        valset_nonce: valset.nonce,
        valset_height,
    };

    if params.validators.is_empty() {
        tracing::warn!("Valset has no members, the bridge will never reach its power threshold");
    } else if params.total_power() < u128::from(POWER_THRESHOLD) {
        tracing::warn!(
            total_power = %params.total_power(),
            threshold = POWER_THRESHOLD,
            "Cumulative valset power is below the threshold, the bridge constructor will likely reject it"
        );
    }
    Ok(params)
}

pub fn encode_constructor_args(params: &BridgeDeployParams, layout: ConstructorLayout) -> Bytes {
    let peggy_id: FixedBytes<32> = params.peggy_id.as_bytes32();
    let threshold = U256::from(params.power_threshold);
    let validators = params.validators.clone();
    let powers: Vec<U256> = params.powers.iter().map(|power| U256::from(*power)).collect();

    let encoded = match layout {
        ConstructorLayout::Valset => (peggy_id, threshold, validators, powers).abi_encode_params(),
        ConstructorLayout::TokenAndValset => {
            (params.erc20, peggy_id, threshold, validators, powers).abi_encode_params()
        }
    };
    encoded.into()
}
