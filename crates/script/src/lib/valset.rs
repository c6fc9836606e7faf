use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

// Amino JSON renders 64-bit integers as decimal strings, fixtures often use numbers
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub power: u64,
    pub ethereum_address: String,
}

/// Signer set of the bridge. Member order is the one the Cosmos side sorted
/// the set into and is what the contract checks signatures against, so it
/// is carried through untouched.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valset {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub nonce: u64,
    pub members: Vec<Validator>,
}

/// Amino JSON envelope around the valset returned by the peggy query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValsetTypeWrapper {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Valset,
}

#[derive(Debug, thiserror::Error)]
#[error("Validator {index} has invalid ethereum address {address:?}: {reason}")]
pub struct InvalidEthereumAddress {
    pub index: usize,
    pub address: String,
    pub reason: String,
}

impl Valset {
    pub fn eth_addresses(&self) -> Result<Vec<Address>, InvalidEthereumAddress> {
        self.members
            .iter()
            .enumerate()
            .map(|(index, member)| {
                member
                    .ethereum_address
                    .trim()
                    .parse::<Address>()
                    .map_err(|e| InvalidEthereumAddress {
                        index,
                        address: member.ethereum_address.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }

    pub fn powers(&self) -> Vec<u64> {
        self.members.iter().map(|member| member.power).collect()
    }

    pub fn total_power(&self) -> u128 {
        self.members.iter().map(|member| u128::from(member.power)).sum()
    }
}
