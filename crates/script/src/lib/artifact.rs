use std::path::{Path, PathBuf};

use alloy::json_abi::JsonAbi;
use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read contract artifact {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Malformed contract artifact {path:?}: {source}")]
    Malformed { path: PathBuf, source: serde_json::Error },

    #[error("Contract artifact bytecode is not valid hex: {0}")]
    InvalidBytecode(#[from] hex::FromHexError),

    #[error("Contract artifact has empty bytecode")]
    EmptyBytecode,

    #[error("Contract artifact abi is not a valid interface description: {0}")]
    InvalidAbi(serde_json::Error),

    #[error("Contract constructor {found:?} does not match any supported signature")]
    UnsupportedConstructor { found: Vec<String> },
}

/// Hardhat and Truffle emit the creation code as a bare hex string, Foundry
/// nests it under `object`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactBytecode {
    Hex(String),
    Object { object: String },
}

impl ArtifactBytecode {
    pub fn as_hex(&self) -> &str {
        match self {
            Self::Hex(value) => value,
            Self::Object { object } => object,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractArtifact {
    pub bytecode: ArtifactBytecode,
    pub abi: serde_json::Value,
}

impl ContractArtifact {
    pub fn creation_code(&self) -> Result<Bytes, ArtifactError> {
        let raw = self.bytecode.as_hex().trim();
        let decoded = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))?;
        if decoded.is_empty() {
            return Err(ArtifactError::EmptyBytecode);
        }
        Ok(decoded.into())
    }

    pub fn json_abi(&self) -> Result<JsonAbi, ArtifactError> {
        serde_json::from_value(self.abi.clone()).map_err(ArtifactError::InvalidAbi)
    }

    /// Solidity type names of the constructor parameters, empty when the ABI
    /// declares no constructor.
    pub fn constructor_inputs(&self) -> Result<Vec<String>, ArtifactError> {
        let abi = self.json_abi()?;
        let inputs = abi
            .constructor()
            .map(|constructor| constructor.inputs.iter().map(|param| param.selector_type().into_owned()).collect())
            .unwrap_or_default();
        Ok(inputs)
    }
}

pub fn read_artifact(path: &Path) -> Result<ContractArtifact, ArtifactError> {
    tracing::debug!("Reading contract artifact from {:?}", path.as_os_str());
    let artifact: ContractArtifact = utils::read_json(path).map_err(|e| match e {
        utils::Error::IoError(source) => ArtifactError::Read {
            path: path.to_owned(),
            source,
        },
        utils::Error::JsonError(source) => ArtifactError::Malformed {
            path: path.to_owned(),
            source,
        },
    })?;
    // Surface bad hex here rather than halfway through a deployment
    let code = artifact.creation_code()?;
    tracing::info!("Loaded contract artifact {:?} ({} bytes of creation code)", path.as_os_str(), code.len());
    Ok(artifact)
}
