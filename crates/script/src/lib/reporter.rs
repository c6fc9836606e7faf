use alloy_primitives::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to report bridge address {address}: {reason}")]
    Submission { address: Address, reason: String },
}

/// Hands the freshly deployed bridge address back to the cosmos chain, where
/// the peggy module checks the contract code and validator set at that
/// address before adopting it.
#[mockall::automock]
#[async_trait::async_trait]
pub trait AddressReporter: Send + Sync {
    async fn report_address(&self, bridge: Address) -> Result<(), ReportError>;
}

/// The cosmos side has no message for accepting a bridge address yet, so
/// nothing is submitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAddressReporter;

#[async_trait::async_trait]
impl AddressReporter for NoopAddressReporter {
    async fn report_address(&self, bridge: Address) -> Result<(), ReportError> {
        tracing::warn!(%bridge, "Reporting the bridge address to the cosmos chain is not yet implemented, skipping");
        Ok(())
    }
}
