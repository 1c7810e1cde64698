#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{hex_lower, ContractViolation, Validate};

pub const CIPHERTEXT_HANDLE_LEN: usize = 32;

/// Opaque provider-issued reference to a value under homomorphic encryption.
///
/// The registry never interprets the bytes. Equality is identity of the handle, not of the
/// encrypted value: two encryptions of the same plaintext carry different handles.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CiphertextHandle([u8; CIPHERTEXT_HANDLE_LEN]);

impl CiphertextHandle {
    pub fn new(bytes: [u8; CIPHERTEXT_HANDLE_LEN]) -> Result<Self, ContractViolation> {
        let h = Self(bytes);
        h.validate()?;
        Ok(h)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ContractViolation> {
        let arr: [u8; CIPHERTEXT_HANDLE_LEN] =
            bytes
                .try_into()
                .map_err(|_| ContractViolation::InvalidValue {
                    field: "ciphertext_handle",
                    reason: "must be exactly 32 bytes",
                })?;
        Self::new(arr)
    }

    pub fn as_bytes(&self) -> &[u8; CIPHERTEXT_HANDLE_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex_lower(&self.0)
    }

    /// Short prefix for audit payloads; never used as an identity.
    pub fn short_hex(&self) -> String {
        self.to_hex()[..16].to_string()
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({})", self.short_hex())
    }
}

impl Validate for CiphertextHandle {
    fn validate(&self) -> Result<(), ContractViolation> {
        // All-zero is the provider convention for "uninitialized".
        if self.0.iter().all(|b| *b == 0) {
            return Err(ContractViolation::InvalidValue {
                field: "ciphertext_handle",
                reason: "must not be the all-zero handle",
            });
        }
        Ok(())
    }
}

/// Oracle-issued identifier of one asynchronous decryption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DecryptionRequestId(pub u64);

impl Validate for DecryptionRequestId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "decryption_request_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    UnknownHandle(CiphertextHandle),
    EmptyDecryptionRequest,
    InvalidRequestId(DecryptionRequestId),
    UnknownRequest(DecryptionRequestId),
    Unavailable(&'static str),
    Crypto,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHandle(h) => write!(f, "unknown ciphertext handle {}", h.short_hex()),
            Self::EmptyDecryptionRequest => write!(f, "decryption request carries no handles"),
            Self::InvalidRequestId(id) => write!(f, "provider issued invalid request id {}", id.0),
            Self::UnknownRequest(id) => write!(f, "no queued decryption request {}", id.0),
            Self::Unavailable(what) => write!(f, "compute provider unavailable: {what}"),
            Self::Crypto => write!(f, "compute provider cryptographic operation failed"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// External homomorphic compute collaborator.
///
/// Trusted for availability only: handles it returns are opaque, request ids are re-validated,
/// and any cleartext it eventually produces arrives through a proof-checked callback.
pub trait HomomorphicComputeProvider {
    fn encode_zero(&mut self) -> Result<CiphertextHandle, ProviderError>;
    fn encode_one(&mut self) -> Result<CiphertextHandle, ProviderError>;
    fn add(
        &mut self,
        lhs: &CiphertextHandle,
        rhs: &CiphertextHandle,
    ) -> Result<CiphertextHandle, ProviderError>;
    fn request_decryption(
        &mut self,
        handles: &[CiphertextHandle],
    ) -> Result<DecryptionRequestId, ProviderError>;
}

/// External proof checker for oracle callbacks.
pub trait OracleVerifier {
    fn verify(&self, request_id: DecryptionRequestId, cleartext: &[u8], proof: &[u8]) -> bool;
}
