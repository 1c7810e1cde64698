#![forbid(unsafe_code)]

use std::fmt;

use spectra_engines::envelope::EnvelopeError;
use spectra_kernel_contracts::fhe::{DecryptionRequestId, ProviderError};
use spectra_kernel_contracts::reveal::CleartextDecodeError;
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId};
use spectra_kernel_contracts::ContractViolation;
use spectra_storage::store::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpectraError {
    UnknownRecord {
        spectrum_id: SpectrumId,
    },
    UnknownRequest {
        request_id: DecryptionRequestId,
    },
    /// `spectrum_id` is `SpectrumId::NONE` when a counter-reveal request was replayed.
    AlreadyRevealed {
        spectrum_id: SpectrumId,
        request_id: Option<DecryptionRequestId>,
    },
    ProofVerificationFailed {
        request_id: DecryptionRequestId,
    },
    MalformedCleartext {
        detail: String,
    },
    CategoryNotFound {
        category: CategoryId,
    },
    Provider(ProviderError),
    Storage(StorageError),
    Contract(ContractViolation),
}

impl fmt::Display for SpectraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRecord { spectrum_id } => write!(f, "unknown record {}", spectrum_id.0),
            Self::UnknownRequest { request_id } => {
                write!(f, "unknown decryption request {}", request_id.0)
            }
            Self::AlreadyRevealed {
                spectrum_id,
                request_id,
            } => match request_id {
                Some(r) if spectrum_id.is_none() => {
                    write!(f, "counter reveal request {} already resolved", r.0)
                }
                _ => write!(f, "record {} already revealed", spectrum_id.0),
            },
            Self::ProofVerificationFailed { request_id } => {
                write!(f, "proof verification failed for request {}", request_id.0)
            }
            Self::MalformedCleartext { detail } => write!(f, "malformed cleartext: {detail}"),
            Self::CategoryNotFound { category } => {
                write!(f, "no counter for category {}", category.0)
            }
            Self::Provider(err) => write!(f, "provider error: {err}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Contract(err) => write!(f, "contract violation: {err}"),
        }
    }
}

impl std::error::Error for SpectraError {}

impl From<ProviderError> for SpectraError {
    fn from(value: ProviderError) -> Self {
        Self::Provider(value)
    }
}

impl From<StorageError> for SpectraError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<ContractViolation> for SpectraError {
    fn from(value: ContractViolation) -> Self {
        Self::Contract(value)
    }
}

impl From<CleartextDecodeError> for SpectraError {
    fn from(value: CleartextDecodeError) -> Self {
        Self::MalformedCleartext {
            detail: value.to_string(),
        }
    }
}

impl From<EnvelopeError> for SpectraError {
    fn from(value: EnvelopeError) -> Self {
        Self::MalformedCleartext {
            detail: value.to_string(),
        }
    }
}
