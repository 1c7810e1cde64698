#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fhe::DecryptionRequestId;
use crate::spectrum::{CategoryId, SpectrumId};
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const REVEAL_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Cleartext is a sequence of fixed-width big-endian words.
pub const CLEARTEXT_WORD_LEN: usize = 32;

const RECORD_REVEAL_WORDS: usize = 2;
const COUNTER_REVEAL_WORDS: usize = 1;

/// What an in-flight decryption request was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingRequestKind {
    RecordReveal {
        spectrum_id: SpectrumId,
    },
    CounterReveal {
        category: CategoryId,
        observed_increments: u64,
    },
}

impl PendingRequestKind {
    pub fn expected_words(&self) -> usize {
        match self {
            Self::RecordReveal { .. } => RECORD_REVEAL_WORDS,
            Self::CounterReveal { .. } => COUNTER_REVEAL_WORDS,
        }
    }

    pub fn spectrum_id(&self) -> SpectrumId {
        match self {
            Self::RecordReveal { spectrum_id } => *spectrum_id,
            Self::CounterReveal { .. } => SpectrumId::NONE,
        }
    }

    /// Decodes `bytes` into the shape this request kind expects.
    pub fn decode_cleartext(&self, bytes: &[u8]) -> Result<DecodedCleartext, CleartextDecodeError> {
        let w = decode_words(bytes, self.expected_words())?;
        Ok(match self {
            Self::RecordReveal { .. } => {
                DecodedCleartext::Record(RecordRevealCleartext::from_words(&w))
            }
            Self::CounterReveal { .. } => {
                DecodedCleartext::Counter(CounterRevealCleartext::from_words(&w))
            }
        })
    }
}

impl Validate for PendingRequestKind {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            Self::RecordReveal { spectrum_id } => spectrum_id.validate(),
            Self::CounterReveal {
                observed_increments,
                ..
            } => {
                if *observed_increments == 0 {
                    return Err(ContractViolation::InvalidValue {
                        field: "pending_request_kind.observed_increments",
                        reason: "counter reveal requires an initialized counter",
                    });
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequestInput {
    pub schema_version: SchemaVersion,
    pub request_id: DecryptionRequestId,
    pub requested_at: MonotonicTimeNs,
    pub kind: PendingRequestKind,
}

impl PendingRequestInput {
    pub fn v1(
        request_id: DecryptionRequestId,
        requested_at: MonotonicTimeNs,
        kind: PendingRequestKind,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: REVEAL_CONTRACT_VERSION,
            request_id,
            requested_at,
            kind,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for PendingRequestInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != REVEAL_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "pending_request_input.schema_version",
                reason: "must match REVEAL_CONTRACT_VERSION",
            });
        }
        self.request_id.validate()?;
        if self.requested_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "pending_request_input.requested_at",
                reason: "must be > 0",
            });
        }
        self.kind.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequestRecord {
    pub schema_version: SchemaVersion,
    pub request_id: DecryptionRequestId,
    pub requested_at: MonotonicTimeNs,
    pub kind: PendingRequestKind,
    pub resolved_at: Option<MonotonicTimeNs>,
}

impl PendingRequestRecord {
    pub fn from_input_v1(input: PendingRequestInput) -> Result<Self, ContractViolation> {
        input.validate()?;
        Ok(Self {
            schema_version: REVEAL_CONTRACT_VERSION,
            request_id: input.request_id,
            requested_at: input.requested_at,
            kind: input.kind,
            resolved_at: None,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleartextDecodeError {
    LengthMismatch { expected: usize, got: usize },
    WordOverflow { word_index: usize },
}

impl fmt::Display for CleartextDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { expected, got } => {
                write!(f, "cleartext must be {expected} bytes, got {got}")
            }
            Self::WordOverflow { word_index } => {
                write!(f, "cleartext word {word_index} exceeds 64 bits")
            }
        }
    }
}

impl std::error::Error for CleartextDecodeError {}

pub fn encode_words(values: &[u64]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * CLEARTEXT_WORD_LEN];
    for (i, v) in values.iter().enumerate() {
        let end = (i + 1) * CLEARTEXT_WORD_LEN;
        out[end - 8..end].copy_from_slice(&v.to_be_bytes());
    }
    out
}

pub fn decode_words(bytes: &[u8], expected_words: usize) -> Result<Vec<u64>, CleartextDecodeError> {
    let expected = expected_words * CLEARTEXT_WORD_LEN;
    if bytes.len() != expected {
        return Err(CleartextDecodeError::LengthMismatch {
            expected,
            got: bytes.len(),
        });
    }
    let mut out = Vec::with_capacity(expected_words);
    for (word_index, word) in bytes.chunks_exact(CLEARTEXT_WORD_LEN).enumerate() {
        let (high, low) = word.split_at(CLEARTEXT_WORD_LEN - 8);
        if high.iter().any(|b| *b != 0) {
            return Err(CleartextDecodeError::WordOverflow { word_index });
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(low);
        out.push(u64::from_be_bytes(buf));
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRevealCleartext {
    pub category: CategoryId,
    pub quantity: u64,
}

impl RecordRevealCleartext {
    pub fn encode(&self) -> Vec<u8> {
        encode_words(&[self.category.0, self.quantity])
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CleartextDecodeError> {
        decode_words(bytes, RECORD_REVEAL_WORDS).map(|w| Self::from_words(&w))
    }

    // `w` holds exactly RECORD_REVEAL_WORDS words.
    fn from_words(w: &[u64]) -> Self {
        Self {
            category: CategoryId(w[0]),
            quantity: w[1],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRevealCleartext {
    pub count: u64,
}

impl CounterRevealCleartext {
    pub fn encode(&self) -> Vec<u8> {
        encode_words(&[self.count])
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CleartextDecodeError> {
        decode_words(bytes, COUNTER_REVEAL_WORDS).map(|w| Self::from_words(&w))
    }

    fn from_words(w: &[u64]) -> Self {
        Self { count: w[0] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedCleartext {
    Record(RecordRevealCleartext),
    Counter(CounterRevealCleartext),
}
