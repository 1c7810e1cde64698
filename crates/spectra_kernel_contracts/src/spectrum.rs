#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::fhe::CiphertextHandle;
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const SPECTRUM_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Registry-assigned record id. `0` is reserved as "no record".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpectrumId(pub u64);

impl SpectrumId {
    pub const NONE: SpectrumId = SpectrumId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl Validate for SpectrumId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "spectrum_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

/// Protein category as revealed by the oracle. Any value, including `0`, is a valid category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumRecordInput {
    pub schema_version: SchemaVersion,
    pub submitted_at: MonotonicTimeNs,
    pub encrypted_payload: CiphertextHandle,
    pub encrypted_category: CiphertextHandle,
    pub encrypted_quantity: CiphertextHandle,
}

impl SpectrumRecordInput {
    pub fn v1(
        submitted_at: MonotonicTimeNs,
        encrypted_payload: CiphertextHandle,
        encrypted_category: CiphertextHandle,
        encrypted_quantity: CiphertextHandle,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: SPECTRUM_CONTRACT_VERSION,
            submitted_at,
            encrypted_payload,
            encrypted_category,
            encrypted_quantity,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for SpectrumRecordInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != SPECTRUM_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "spectrum_record_input.schema_version",
                reason: "must match SPECTRUM_CONTRACT_VERSION",
            });
        }
        if self.submitted_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "spectrum_record_input.submitted_at",
                reason: "must be > 0",
            });
        }
        self.encrypted_payload.validate()?;
        self.encrypted_category.validate()?;
        self.encrypted_quantity.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumRecord {
    pub schema_version: SchemaVersion,
    pub spectrum_id: SpectrumId,
    pub submitted_at: MonotonicTimeNs,
    pub encrypted_payload: CiphertextHandle,
    pub encrypted_category: CiphertextHandle,
    pub encrypted_quantity: CiphertextHandle,
}

impl SpectrumRecord {
    pub fn from_input_v1(
        spectrum_id: SpectrumId,
        input: SpectrumRecordInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        let r = Self {
            schema_version: SPECTRUM_CONTRACT_VERSION,
            spectrum_id,
            submitted_at: input.submitted_at,
            encrypted_payload: input.encrypted_payload,
            encrypted_category: input.encrypted_category,
            encrypted_quantity: input.encrypted_quantity,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for SpectrumRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != SPECTRUM_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "spectrum_record.schema_version",
                reason: "must match SPECTRUM_CONTRACT_VERSION",
            });
        }
        self.spectrum_id.validate()?;
        if self.submitted_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "spectrum_record.submitted_at",
                reason: "must be > 0",
            });
        }
        self.encrypted_payload.validate()?;
        self.encrypted_category.validate()?;
        self.encrypted_quantity.validate()?;
        Ok(())
    }
}

/// Single-assignment reveal cell for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealState {
    pub category: CategoryId,
    pub quantity: u64,
    pub revealed: bool,
    pub revealed_at: Option<MonotonicTimeNs>,
}

impl RevealState {
    pub fn unrevealed() -> Self {
        Self {
            category: CategoryId(0),
            quantity: 0,
            revealed: false,
            revealed_at: None,
        }
    }

    pub fn revealed_v1(
        category: CategoryId,
        quantity: u64,
        revealed_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            category,
            quantity,
            revealed: true,
            revealed_at: Some(revealed_at),
        };
        r.validate()?;
        Ok(r)
    }

    /// `(category, quantity, revealed)` as exposed to callers.
    pub fn as_tuple(&self) -> (CategoryId, u64, bool) {
        (self.category, self.quantity, self.revealed)
    }
}

impl Default for RevealState {
    fn default() -> Self {
        Self::unrevealed()
    }
}

impl Validate for RevealState {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.revealed {
            if self.category.0 != 0 || self.quantity != 0 {
                return Err(ContractViolation::InvalidValue {
                    field: "reveal_state",
                    reason: "unrevealed state must carry zero category and quantity",
                });
            }
            if self.revealed_at.is_some() {
                return Err(ContractViolation::InvalidValue {
                    field: "reveal_state.revealed_at",
                    reason: "must be absent while unrevealed",
                });
            }
            return Ok(());
        }
        match self.revealed_at {
            Some(t) if t.0 > 0 => Ok(()),
            _ => Err(ContractViolation::InvalidValue {
                field: "reveal_state.revealed_at",
                reason: "must be > 0 once revealed",
            }),
        }
    }
}

/// Read-only projection of one record's observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectrumRecordView {
    pub spectrum_id: SpectrumId,
    pub submitted_at: MonotonicTimeNs,
    pub revealed: bool,
    pub category: CategoryId,
    pub quantity: u64,
}
