#![forbid(unsafe_code)]

use crate::fhe::{CiphertextHandle, DecryptionRequestId};
use crate::spectrum::CategoryId;
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const COUNTER_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Running homomorphic count for one protein category.
///
/// `increments` counts the homomorphic additions applied so far. It is bookkeeping about the
/// number of writes, never a decryption of the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProteinCounterRecord {
    pub schema_version: SchemaVersion,
    pub category: CategoryId,
    pub counter_handle: CiphertextHandle,
    pub increments: u64,
    pub initialized_at: MonotonicTimeNs,
    pub updated_at: MonotonicTimeNs,
}

impl ProteinCounterRecord {
    pub fn v1(
        category: CategoryId,
        counter_handle: CiphertextHandle,
        increments: u64,
        initialized_at: MonotonicTimeNs,
        updated_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: COUNTER_CONTRACT_VERSION,
            category,
            counter_handle,
            increments,
            initialized_at,
            updated_at,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for ProteinCounterRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != COUNTER_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "protein_counter.schema_version",
                reason: "must match COUNTER_CONTRACT_VERSION",
            });
        }
        self.counter_handle.validate()?;
        if self.initialized_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "protein_counter.initialized_at",
                reason: "must be > 0",
            });
        }
        if self.updated_at < self.initialized_at {
            return Err(ContractViolation::InvalidValue {
                field: "protein_counter.updated_at",
                reason: "must be >= initialized_at",
            });
        }
        Ok(())
    }
}

/// Persisted outcome of one verified counter decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRevealRecord {
    pub schema_version: SchemaVersion,
    pub category: CategoryId,
    pub count: u64,
    pub request_id: DecryptionRequestId,
    pub observed_increments: u64,
    pub revealed_at: MonotonicTimeNs,
}

impl CounterRevealRecord {
    pub fn v1(
        category: CategoryId,
        count: u64,
        request_id: DecryptionRequestId,
        observed_increments: u64,
        revealed_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            schema_version: COUNTER_CONTRACT_VERSION,
            category,
            count,
            request_id,
            observed_increments,
            revealed_at,
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for CounterRevealRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != COUNTER_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "counter_reveal.schema_version",
                reason: "must match COUNTER_CONTRACT_VERSION",
            });
        }
        self.request_id.validate()?;
        if self.revealed_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "counter_reveal.revealed_at",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}
