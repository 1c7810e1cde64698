#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::fhe::DecryptionRequestId;
use crate::spectrum::{CategoryId, SpectrumId};
use crate::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};

pub const AUDIT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

const AUDIT_HASH_HEX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AuditEventId(pub u64);

impl Validate for AuditEventId {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_id",
                reason: "must be > 0",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditEngine {
    RecordStore,
    Correlator,
    Counter,
    Other(String),
}

impl Validate for AuditEngine {
    fn validate(&self) -> Result<(), ContractViolation> {
        if let AuditEngine::Other(s) = self {
            if s.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "audit_engine.other",
                    reason: "must not be empty",
                });
            }
            if s.len() > 64 {
                return Err(ContractViolation::InvalidValue {
                    field: "audit_engine.other",
                    reason: "must be <= 64 chars",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditEventType {
    RecordSubmitted,
    RevealRequested,
    RevealCompleted,
    CounterInitialized,
    CounterIncremented,
    CounterRevealRequested,
    CounterRevealCompleted,
    PendingRequestsCollected,
    Other,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordSubmitted => "record_submitted",
            Self::RevealRequested => "reveal_requested",
            Self::RevealCompleted => "reveal_completed",
            Self::CounterInitialized => "counter_initialized",
            Self::CounterIncremented => "counter_incremented",
            Self::CounterRevealRequested => "counter_reveal_requested",
            Self::CounterRevealCompleted => "counter_reveal_completed",
            Self::PendingRequestsCollected => "pending_requests_collected",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditSeverity {
    Info,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PayloadKey(String);

fn is_ascii_lower_snake_key(s: &str) -> bool {
    let b = s.as_bytes();
    if b.is_empty() {
        return false;
    }
    if !b[0].is_ascii_lowercase() {
        return false;
    }
    for &c in b.iter().skip(1) {
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'_') {
            return false;
        }
    }
    true
}

impl PayloadKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ContractViolation> {
        let k = Self(key.into());
        k.validate()?;
        Ok(k)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for PayloadKey {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must be <= 64 chars",
            });
        }
        if !is_ascii_lower_snake_key(&self.0) {
            return Err(ContractViolation::InvalidValue {
                field: "payload_key",
                reason: "must be lower_snake_case (a-z0-9_)",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadValue(String);

impl PayloadValue {
    pub fn new(value: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(value.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for PayloadValue {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "payload_value",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 256 {
            return Err(ContractViolation::InvalidValue {
                field: "payload_value",
                reason: "must be <= 256 chars",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditPayloadMin {
    pub schema_version: SchemaVersion,
    pub entries: BTreeMap<PayloadKey, PayloadValue>,
}

impl AuditPayloadMin {
    pub fn v1(entries: BTreeMap<PayloadKey, PayloadValue>) -> Result<Self, ContractViolation> {
        let p = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            entries,
        };
        p.validate()?;
        Ok(p)
    }

    /// Builds a payload from `(key, value)` string pairs.
    pub fn from_pairs(pairs: &[(&str, String)]) -> Result<Self, ContractViolation> {
        let mut entries = BTreeMap::new();
        for (k, v) in pairs {
            entries.insert(PayloadKey::new(*k)?, PayloadValue::new(v.clone())?);
        }
        Self::v1(entries)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Validate for AuditPayloadMin {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_payload_min.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        if self.entries.len() > 16 {
            return Err(ContractViolation::InvalidValue {
                field: "audit_payload_min.entries",
                reason: "must be <= 16 entries",
            });
        }
        let mut total_bytes: usize = 0;
        for (k, v) in &self.entries {
            k.validate()?;
            v.validate()?;
            total_bytes = total_bytes.saturating_add(k.as_str().len());
            total_bytes = total_bytes.saturating_add(v.as_str().len());
            if total_bytes > 2048 {
                return Err(ContractViolation::InvalidValue {
                    field: "audit_payload_min",
                    reason: "total payload size must be <= 2048 bytes",
                });
            }
        }
        Ok(())
    }
}

fn allowed_payload_keys_for_event(event_type: AuditEventType) -> Option<&'static [&'static str]> {
    match event_type {
        AuditEventType::RecordSubmitted => Some(&["submitted_at", "payload_handle"]),
        AuditEventType::RevealRequested => Some(&["handle_count"]),
        AuditEventType::RevealCompleted => Some(&["quantity"]),
        AuditEventType::CounterInitialized => Some(&["counter_handle"]),
        AuditEventType::CounterIncremented => Some(&["counter_handle", "increments"]),
        AuditEventType::CounterRevealRequested => Some(&["observed_increments"]),
        AuditEventType::CounterRevealCompleted => Some(&["count", "observed_increments"]),
        AuditEventType::PendingRequestsCollected => Some(&["collected"]),
        AuditEventType::Other => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEventInput {
    pub schema_version: SchemaVersion,
    pub created_at: MonotonicTimeNs,
    pub engine: AuditEngine,
    pub event_type: AuditEventType,
    pub reason_code: ReasonCodeId,
    pub severity: AuditSeverity,
    pub spectrum_id: Option<SpectrumId>,
    pub request_id: Option<DecryptionRequestId>,
    pub category: Option<CategoryId>,
    pub payload_min: AuditPayloadMin,
}

impl AuditEventInput {
    #[allow(clippy::too_many_arguments)]
    pub fn v1(
        created_at: MonotonicTimeNs,
        engine: AuditEngine,
        event_type: AuditEventType,
        reason_code: ReasonCodeId,
        severity: AuditSeverity,
        spectrum_id: Option<SpectrumId>,
        request_id: Option<DecryptionRequestId>,
        category: Option<CategoryId>,
        payload_min: AuditPayloadMin,
    ) -> Result<Self, ContractViolation> {
        let e = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            created_at,
            engine,
            event_type,
            reason_code,
            severity,
            spectrum_id,
            request_id,
            category,
            payload_min,
        };
        e.validate()?;
        Ok(e)
    }
}

#[allow(clippy::too_many_arguments)]
fn validate_event_body(
    prefix: &'static str,
    created_at: MonotonicTimeNs,
    engine: &AuditEngine,
    event_type: AuditEventType,
    reason_code: ReasonCodeId,
    spectrum_id: Option<SpectrumId>,
    request_id: Option<DecryptionRequestId>,
    payload_min: &AuditPayloadMin,
) -> Result<(), ContractViolation> {
    if created_at.0 == 0 {
        return Err(ContractViolation::InvalidValue {
            field: prefix,
            reason: "created_at must be > 0",
        });
    }
    if reason_code.0 == 0 {
        return Err(ContractViolation::InvalidValue {
            field: prefix,
            reason: "reason_code must be > 0",
        });
    }
    if let Some(id) = spectrum_id {
        id.validate()?;
    }
    if let Some(id) = request_id {
        id.validate()?;
    }
    engine.validate()?;
    payload_min.validate()?;
    if let Some(allowed) = allowed_payload_keys_for_event(event_type) {
        for k in payload_min.entries.keys() {
            if !allowed.contains(&k.as_str()) {
                return Err(ContractViolation::InvalidValue {
                    field: prefix,
                    reason: "payload contains unapproved key for this event_type",
                });
            }
        }
    }
    Ok(())
}

impl Validate for AuditEventInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event_input.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        validate_event_body(
            "audit_event_input",
            self.created_at,
            &self.engine,
            self.event_type,
            self.reason_code,
            self.spectrum_id,
            self.request_id,
            &self.payload_min,
        )
    }
}

/// One row of the append-only, hash-chained audit ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub schema_version: SchemaVersion,
    pub event_id: AuditEventId,
    pub created_at: MonotonicTimeNs,
    pub engine: AuditEngine,
    pub event_type: AuditEventType,
    pub reason_code: ReasonCodeId,
    pub severity: AuditSeverity,
    pub spectrum_id: Option<SpectrumId>,
    pub request_id: Option<DecryptionRequestId>,
    pub category: Option<CategoryId>,
    pub payload_min: AuditPayloadMin,
    pub prev_hash: Option<String>,
    pub event_hash: String,
}

impl AuditEvent {
    pub fn from_input_v1(
        event_id: AuditEventId,
        prev_hash: Option<String>,
        event_hash: String,
        input: AuditEventInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        let e = Self {
            schema_version: AUDIT_CONTRACT_VERSION,
            event_id,
            created_at: input.created_at,
            engine: input.engine,
            event_type: input.event_type,
            reason_code: input.reason_code,
            severity: input.severity,
            spectrum_id: input.spectrum_id,
            request_id: input.request_id,
            category: input.category,
            payload_min: input.payload_min,
            prev_hash,
            event_hash,
        };
        e.validate()?;
        Ok(e)
    }
}

fn validate_hash_hex(field: &'static str, value: &str) -> Result<(), ContractViolation> {
    if value.len() != AUDIT_HASH_HEX_LEN
        || !value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be 64 lowercase hex chars",
        });
    }
    Ok(())
}

impl Validate for AuditEvent {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != AUDIT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "audit_event.schema_version",
                reason: "must match AUDIT_CONTRACT_VERSION",
            });
        }
        self.event_id.validate()?;
        validate_event_body(
            "audit_event",
            self.created_at,
            &self.engine,
            self.event_type,
            self.reason_code,
            self.spectrum_id,
            self.request_id,
            &self.payload_min,
        )?;
        if let Some(h) = &self.prev_hash {
            validate_hash_hex("audit_event.prev_hash", h)?;
        }
        validate_hash_hex("audit_event.event_hash", &self.event_hash)
    }
}
