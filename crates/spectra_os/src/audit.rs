#![forbid(unsafe_code)]

use spectra_kernel_contracts::audit::{
    AuditEngine, AuditEventInput, AuditEventType, AuditPayloadMin, AuditSeverity,
};
use spectra_kernel_contracts::fhe::DecryptionRequestId;
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId};
use spectra_kernel_contracts::{ContractViolation, MonotonicTimeNs, ReasonCodeId};

use crate::config::SpectraRegistryConfig;

/// Audit rows staged for one operation; handed to the store with the mutation they describe.
#[derive(Debug, Clone)]
pub(crate) struct AuditBatch {
    enabled: bool,
    now: MonotonicTimeNs,
    events: Vec<AuditEventInput>,
}

/// Subject columns of one audit row.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AuditSubject {
    pub spectrum_id: Option<SpectrumId>,
    pub request_id: Option<DecryptionRequestId>,
    pub category: Option<CategoryId>,
}

impl AuditBatch {
    pub(crate) fn new(config: &SpectraRegistryConfig, now: MonotonicTimeNs) -> Self {
        Self {
            enabled: config.audit_enabled,
            now,
            events: Vec::new(),
        }
    }

    pub(crate) fn push(
        &mut self,
        engine: AuditEngine,
        event_type: AuditEventType,
        reason_code: ReasonCodeId,
        subject: AuditSubject,
        payload: &[(&str, String)],
    ) -> Result<(), ContractViolation> {
        self.push_with_severity(
            AuditSeverity::Info,
            engine,
            event_type,
            reason_code,
            subject,
            payload,
        )
    }

    pub(crate) fn push_with_severity(
        &mut self,
        severity: AuditSeverity,
        engine: AuditEngine,
        event_type: AuditEventType,
        reason_code: ReasonCodeId,
        subject: AuditSubject,
        payload: &[(&str, String)],
    ) -> Result<(), ContractViolation> {
        if !self.enabled {
            return Ok(());
        }
        self.events.push(AuditEventInput::v1(
            self.now,
            engine,
            event_type,
            reason_code,
            severity,
            subject.spectrum_id,
            subject.request_id,
            subject.category,
            AuditPayloadMin::from_pairs(payload)?,
        )?);
        Ok(())
    }

    pub(crate) fn finish(self) -> Vec<AuditEventInput> {
        self.events
    }
}
