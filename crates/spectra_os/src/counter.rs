#![forbid(unsafe_code)]

use spectra_kernel_contracts::audit::{AuditEngine, AuditEventType};
use spectra_kernel_contracts::fhe::{CiphertextHandle, HomomorphicComputeProvider};
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId};
use spectra_kernel_contracts::ContractViolation;
use spectra_storage::repo::ProteinCounterRepo;
use spectra_storage::store::SpectraStore;

use crate::audit::{AuditBatch, AuditSubject};
use crate::error::SpectraError;

pub mod reason_codes {
    use spectra_kernel_contracts::ReasonCodeId;

    pub const SPECTRA_COUNTER_INITIALIZED: ReasonCodeId = ReasonCodeId(0x5350_0201);
    pub const SPECTRA_COUNTER_INCREMENTED: ReasonCodeId = ReasonCodeId(0x5350_0202);
}

/// Next value of one category counter, computed homomorphically but not yet stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedIncrement {
    pub category: CategoryId,
    pub next_handle: CiphertextHandle,
    pub initialized: bool,
    pub increments: u64,
}

/// Homomorphic protein counter: one running encrypted count per category.
#[derive(Debug, Default, Clone)]
pub struct CounterRuntime;

impl CounterRuntime {
    /// `counter + encode_one()`, starting from `encode_zero()` for a category seen the first
    /// time. Only the provider is touched; the store commit applies the result.
    pub fn prepare_increment<P: HomomorphicComputeProvider>(
        &self,
        store: &SpectraStore,
        provider: &mut P,
        category: CategoryId,
    ) -> Result<PreparedIncrement, SpectraError> {
        let (base, initialized, increments) = match store.counter_row(category) {
            Some(row) => (row.counter_handle, false, row.increments.saturating_add(1)),
            None => (provider.encode_zero()?, true, 1),
        };
        let one = provider.encode_one()?;
        let next_handle = provider.add(&base, &one)?;
        Ok(PreparedIncrement {
            category,
            next_handle,
            initialized,
            increments,
        })
    }

    pub(crate) fn stage_audit(
        &self,
        audit: &mut AuditBatch,
        spectrum_id: SpectrumId,
        prepared: &PreparedIncrement,
    ) -> Result<(), ContractViolation> {
        let subject = AuditSubject {
            spectrum_id: Some(spectrum_id),
            category: Some(prepared.category),
            ..AuditSubject::default()
        };
        if prepared.initialized {
            audit.push(
                AuditEngine::Counter,
                AuditEventType::CounterInitialized,
                reason_codes::SPECTRA_COUNTER_INITIALIZED,
                subject,
                &[],
            )?;
        }
        audit.push(
            AuditEngine::Counter,
            AuditEventType::CounterIncremented,
            reason_codes::SPECTRA_COUNTER_INCREMENTED,
            subject,
            &[
                ("counter_handle", prepared.next_handle.short_hex()),
                ("increments", prepared.increments.to_string()),
            ],
        )
    }

    pub fn get_counter(
        &self,
        store: &SpectraStore,
        category: CategoryId,
    ) -> Result<CiphertextHandle, SpectraError> {
        store
            .counter_handle(category)
            .ok_or(SpectraError::CategoryNotFound { category })
    }
}
