#![forbid(unsafe_code)]

use spectra_kernel_contracts::audit::{AuditEngine, AuditEventType};
use spectra_kernel_contracts::fhe::CiphertextHandle;
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId, SpectrumRecordInput};
use spectra_kernel_contracts::MonotonicTimeNs;
use spectra_storage::repo::SpectrumRecordRepo;
use spectra_storage::store::SpectraStore;

use crate::audit::{AuditBatch, AuditSubject};
use crate::config::SpectraRegistryConfig;
use crate::error::SpectraError;

pub mod reason_codes {
    use spectra_kernel_contracts::ReasonCodeId;

    pub const SPECTRA_RECORD_SUBMITTED: ReasonCodeId = ReasonCodeId(0x5350_0001);
}

/// Encrypted record store: accepts submissions and answers reveal reads.
#[derive(Debug, Clone)]
pub struct RecordStoreRuntime {
    config: SpectraRegistryConfig,
}

impl RecordStoreRuntime {
    pub fn new(config: SpectraRegistryConfig) -> Self {
        Self { config }
    }

    pub fn submit(
        &self,
        store: &mut SpectraStore,
        now: MonotonicTimeNs,
        encrypted_payload: CiphertextHandle,
        encrypted_category: CiphertextHandle,
        encrypted_quantity: CiphertextHandle,
    ) -> Result<SpectrumId, SpectraError> {
        let input = SpectrumRecordInput::v1(
            now,
            encrypted_payload,
            encrypted_category,
            encrypted_quantity,
        )?;
        let config = self.config;
        let spectrum_id = store.insert_spectrum(input, |spectrum_id| {
            let mut audit = AuditBatch::new(&config, now);
            audit.push(
                AuditEngine::RecordStore,
                AuditEventType::RecordSubmitted,
                reason_codes::SPECTRA_RECORD_SUBMITTED,
                AuditSubject {
                    spectrum_id: Some(spectrum_id),
                    ..AuditSubject::default()
                },
                &[
                    ("submitted_at", now.0.to_string()),
                    ("payload_handle", encrypted_payload.short_hex()),
                ],
            )?;
            Ok(audit.finish())
        })?;
        Ok(spectrum_id)
    }

    /// Sentinel `(0, 0, false)` for unknown or unrevealed records.
    pub fn get_reveal(&self, store: &SpectraStore, spectrum_id: SpectrumId) -> (CategoryId, u64, bool) {
        store.reveal_state_row(spectrum_id).as_tuple()
    }
}
