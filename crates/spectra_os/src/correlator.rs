#![forbid(unsafe_code)]

use spectra_kernel_contracts::audit::{AuditEngine, AuditEventType, AuditSeverity};
use spectra_kernel_contracts::counter::CounterRevealRecord;
use spectra_kernel_contracts::fhe::{DecryptionRequestId, HomomorphicComputeProvider};
use spectra_kernel_contracts::reveal::{PendingRequestInput, PendingRequestKind};
use spectra_kernel_contracts::spectrum::{CategoryId, RevealState, SpectrumId};
use spectra_kernel_contracts::MonotonicTimeNs;
use spectra_storage::repo::{DecryptionRequestRepo, ProteinCounterRepo, SpectrumRecordRepo};
use spectra_storage::store::{RecordRevealCommit, RecordRevealOutcome, SpectraStore};

use crate::audit::{AuditBatch, AuditSubject};
use crate::config::SpectraRegistryConfig;
use crate::counter::CounterRuntime;
use crate::error::SpectraError;

pub mod reason_codes {
    use spectra_kernel_contracts::ReasonCodeId;

    pub const SPECTRA_REVEAL_REQUESTED: ReasonCodeId = ReasonCodeId(0x5350_0101);
    pub const SPECTRA_REVEAL_COMPLETED: ReasonCodeId = ReasonCodeId(0x5350_0102);
    pub const SPECTRA_COUNTER_REVEAL_REQUESTED: ReasonCodeId = ReasonCodeId(0x5350_0103);
    pub const SPECTRA_COUNTER_REVEAL_COMPLETED: ReasonCodeId = ReasonCodeId(0x5350_0104);
    pub const SPECTRA_PENDING_REQUESTS_COLLECTED: ReasonCodeId = ReasonCodeId(0x5350_0105);
}

/// Decryption request correlator: issues oracle requests and owns their resolution.
#[derive(Debug, Clone)]
pub struct CorrelatorRuntime {
    config: SpectraRegistryConfig,
    counter: CounterRuntime,
}

impl CorrelatorRuntime {
    pub fn new(config: SpectraRegistryConfig) -> Self {
        Self {
            config,
            counter: CounterRuntime,
        }
    }

    pub fn counter(&self) -> &CounterRuntime {
        &self.counter
    }

    pub fn request_reveal<P: HomomorphicComputeProvider>(
        &self,
        store: &mut SpectraStore,
        provider: &mut P,
        now: MonotonicTimeNs,
        spectrum_id: SpectrumId,
    ) -> Result<DecryptionRequestId, SpectraError> {
        let Some(record) = store.spectrum_row(spectrum_id) else {
            return Err(SpectraError::UnknownRecord { spectrum_id });
        };
        if store.reveal_state_row(spectrum_id).revealed {
            return Err(SpectraError::AlreadyRevealed {
                spectrum_id,
                request_id: None,
            });
        }
        let handles = [record.encrypted_category, record.encrypted_quantity];
        let request_id = provider.request_decryption(&handles)?;

        let input = PendingRequestInput::v1(
            request_id,
            now,
            PendingRequestKind::RecordReveal { spectrum_id },
        )?;
        let mut audit = AuditBatch::new(&self.config, now);
        audit.push(
            AuditEngine::Correlator,
            AuditEventType::RevealRequested,
            reason_codes::SPECTRA_REVEAL_REQUESTED,
            AuditSubject {
                spectrum_id: Some(spectrum_id),
                request_id: Some(request_id),
                category: None,
            },
            &[("handle_count", handles.len().to_string())],
        )?;
        store.insert_pending_request(input, audit.finish())?;
        Ok(request_id)
    }

    pub fn request_counter_reveal<P: HomomorphicComputeProvider>(
        &self,
        store: &mut SpectraStore,
        provider: &mut P,
        now: MonotonicTimeNs,
        category: CategoryId,
    ) -> Result<DecryptionRequestId, SpectraError> {
        let Some(counter) = store.counter_row(category) else {
            return Err(SpectraError::CategoryNotFound { category });
        };
        let observed_increments = counter.increments;
        let request_id = provider.request_decryption(&[counter.counter_handle])?;

        let input = PendingRequestInput::v1(
            request_id,
            now,
            PendingRequestKind::CounterReveal {
                category,
                observed_increments,
            },
        )?;
        let mut audit = AuditBatch::new(&self.config, now);
        audit.push(
            AuditEngine::Correlator,
            AuditEventType::CounterRevealRequested,
            reason_codes::SPECTRA_COUNTER_REVEAL_REQUESTED,
            AuditSubject {
                spectrum_id: None,
                request_id: Some(request_id),
                category: Some(category),
            },
            &[("observed_increments", observed_increments.to_string())],
        )?;
        store.insert_pending_request(input, audit.finish())?;
        Ok(request_id)
    }

    /// Writes a verified `(category, quantity)` into the record behind `request_id` and bumps
    /// that category's counter. Every check runs before the store is touched.
    pub fn resolve_reveal<P: HomomorphicComputeProvider>(
        &self,
        store: &mut SpectraStore,
        provider: &mut P,
        now: MonotonicTimeNs,
        request_id: DecryptionRequestId,
        category: CategoryId,
        quantity: u64,
    ) -> Result<RecordRevealOutcome, SpectraError> {
        let spectrum_id = match store.pending_request_row(request_id).map(|r| r.kind) {
            Some(PendingRequestKind::RecordReveal { spectrum_id }) => spectrum_id,
            Some(PendingRequestKind::CounterReveal { .. }) | None => {
                return Err(SpectraError::UnknownRequest { request_id })
            }
        };
        if store.reveal_state_row(spectrum_id).revealed {
            return Err(SpectraError::AlreadyRevealed {
                spectrum_id,
                request_id: Some(request_id),
            });
        }
        RevealState::revealed_v1(category, quantity, now)?;

        let prepared = self.counter.prepare_increment(store, provider, category)?;
        let collect_pending = self.config.gc_pending_on_reveal;

        let mut audit = AuditBatch::new(&self.config, now);
        audit.push(
            AuditEngine::Correlator,
            AuditEventType::RevealCompleted,
            reason_codes::SPECTRA_REVEAL_COMPLETED,
            AuditSubject {
                spectrum_id: Some(spectrum_id),
                request_id: Some(request_id),
                category: Some(category),
            },
            &[("quantity", quantity.to_string())],
        )?;
        self.counter.stage_audit(&mut audit, spectrum_id, &prepared)?;
        if collect_pending {
            let collected = store.pending_request_rows_for_spectrum(spectrum_id).len();
            audit.push(
                AuditEngine::Correlator,
                AuditEventType::PendingRequestsCollected,
                reason_codes::SPECTRA_PENDING_REQUESTS_COLLECTED,
                AuditSubject {
                    spectrum_id: Some(spectrum_id),
                    ..AuditSubject::default()
                },
                &[("collected", collected.to_string())],
            )?;
        }

        let outcome = store.commit_record_reveal(RecordRevealCommit {
            request_id,
            category,
            quantity,
            next_counter_handle: prepared.next_handle,
            now,
            collect_pending,
            audit: audit.finish(),
        })?;
        Ok(outcome)
    }

    /// Persists a verified counter decryption. At most once per request.
    pub fn resolve_counter_reveal(
        &self,
        store: &mut SpectraStore,
        now: MonotonicTimeNs,
        request_id: DecryptionRequestId,
        count: u64,
    ) -> Result<CounterRevealRecord, SpectraError> {
        let Some(pending) = store.pending_request_row(request_id) else {
            return Err(SpectraError::UnknownRequest { request_id });
        };
        let PendingRequestKind::CounterReveal {
            category,
            observed_increments,
        } = pending.kind
        else {
            return Err(SpectraError::UnknownRequest { request_id });
        };
        if pending.is_resolved() {
            return Err(SpectraError::AlreadyRevealed {
                spectrum_id: SpectrumId::NONE,
                request_id: Some(request_id),
            });
        }

        let row = CounterRevealRecord::v1(category, count, request_id, observed_increments, now)?;
        // A count that disagrees with the registry's own increments is kept but flagged.
        let severity = if count == observed_increments {
            AuditSeverity::Info
        } else {
            AuditSeverity::Warn
        };
        let mut audit = AuditBatch::new(&self.config, now);
        audit.push_with_severity(
            severity,
            AuditEngine::Correlator,
            AuditEventType::CounterRevealCompleted,
            reason_codes::SPECTRA_COUNTER_REVEAL_COMPLETED,
            AuditSubject {
                spectrum_id: None,
                request_id: Some(request_id),
                category: Some(category),
            },
            &[
                ("count", count.to_string()),
                ("observed_increments", observed_increments.to_string()),
            ],
        )?;
        store.commit_counter_reveal(row.clone(), now, audit.finish())?;
        Ok(row)
    }
}
