#![forbid(unsafe_code)]

use spectra_kernel_contracts::audit::{AuditEvent, AuditEventId, AuditEventInput};
use spectra_kernel_contracts::counter::{CounterRevealRecord, ProteinCounterRecord};
use spectra_kernel_contracts::fhe::{CiphertextHandle, DecryptionRequestId};
use spectra_kernel_contracts::reveal::PendingRequestRecord;
use spectra_kernel_contracts::spectrum::{
    CategoryId, RevealState, SpectrumId, SpectrumRecord, SpectrumRecordView,
};

use crate::store::{SpectraStore, StorageError};

/// Typed read interface over the encrypted record store (`spectra` + `reveal_states`).
pub trait SpectrumRecordRepo {
    fn spectrum_row(&self, spectrum_id: SpectrumId) -> Option<&SpectrumRecord>;
    fn spectrum_view(&self, spectrum_id: SpectrumId) -> Option<SpectrumRecordView>;
    fn spectrum_views(&self) -> Vec<SpectrumRecordView>;
    fn reveal_state_row(&self, spectrum_id: SpectrumId) -> RevealState;
}

/// Typed read interface over the decryption request correlation table.
pub trait DecryptionRequestRepo {
    fn pending_request_row(&self, request_id: DecryptionRequestId)
        -> Option<&PendingRequestRecord>;
    fn pending_request_rows_for_spectrum(
        &self,
        spectrum_id: SpectrumId,
    ) -> Vec<&PendingRequestRecord>;
    fn spectrum_for_request(&self, request_id: DecryptionRequestId) -> SpectrumId;
}

/// Typed read interface over protein counters and their persisted reveals.
pub trait ProteinCounterRepo {
    fn counter_row(&self, category: CategoryId) -> Option<&ProteinCounterRecord>;
    fn counter_handle(&self, category: CategoryId) -> Option<CiphertextHandle>;
    fn counter_rows(&self) -> Vec<&ProteinCounterRecord>;
    fn category_list_rows(&self) -> &[CategoryId];
    fn counter_reveal_rows(&self) -> &[CounterRevealRecord];
    fn latest_counter_reveal_row(&self, category: CategoryId) -> Option<&CounterRevealRecord>;
}

/// Typed repository interface for the append-only audit ledger.
pub trait SpectraAuditRepo {
    fn append_audit_row(&mut self, input: AuditEventInput) -> Result<AuditEventId, StorageError>;
    fn audit_rows(&self) -> &[AuditEvent];
    fn audit_rows_by_spectrum(&self, spectrum_id: SpectrumId) -> Vec<&AuditEvent>;
    fn audit_rows_since(&self, after: AuditEventId) -> &[AuditEvent];
    fn audit_chain_intact(&self) -> bool;
}

impl SpectrumRecordRepo for SpectraStore {
    fn spectrum_row(&self, spectrum_id: SpectrumId) -> Option<&SpectrumRecord> {
        self.spectra().get(spectrum_id)
    }

    fn spectrum_view(&self, spectrum_id: SpectrumId) -> Option<SpectrumRecordView> {
        self.spectra().view(spectrum_id)
    }

    fn spectrum_views(&self) -> Vec<SpectrumRecordView> {
        self.spectra().views()
    }

    fn reveal_state_row(&self, spectrum_id: SpectrumId) -> RevealState {
        self.spectra().reveal_state(spectrum_id)
    }
}

impl DecryptionRequestRepo for SpectraStore {
    fn pending_request_row(
        &self,
        request_id: DecryptionRequestId,
    ) -> Option<&PendingRequestRecord> {
        self.pending_requests().get(request_id)
    }

    fn pending_request_rows_for_spectrum(
        &self,
        spectrum_id: SpectrumId,
    ) -> Vec<&PendingRequestRecord> {
        self.pending_requests().for_spectrum(spectrum_id)
    }

    fn spectrum_for_request(&self, request_id: DecryptionRequestId) -> SpectrumId {
        self.pending_requests().spectrum_for(request_id)
    }
}

impl ProteinCounterRepo for SpectraStore {
    fn counter_row(&self, category: CategoryId) -> Option<&ProteinCounterRecord> {
        self.protein_counters().get(category)
    }

    fn counter_handle(&self, category: CategoryId) -> Option<CiphertextHandle> {
        self.protein_counters()
            .get(category)
            .map(|r| r.counter_handle)
    }

    fn counter_rows(&self) -> Vec<&ProteinCounterRecord> {
        self.protein_counters().rows()
    }

    fn category_list_rows(&self) -> &[CategoryId] {
        self.protein_counters().category_list()
    }

    fn counter_reveal_rows(&self) -> &[CounterRevealRecord] {
        self.protein_counters().reveals()
    }

    fn latest_counter_reveal_row(&self, category: CategoryId) -> Option<&CounterRevealRecord> {
        self.protein_counters().latest_reveal(category)
    }
}

impl SpectraAuditRepo for SpectraStore {
    fn append_audit_row(&mut self, input: AuditEventInput) -> Result<AuditEventId, StorageError> {
        self.append_audit_event(input)
    }

    fn audit_rows(&self) -> &[AuditEvent] {
        self.audit_ledger().rows()
    }

    fn audit_rows_by_spectrum(&self, spectrum_id: SpectrumId) -> Vec<&AuditEvent> {
        self.audit_ledger().rows_by_spectrum(spectrum_id)
    }

    fn audit_rows_since(&self, after: AuditEventId) -> &[AuditEvent] {
        self.audit_ledger().rows_since(after)
    }

    fn audit_chain_intact(&self) -> bool {
        self.audit_ledger().verify_chain()
    }
}
