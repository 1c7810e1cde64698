#![forbid(unsafe_code)]

use spectra_engines::envelope::OracleCallbackEnvelope;
use spectra_kernel_contracts::audit::{AuditEvent, AuditEventId};
use spectra_kernel_contracts::counter::{CounterRevealRecord, ProteinCounterRecord};
use spectra_kernel_contracts::fhe::{
    CiphertextHandle, DecryptionRequestId, HomomorphicComputeProvider, OracleVerifier,
};
use spectra_kernel_contracts::reveal::PendingRequestRecord;
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId, SpectrumRecordView};
use spectra_kernel_contracts::MonotonicTimeNs;
use spectra_storage::repo::{
    DecryptionRequestRepo, ProteinCounterRepo, SpectraAuditRepo, SpectrumRecordRepo,
};
use spectra_storage::store::SpectraStore;

use crate::config::SpectraRegistryConfig;
use crate::correlator::CorrelatorRuntime;
use crate::error::SpectraError;
use crate::gateway::{CallbackOutcome, OracleCallback, OracleGatewayRuntime};
use crate::record_store::RecordStoreRuntime;

/// Encrypted spectrum registry: owns the tables and routes every operation through the
/// component that owns the state it touches.
#[derive(Debug)]
pub struct SpectraRegistry<P, V> {
    config: SpectraRegistryConfig,
    store: SpectraStore,
    provider: P,
    verifier: V,
    record_store: RecordStoreRuntime,
    gateway: OracleGatewayRuntime,
}

impl<P, V> SpectraRegistry<P, V>
where
    P: HomomorphicComputeProvider,
    V: OracleVerifier,
{
    pub fn new(config: SpectraRegistryConfig, provider: P, verifier: V) -> Self {
        Self {
            config,
            store: SpectraStore::new_in_memory(),
            provider,
            verifier,
            record_store: RecordStoreRuntime::new(config),
            gateway: OracleGatewayRuntime::new(CorrelatorRuntime::new(config)),
        }
    }

    pub fn config(&self) -> &SpectraRegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &SpectraStore {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn submit(
        &mut self,
        now: MonotonicTimeNs,
        encrypted_payload: CiphertextHandle,
        encrypted_category: CiphertextHandle,
        encrypted_quantity: CiphertextHandle,
    ) -> Result<SpectrumId, SpectraError> {
        self.record_store.submit(
            &mut self.store,
            now,
            encrypted_payload,
            encrypted_category,
            encrypted_quantity,
        )
    }

    pub fn request_reveal(
        &mut self,
        now: MonotonicTimeNs,
        spectrum_id: SpectrumId,
    ) -> Result<DecryptionRequestId, SpectraError> {
        self.gateway.correlator().request_reveal(
            &mut self.store,
            &mut self.provider,
            now,
            spectrum_id,
        )
    }

    pub fn get_reveal(&self, spectrum_id: SpectrumId) -> (CategoryId, u64, bool) {
        self.record_store.get_reveal(&self.store, spectrum_id)
    }

    pub fn get_counter(&self, category: CategoryId) -> Result<CiphertextHandle, SpectraError> {
        self.gateway
            .correlator()
            .counter()
            .get_counter(&self.store, category)
    }

    pub fn request_counter_reveal(
        &mut self,
        now: MonotonicTimeNs,
        category: CategoryId,
    ) -> Result<DecryptionRequestId, SpectraError> {
        self.gateway.correlator().request_counter_reveal(
            &mut self.store,
            &mut self.provider,
            now,
            category,
        )
    }

    /// Oracle-only entry point.
    pub fn on_decryption_callback(
        &mut self,
        now: MonotonicTimeNs,
        request_id: DecryptionRequestId,
        cleartext: &[u8],
        proof: &[u8],
    ) -> Result<CallbackOutcome, SpectraError> {
        self.gateway.on_decryption_callback(
            &mut self.store,
            &mut self.provider,
            &self.verifier,
            now,
            OracleCallback {
                request_id,
                cleartext,
                proof,
            },
        )
    }

    pub fn on_callback_envelope(
        &mut self,
        now: MonotonicTimeNs,
        envelope: &OracleCallbackEnvelope,
    ) -> Result<CallbackOutcome, SpectraError> {
        self.gateway.on_callback_envelope(
            &mut self.store,
            &mut self.provider,
            &self.verifier,
            now,
            envelope,
        )
    }

    pub fn spectrum_row(&self, spectrum_id: SpectrumId) -> Option<SpectrumRecordView> {
        self.store.spectrum_view(spectrum_id)
    }

    pub fn spectrum_rows(&self) -> Vec<SpectrumRecordView> {
        self.store.spectrum_views()
    }

    pub fn category_list(&self) -> &[CategoryId] {
        self.store.category_list_rows()
    }

    pub fn counter_rows(&self) -> Vec<&ProteinCounterRecord> {
        self.store.counter_rows()
    }

    pub fn counter_reveals(&self) -> &[CounterRevealRecord] {
        self.store.counter_reveal_rows()
    }

    pub fn latest_counter_reveal(&self, category: CategoryId) -> Option<&CounterRevealRecord> {
        self.store.latest_counter_reveal_row(category)
    }

    pub fn pending_request(&self, request_id: DecryptionRequestId) -> Option<&PendingRequestRecord> {
        self.store.pending_request_row(request_id)
    }

    pub fn pending_requests_for_record(
        &self,
        spectrum_id: SpectrumId,
    ) -> Vec<&PendingRequestRecord> {
        self.store.pending_request_rows_for_spectrum(spectrum_id)
    }

    pub fn audit_rows(&self) -> &[AuditEvent] {
        self.store.audit_rows()
    }

    pub fn audit_rows_by_record(&self, spectrum_id: SpectrumId) -> Vec<&AuditEvent> {
        self.store.audit_rows_by_spectrum(spectrum_id)
    }

    pub fn audit_rows_since(&self, after: AuditEventId) -> &[AuditEvent] {
        self.store.audit_rows_since(after)
    }

    pub fn audit_chain_intact(&self) -> bool {
        self.store.audit_chain_intact()
    }
}
