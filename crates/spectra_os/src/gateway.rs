#![forbid(unsafe_code)]

use spectra_engines::envelope::OracleCallbackEnvelope;
use spectra_kernel_contracts::counter::CounterRevealRecord;
use spectra_kernel_contracts::fhe::{DecryptionRequestId, HomomorphicComputeProvider, OracleVerifier};
use spectra_kernel_contracts::reveal::DecodedCleartext;
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId};
use spectra_kernel_contracts::MonotonicTimeNs;
use spectra_storage::repo::DecryptionRequestRepo;
use spectra_storage::store::SpectraStore;

use crate::correlator::CorrelatorRuntime;
use crate::error::SpectraError;

/// One oracle delivery as received at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleCallback<'a> {
    pub request_id: DecryptionRequestId,
    pub cleartext: &'a [u8],
    pub proof: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    RecordRevealed {
        spectrum_id: SpectrumId,
        category: CategoryId,
        quantity: u64,
        counter_increments: u64,
        collected_requests: usize,
    },
    CounterRevealed(CounterRevealRecord),
}

/// Oracle callback gateway. Nothing behind it runs unless the proof verifies.
#[derive(Debug, Clone)]
pub struct OracleGatewayRuntime {
    correlator: CorrelatorRuntime,
}

impl OracleGatewayRuntime {
    pub fn new(correlator: CorrelatorRuntime) -> Self {
        Self { correlator }
    }

    pub fn correlator(&self) -> &CorrelatorRuntime {
        &self.correlator
    }

    pub fn on_decryption_callback<P, V>(
        &self,
        store: &mut SpectraStore,
        provider: &mut P,
        verifier: &V,
        now: MonotonicTimeNs,
        callback: OracleCallback<'_>,
    ) -> Result<CallbackOutcome, SpectraError>
    where
        P: HomomorphicComputeProvider,
        V: OracleVerifier,
    {
        let request_id = callback.request_id;
        if !verifier.verify(request_id, callback.cleartext, callback.proof) {
            return Err(SpectraError::ProofVerificationFailed { request_id });
        }
        let Some(kind) = store.pending_request_row(request_id).map(|r| r.kind) else {
            return Err(SpectraError::UnknownRequest { request_id });
        };

        match kind.decode_cleartext(callback.cleartext)? {
            DecodedCleartext::Record(c) => {
                let out = self.correlator.resolve_reveal(
                    store,
                    provider,
                    now,
                    request_id,
                    c.category,
                    c.quantity,
                )?;
                Ok(CallbackOutcome::RecordRevealed {
                    spectrum_id: out.spectrum_id,
                    category: c.category,
                    quantity: c.quantity,
                    counter_increments: out.counter.increments,
                    collected_requests: out.collected_requests,
                })
            }
            DecodedCleartext::Counter(c) => {
                let row = self
                    .correlator
                    .resolve_counter_reveal(store, now, request_id, c.count)?;
                Ok(CallbackOutcome::CounterRevealed(row))
            }
        }
    }

    /// Envelope form of `on_decryption_callback`. Undecodable envelopes are malformed cleartext.
    pub fn on_callback_envelope<P, V>(
        &self,
        store: &mut SpectraStore,
        provider: &mut P,
        verifier: &V,
        now: MonotonicTimeNs,
        envelope: &OracleCallbackEnvelope,
    ) -> Result<CallbackOutcome, SpectraError>
    where
        P: HomomorphicComputeProvider,
        V: OracleVerifier,
    {
        let decoded = envelope.decode()?;
        self.on_decryption_callback(
            store,
            provider,
            verifier,
            now,
            OracleCallback {
                request_id: decoded.request_id,
                cleartext: &decoded.cleartext,
                proof: &decoded.proof,
            },
        )
    }
}
