#![forbid(unsafe_code)]

use spectra_engines::envelope::OracleCallbackEnvelope;
use spectra_engines::local_provider::{LocalComputeProvider, LocalProviderConfig};
use spectra_engines::oracle::{
    DigestOracleConfig, DigestOracleSigner, DigestOracleVerifier, LocalDecryptionOracle,
};
use spectra_kernel_contracts::audit::{AuditEventType, AuditSeverity};
use spectra_kernel_contracts::fhe::{
    CiphertextHandle, DecryptionRequestId, HomomorphicComputeProvider, ProviderError,
};
use spectra_kernel_contracts::reveal::{CounterRevealCleartext, RecordRevealCleartext};
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId};
use spectra_kernel_contracts::MonotonicTimeNs;
use spectra_os::{CallbackOutcome, SpectraError, SpectraRegistry, SpectraRegistryConfig};
use spectra_storage::store::StorageError;

struct Harness<P: HomomorphicComputeProvider = LocalComputeProvider> {
    registry: SpectraRegistry<P, DigestOracleVerifier>,
    signer: DigestOracleSigner,
    clock: u64,
}

fn harness(config: SpectraRegistryConfig) -> Harness {
    harness_with(
        config,
        LocalComputeProvider::new(LocalProviderConfig::mvp_v1()),
    )
}

fn harness_with<P: HomomorphicComputeProvider>(
    config: SpectraRegistryConfig,
    provider: P,
) -> Harness<P> {
    let signer = DigestOracleSigner::new(DigestOracleConfig::mvp_v1(), [9u8; 32]);
    Harness {
        registry: SpectraRegistry::new(config, provider, signer.verifier()),
        signer,
        clock: 1_000,
    }
}

impl<P: HomomorphicComputeProvider> Harness<P> {
    fn tick(&mut self) -> MonotonicTimeNs {
        self.clock += 1;
        MonotonicTimeNs(self.clock)
    }

    fn deliver(&mut self, env: &OracleCallbackEnvelope) -> Result<CallbackOutcome, SpectraError> {
        let now = self.tick();
        self.registry.on_callback_envelope(now, env)
    }

    fn forge(&self, request_id: DecryptionRequestId, cleartext: &[u8]) -> OracleCallbackEnvelope {
        OracleCallbackEnvelope::v1(request_id, cleartext, &self.signer.sign(request_id, cleartext))
    }
}

impl Harness<LocalComputeProvider> {
    fn oracle(&self) -> LocalDecryptionOracle {
        LocalDecryptionOracle::new(self.signer.clone())
    }

    fn submit_plain(&mut self, category: u64, quantity: u64) -> SpectrumId {
        let p = self.registry.provider_mut();
        let payload = p.encrypt_value(0xFEED).unwrap();
        let cat = p.encrypt_value(category).unwrap();
        let qty = p.encrypt_value(quantity).unwrap();
        let now = self.tick();
        self.registry.submit(now, payload, cat, qty).unwrap()
    }

    fn answer(&mut self, request_id: DecryptionRequestId) -> OracleCallbackEnvelope {
        self.oracle()
            .respond(self.registry.provider_mut(), request_id)
            .unwrap()
    }

    fn reveal(&mut self, spectrum_id: SpectrumId) -> CallbackOutcome {
        let now = self.tick();
        let r = self.registry.request_reveal(now, spectrum_id).unwrap();
        let env = self.answer(r);
        self.deliver(&env).unwrap()
    }

    fn counter_value(&mut self, category: u64) -> Result<u64, SpectraError> {
        let now = self.tick();
        let r = self
            .registry
            .request_counter_reveal(now, CategoryId(category))?;
        let env = self.answer(r);
        match self.deliver(&env)? {
            CallbackOutcome::CounterRevealed(row) => Ok(row.count),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

#[test]
fn at_registry_01_scenario_a_submit_reveal_count() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let id = h.submit_plain(42, 7);
    assert_eq!(id, SpectrumId(1));
    assert_eq!(h.registry.get_reveal(id), (CategoryId(0), 0, false));

    let now = h.tick();
    let r1 = h.registry.request_reveal(now, id).unwrap();
    let env = h.answer(r1);
    let out = h.deliver(&env).unwrap();
    assert_eq!(
        out,
        CallbackOutcome::RecordRevealed {
            spectrum_id: id,
            category: CategoryId(42),
            quantity: 7,
            counter_increments: 1,
            collected_requests: 0,
        }
    );
    assert_eq!(h.registry.get_reveal(id), (CategoryId(42), 7, true));
    assert_eq!(h.counter_value(42).unwrap(), 1);

    let types: Vec<AuditEventType> = h.registry.audit_rows().iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            AuditEventType::RecordSubmitted,
            AuditEventType::RevealRequested,
            AuditEventType::RevealCompleted,
            AuditEventType::CounterInitialized,
            AuditEventType::CounterIncremented,
            AuditEventType::CounterRevealRequested,
            AuditEventType::CounterRevealCompleted,
        ]
    );
    assert!(h.registry.audit_chain_intact());
}

#[test]
fn at_registry_02_scenario_b_replayed_callback_is_already_revealed() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let id = h.submit_plain(42, 7);
    let now = h.tick();
    let r1 = h.registry.request_reveal(now, id).unwrap();
    let env = h.answer(r1);
    h.deliver(&env).unwrap();

    let audit_len = h.registry.audit_rows().len();
    let counter = h.registry.get_counter(CategoryId(42)).unwrap();
    assert_eq!(
        h.deliver(&env),
        Err(SpectraError::AlreadyRevealed {
            spectrum_id: id,
            request_id: Some(r1),
        })
    );
    assert_eq!(h.registry.get_reveal(id), (CategoryId(42), 7, true));
    assert_eq!(h.registry.get_counter(CategoryId(42)).unwrap(), counter);
    assert_eq!(h.registry.audit_rows().len(), audit_len);
}

#[test]
fn at_registry_03_scenario_c_two_reveals_same_category() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let a = h.submit_plain(42, 7);
    let b = h.submit_plain(42, 3);
    h.reveal(a);
    h.reveal(b);
    assert_eq!(h.counter_value(42).unwrap(), 2);
    assert_eq!(h.registry.category_list(), &[CategoryId(42)]);
}

#[test]
fn at_registry_04_scenario_d_unknown_record() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let now = h.tick();
    assert_eq!(
        h.registry.request_reveal(now, SpectrumId(999)),
        Err(SpectraError::UnknownRecord {
            spectrum_id: SpectrumId(999)
        })
    );
    assert!(h.registry.provider().queued_request_ids().is_empty());
}

#[test]
fn at_registry_05_request_on_revealed_record_creates_nothing() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let id = h.submit_plain(5, 1);
    h.reveal(id);
    let pending = h.registry.pending_requests_for_record(id).len();

    let now = h.tick();
    assert_eq!(
        h.registry.request_reveal(now, id),
        Err(SpectraError::AlreadyRevealed {
            spectrum_id: id,
            request_id: None,
        })
    );
    assert_eq!(h.registry.pending_requests_for_record(id).len(), pending);
    assert!(h.registry.provider().queued_request_ids().is_empty());
}

#[test]
fn at_registry_06_forged_proof_mutates_nothing() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let id = h.submit_plain(42, 7);
    let now = h.tick();
    let r = h.registry.request_reveal(now, id).unwrap();
    let good = h.answer(r);
    let audit_len = h.registry.audit_rows().len();

    let decoded = good.decode().unwrap();
    let mut bad_proof = decoded.proof.clone();
    bad_proof[0] ^= 0xFF;
    let now = h.tick();
    assert_eq!(
        h.registry
            .on_decryption_callback(now, r, &decoded.cleartext, &bad_proof),
        Err(SpectraError::ProofVerificationFailed { request_id: r })
    );

    let other_signer = DigestOracleSigner::new(DigestOracleConfig::mvp_v1(), [1u8; 32]);
    let lie = RecordRevealCleartext {
        category: CategoryId(13),
        quantity: 99,
    }
    .encode();
    let proof = other_signer.sign(r, &lie);
    let now = h.tick();
    assert!(matches!(
        h.registry.on_decryption_callback(now, r, &lie, &proof),
        Err(SpectraError::ProofVerificationFailed { .. })
    ));

    assert_eq!(h.registry.get_reveal(id), (CategoryId(0), 0, false));
    assert!(h.registry.category_list().is_empty());
    assert_eq!(h.registry.audit_rows().len(), audit_len);

    h.deliver(&good).unwrap();
    assert_eq!(h.registry.get_reveal(id), (CategoryId(42), 7, true));
}

#[test]
fn at_registry_07_unknown_request_mutates_nothing() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    h.submit_plain(42, 7);
    let audit_len = h.registry.audit_rows().len();
    let cleartext = RecordRevealCleartext {
        category: CategoryId(42),
        quantity: 7,
    }
    .encode();
    let env = h.forge(DecryptionRequestId(77), &cleartext);
    assert_eq!(
        h.deliver(&env),
        Err(SpectraError::UnknownRequest {
            request_id: DecryptionRequestId(77)
        })
    );
    assert!(h.registry.category_list().is_empty());
    assert_eq!(h.registry.audit_rows().len(), audit_len);
}

#[test]
fn at_registry_08_malformed_cleartext_is_rejected_then_real_answer_lands() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let id = h.submit_plain(42, 7);
    let now = h.tick();
    let r = h.registry.request_reveal(now, id).unwrap();

    let short = h.forge(r, &CounterRevealCleartext { count: 42 }.encode());
    assert!(matches!(
        h.deliver(&short),
        Err(SpectraError::MalformedCleartext { .. })
    ));
    let mut wide = RecordRevealCleartext {
        category: CategoryId(42),
        quantity: 7,
    }
    .encode();
    wide[0] = 1;
    let wide = h.forge(r, &wide);
    assert!(matches!(
        h.deliver(&wide),
        Err(SpectraError::MalformedCleartext { .. })
    ));
    let garbled = OracleCallbackEnvelope {
        request_id: r.0,
        cleartext_b64: "***".to_string(),
        proof_b64: String::new(),
    };
    assert!(matches!(
        h.deliver(&garbled),
        Err(SpectraError::MalformedCleartext { .. })
    ));
    assert_eq!(h.registry.get_reveal(id), (CategoryId(0), 0, false));

    let env = h.answer(r);
    h.deliver(&env).unwrap();
    assert_eq!(h.registry.get_reveal(id), (CategoryId(42), 7, true));
}

#[test]
fn at_registry_09_counter_tracks_n_reveals() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    for q in 0..5 {
        let id = h.submit_plain(8, q);
        h.reveal(id);
    }
    assert_eq!(h.counter_value(8).unwrap(), 5);
    assert_eq!(
        h.counter_value(9),
        Err(SpectraError::CategoryNotFound {
            category: CategoryId(9)
        })
    );
    assert_eq!(
        h.registry.get_counter(CategoryId(9)),
        Err(SpectraError::CategoryNotFound {
            category: CategoryId(9)
        })
    );
}

#[test]
fn at_registry_10_category_list_is_first_observation_order() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    for c in [7, 42, 7, 0, 42] {
        let id = h.submit_plain(c, 1);
        h.reveal(id);
    }
    assert_eq!(
        h.registry.category_list(),
        &[CategoryId(7), CategoryId(42), CategoryId(0)]
    );
    let rows = h.registry.counter_rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].increments, 2);
    assert_eq!(rows[2].increments, 1);
}

#[test]
fn at_registry_11_first_of_two_requests_wins() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let id = h.submit_plain(42, 7);
    let now = h.tick();
    let r1 = h.registry.request_reveal(now, id).unwrap();
    let now = h.tick();
    let r2 = h.registry.request_reveal(now, id).unwrap();
    assert_ne!(r1, r2);
    assert_eq!(h.registry.pending_requests_for_record(id).len(), 2);

    let e1 = h.answer(r1);
    let e2 = h.answer(r2);
    h.deliver(&e2).unwrap();
    assert!(matches!(
        h.deliver(&e1),
        Err(SpectraError::AlreadyRevealed { .. })
    ));
    assert_eq!(h.counter_value(42).unwrap(), 1);
    assert!(h.registry.pending_request(r2).unwrap().is_resolved());
    assert!(!h.registry.pending_request(r1).unwrap().is_resolved());
}

#[test]
fn at_registry_12_gc_collects_pending_rows_on_reveal() {
    let mut h = harness(SpectraRegistryConfig {
        gc_pending_on_reveal: true,
        audit_enabled: true,
    });
    let id = h.submit_plain(42, 7);
    let now = h.tick();
    let r1 = h.registry.request_reveal(now, id).unwrap();
    let now = h.tick();
    let r2 = h.registry.request_reveal(now, id).unwrap();
    let e1 = h.answer(r1);
    let e2 = h.answer(r2);

    match h.deliver(&e1).unwrap() {
        CallbackOutcome::RecordRevealed {
            collected_requests, ..
        } => assert_eq!(collected_requests, 2),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(h.registry.pending_requests_for_record(id).is_empty());
    assert_eq!(
        h.deliver(&e2),
        Err(SpectraError::UnknownRequest { request_id: r2 })
    );
    assert_eq!(
        h.deliver(&e1),
        Err(SpectraError::UnknownRequest { request_id: r1 })
    );
    let collected = h
        .registry
        .audit_rows_by_record(id)
        .into_iter()
        .find(|e| e.event_type == AuditEventType::PendingRequestsCollected)
        .unwrap();
    assert_eq!(collected.payload_min.get("collected"), Some("2"));
}

#[test]
fn at_registry_13_counter_reveal_is_persisted_once() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let id = h.submit_plain(42, 7);
    h.reveal(id);
    let handle = h.registry.get_counter(CategoryId(42)).unwrap();

    let now = h.tick();
    let r = h
        .registry
        .request_counter_reveal(now, CategoryId(42))
        .unwrap();
    assert_eq!(
        h.registry.pending_request(r).unwrap().kind.spectrum_id(),
        SpectrumId::NONE
    );
    let env = h.answer(r);
    h.deliver(&env).unwrap();

    let latest = h.registry.latest_counter_reveal(CategoryId(42)).unwrap();
    assert_eq!(latest.count, 1);
    assert_eq!(latest.observed_increments, 1);
    assert_eq!(latest.request_id, r);
    assert_eq!(
        h.deliver(&env),
        Err(SpectraError::AlreadyRevealed {
            spectrum_id: SpectrumId::NONE,
            request_id: Some(r),
        })
    );
    assert_eq!(h.registry.counter_reveals().len(), 1);
    assert_eq!(h.registry.get_counter(CategoryId(42)).unwrap(), handle);

    let id2 = h.submit_plain(42, 1);
    h.reveal(id2);
    assert_eq!(h.counter_value(42).unwrap(), 2);
    assert_eq!(h.registry.counter_reveals().len(), 2);
    assert_eq!(
        h.registry
            .latest_counter_reveal(CategoryId(42))
            .unwrap()
            .count,
        2
    );
}

#[test]
fn at_registry_14_audit_can_be_disabled() {
    let mut h = harness(SpectraRegistryConfig {
        gc_pending_on_reveal: false,
        audit_enabled: false,
    });
    let id = h.submit_plain(42, 7);
    h.reveal(id);
    assert_eq!(h.registry.get_reveal(id), (CategoryId(42), 7, true));
    assert!(h.registry.audit_rows().is_empty());
}

#[test]
fn at_registry_15_audit_rows_are_tailable_by_record() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let a = h.submit_plain(1, 1);
    let b = h.submit_plain(2, 2);
    let mark = h.registry.audit_rows().last().unwrap().event_id;
    h.reveal(b);

    let tail = h.registry.audit_rows_since(mark);
    assert!(!tail.is_empty());
    assert!(tail.iter().all(|e| e.spectrum_id == Some(b)));
    assert_eq!(h.registry.audit_rows_by_record(a).len(), 1);
    let view = h.registry.spectrum_row(b).unwrap();
    assert!(view.revealed);
    assert_eq!(h.registry.spectrum_rows().len(), 2);
}

/// Provider that keeps handing out the same request id.
struct StuckIdProvider {
    inner: LocalComputeProvider,
}

impl HomomorphicComputeProvider for StuckIdProvider {
    fn encode_zero(&mut self) -> Result<CiphertextHandle, ProviderError> {
        self.inner.encode_zero()
    }

    fn encode_one(&mut self) -> Result<CiphertextHandle, ProviderError> {
        self.inner.encode_one()
    }

    fn add(
        &mut self,
        lhs: &CiphertextHandle,
        rhs: &CiphertextHandle,
    ) -> Result<CiphertextHandle, ProviderError> {
        self.inner.add(lhs, rhs)
    }

    fn request_decryption(
        &mut self,
        handles: &[CiphertextHandle],
    ) -> Result<DecryptionRequestId, ProviderError> {
        self.inner.request_decryption(handles)?;
        Ok(DecryptionRequestId(5))
    }
}

#[test]
fn at_registry_16_duplicate_provider_request_id_is_rejected() {
    let mut inner = LocalComputeProvider::new(LocalProviderConfig::mvp_v1());
    let h1 = inner.encrypt_value(1).unwrap();
    let h2 = inner.encrypt_value(2).unwrap();
    let mut h = harness_with(SpectraRegistryConfig::mvp_v1(), StuckIdProvider { inner });

    let now = h.tick();
    let a = h.registry.submit(now, h1, h1, h2).unwrap();
    let now = h.tick();
    let b = h.registry.submit(now, h2, h2, h1).unwrap();
    let now = h.tick();
    assert_eq!(
        h.registry.request_reveal(now, a).unwrap(),
        DecryptionRequestId(5)
    );
    let audit_len = h.registry.audit_rows().len();
    let now = h.tick();
    assert!(matches!(
        h.registry.request_reveal(now, b),
        Err(SpectraError::Storage(StorageError::DuplicateKey {
            table: "pending_requests",
            ..
        }))
    ));
    assert!(h.registry.pending_requests_for_record(b).is_empty());
    assert_eq!(h.registry.audit_rows().len(), audit_len);
}

#[test]
fn at_registry_17_provider_failure_surfaces_without_state_change() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let foreign = CiphertextHandle::new([3u8; 32]).unwrap();
    let now = h.tick();
    let id = h.registry.submit(now, foreign, foreign, foreign).unwrap();
    let now = h.tick();
    assert_eq!(
        h.registry.request_reveal(now, id),
        Err(SpectraError::Provider(ProviderError::UnknownHandle(foreign)))
    );
    assert!(h.registry.pending_requests_for_record(id).is_empty());
}

#[test]
fn at_registry_18_counter_reveal_disagreeing_with_increments_is_flagged() {
    let mut h = harness(SpectraRegistryConfig::mvp_v1());
    let id = h.submit_plain(42, 7);
    h.reveal(id);
    assert_eq!(h.counter_value(42).unwrap(), 1);

    let now = h.tick();
    let r = h
        .registry
        .request_counter_reveal(now, CategoryId(42))
        .unwrap();
    let env = h.forge(r, &CounterRevealCleartext { count: 5 }.encode());
    let out = h.deliver(&env).unwrap();
    let CallbackOutcome::CounterRevealed(row) = out else {
        panic!("unexpected outcome {out:?}");
    };
    assert_eq!(row.count, 5);
    assert_eq!(row.observed_increments, 1);

    let completed: Vec<AuditSeverity> = h
        .registry
        .audit_rows()
        .iter()
        .filter(|e| e.event_type == AuditEventType::CounterRevealCompleted)
        .map(|e| e.severity)
        .collect();
    assert_eq!(completed, vec![AuditSeverity::Info, AuditSeverity::Warn]);
    assert!(h.registry.audit_chain_intact());
}
