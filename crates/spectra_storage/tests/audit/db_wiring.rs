#![forbid(unsafe_code)]

use spectra_kernel_contracts::audit::{
    AuditEngine, AuditEventId, AuditEventInput, AuditEventType, AuditPayloadMin, AuditSeverity,
};
use spectra_kernel_contracts::fhe::CiphertextHandle;
use spectra_kernel_contracts::spectrum::{SpectrumId, SpectrumRecordInput};
use spectra_kernel_contracts::{MonotonicTimeNs, ReasonCodeId};
use spectra_storage::repo::SpectraAuditRepo;
use spectra_storage::store::{SpectraStore, StorageError};

fn handle(b: u8) -> CiphertextHandle {
    CiphertextHandle::new([b; 32]).unwrap()
}

fn submitted(spectrum_id: SpectrumId, t: u64) -> AuditEventInput {
    AuditEventInput::v1(
        MonotonicTimeNs(t),
        AuditEngine::RecordStore,
        AuditEventType::RecordSubmitted,
        ReasonCodeId(0x5350_0001),
        AuditSeverity::Info,
        Some(spectrum_id),
        None,
        None,
        AuditPayloadMin::from_pairs(&[("submitted_at", t.to_string())]).unwrap(),
    )
    .unwrap()
}

#[test]
fn at_audit_db_01_append_only_enforced() {
    let mut s = SpectraStore::new_in_memory();
    let event_id = s.append_audit_row(submitted(SpectrumId(1), 10)).unwrap();
    assert!(matches!(
        s.attempt_overwrite_audit_event(event_id),
        Err(StorageError::AppendOnlyViolation {
            table: "audit_events"
        })
    ));
}

#[test]
fn at_audit_db_02_submit_writes_record_and_event_together() {
    let mut s = SpectraStore::new_in_memory();
    let id = s
        .insert_spectrum(
            SpectrumRecordInput::v1(MonotonicTimeNs(10), handle(1), handle(2), handle(3))
                .unwrap(),
            |id| Ok(vec![submitted(id, 10)]),
        )
        .unwrap();
    let rows = s.audit_rows_by_spectrum(id);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type, AuditEventType::RecordSubmitted);
    assert_eq!(rows[0].payload_min.get("submitted_at"), Some("10"));
}

#[test]
fn at_audit_db_03_chain_is_intact_and_tailable() {
    let mut s = SpectraStore::new_in_memory();
    let first = s.append_audit_row(submitted(SpectrumId(1), 10)).unwrap();
    s.append_audit_row(submitted(SpectrumId(2), 11)).unwrap();
    s.append_audit_row(submitted(SpectrumId(3), 12)).unwrap();

    assert_eq!(first, AuditEventId(1));
    assert!(s.audit_chain_intact());
    let tail = s.audit_rows_since(first);
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].event_id, AuditEventId(2));
    assert_eq!(tail[0].prev_hash.as_deref(), Some(s.audit_rows()[0].event_hash.as_str()));
}
