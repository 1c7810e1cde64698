#![forbid(unsafe_code)]

use spectra_kernel_contracts::fhe::{CiphertextHandle, DecryptionRequestId};
use spectra_kernel_contracts::reveal::{PendingRequestInput, PendingRequestKind};
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId, SpectrumRecordInput};
use spectra_kernel_contracts::MonotonicTimeNs;
use spectra_storage::repo::{DecryptionRequestRepo, SpectrumRecordRepo};
use spectra_storage::store::{RecordRevealCommit, SpectraStore, StorageError};

fn handle(b: u8) -> CiphertextHandle {
    CiphertextHandle::new([b; 32]).unwrap()
}

fn seed_spectrum(s: &mut SpectraStore) -> SpectrumId {
    s.insert_spectrum(
        SpectrumRecordInput::v1(MonotonicTimeNs(10), handle(1), handle(2), handle(3)).unwrap(),
        |_| Ok(Vec::new()),
    )
    .unwrap()
}

fn record_request(request_id: u64, spectrum_id: SpectrumId) -> PendingRequestInput {
    PendingRequestInput::v1(
        DecryptionRequestId(request_id),
        MonotonicTimeNs(20),
        PendingRequestKind::RecordReveal { spectrum_id },
    )
    .unwrap()
}

fn reveal(request_id: u64, collect_pending: bool) -> RecordRevealCommit {
    RecordRevealCommit {
        request_id: DecryptionRequestId(request_id),
        category: CategoryId(42),
        quantity: 7,
        next_counter_handle: handle(9),
        now: MonotonicTimeNs(30),
        collect_pending,
        audit: Vec::new(),
    }
}

#[test]
fn at_pending_db_01_request_correlates_to_record() {
    let mut s = SpectraStore::new_in_memory();
    let id = seed_spectrum(&mut s);
    s.insert_pending_request(record_request(5, id), Vec::new())
        .unwrap();

    assert_eq!(s.spectrum_for_request(DecryptionRequestId(5)), id);
    assert_eq!(
        s.spectrum_for_request(DecryptionRequestId(6)),
        SpectrumId::NONE
    );
    assert_eq!(s.pending_request_rows_for_spectrum(id).len(), 1);
}

#[test]
fn at_pending_db_02_duplicate_request_id_rejected() {
    let mut s = SpectraStore::new_in_memory();
    let id = seed_spectrum(&mut s);
    s.insert_pending_request(record_request(5, id), Vec::new())
        .unwrap();
    assert!(matches!(
        s.insert_pending_request(record_request(5, id), Vec::new()),
        Err(StorageError::DuplicateKey {
            table: "pending_requests",
            ..
        })
    ));
    assert_eq!(s.pending_request_rows_for_spectrum(id).len(), 1);
}

#[test]
fn at_pending_db_03_request_for_unknown_record_rejected() {
    let mut s = SpectraStore::new_in_memory();
    assert!(matches!(
        s.insert_pending_request(record_request(5, SpectrumId(999)), Vec::new()),
        Err(StorageError::ForeignKeyViolation {
            table: "spectra",
            ..
        })
    ));
    assert!(s.pending_request_row(DecryptionRequestId(5)).is_none());
}

#[test]
fn at_pending_db_04_sibling_request_loses_after_first_reveal() {
    let mut s = SpectraStore::new_in_memory();
    let id = seed_spectrum(&mut s);
    s.insert_pending_request(record_request(5, id), Vec::new())
        .unwrap();
    s.insert_pending_request(record_request(6, id), Vec::new())
        .unwrap();

    s.commit_record_reveal(reveal(6, false)).unwrap();
    assert!(matches!(
        s.commit_record_reveal(reveal(5, false)),
        Err(StorageError::SingleAssignmentViolation {
            table: "reveal_states",
            ..
        })
    ));
    let resolved = s.pending_request_row(DecryptionRequestId(6)).unwrap();
    assert_eq!(resolved.resolved_at, Some(MonotonicTimeNs(30)));
    let stale = s.pending_request_row(DecryptionRequestId(5)).unwrap();
    assert!(stale.resolved_at.is_none());
    assert_eq!(s.reveal_state_row(id).as_tuple(), (CategoryId(42), 7, true));
}

#[test]
fn at_pending_db_05_collection_drops_rows_of_revealed_record() {
    let mut s = SpectraStore::new_in_memory();
    let id = seed_spectrum(&mut s);
    s.insert_pending_request(record_request(5, id), Vec::new())
        .unwrap();
    s.insert_pending_request(record_request(6, id), Vec::new())
        .unwrap();

    let out = s.commit_record_reveal(reveal(5, true)).unwrap();
    assert_eq!(out.collected_requests, 2);
    assert!(s.pending_request_rows_for_spectrum(id).is_empty());
    assert_eq!(
        s.spectrum_for_request(DecryptionRequestId(6)),
        SpectrumId::NONE
    );
}
