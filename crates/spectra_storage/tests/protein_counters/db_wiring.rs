#![forbid(unsafe_code)]

use spectra_kernel_contracts::counter::CounterRevealRecord;
use spectra_kernel_contracts::fhe::{CiphertextHandle, DecryptionRequestId};
use spectra_kernel_contracts::reveal::{PendingRequestInput, PendingRequestKind};
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId, SpectrumRecordInput};
use spectra_kernel_contracts::MonotonicTimeNs;
use spectra_storage::repo::{DecryptionRequestRepo, ProteinCounterRepo};
use spectra_storage::store::{RecordRevealCommit, SpectraStore, StorageError};

fn handle(b: u8) -> CiphertextHandle {
    CiphertextHandle::new([b; 32]).unwrap()
}

fn reveal_one(s: &mut SpectraStore, request_id: u64, category: u64, next: u8) -> SpectrumId {
    let id = s
        .insert_spectrum(
            SpectrumRecordInput::v1(MonotonicTimeNs(10), handle(1), handle(2), handle(3))
                .unwrap(),
            |_| Ok(Vec::new()),
        )
        .unwrap();
    s.insert_pending_request(
        PendingRequestInput::v1(
            DecryptionRequestId(request_id),
            MonotonicTimeNs(20),
            PendingRequestKind::RecordReveal { spectrum_id: id },
        )
        .unwrap(),
        Vec::new(),
    )
    .unwrap();
    s.commit_record_reveal(RecordRevealCommit {
        request_id: DecryptionRequestId(request_id),
        category: CategoryId(category),
        quantity: 1,
        next_counter_handle: handle(next),
        now: MonotonicTimeNs(30 + request_id),
        collect_pending: false,
        audit: Vec::new(),
    })
    .unwrap();
    id
}

#[test]
fn at_counter_db_01_category_list_is_first_observation_order_without_duplicates() {
    let mut s = SpectraStore::new_in_memory();
    reveal_one(&mut s, 1, 42, 10);
    reveal_one(&mut s, 2, 7, 11);
    reveal_one(&mut s, 3, 42, 12);
    reveal_one(&mut s, 4, 0, 13);

    assert_eq!(
        s.category_list_rows(),
        &[CategoryId(42), CategoryId(7), CategoryId(0)]
    );
    let rows = s.counter_rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].category, CategoryId(42));
    assert_eq!(rows[0].increments, 2);
    assert_eq!(rows[0].counter_handle, handle(12));
}

#[test]
fn at_counter_db_02_counter_exists_iff_listed() {
    let mut s = SpectraStore::new_in_memory();
    assert!(s.counter_handle(CategoryId(42)).is_none());
    assert!(s.category_list_rows().is_empty());

    reveal_one(&mut s, 1, 42, 10);
    for c in s.category_list_rows() {
        assert!(s.counter_row(*c).is_some());
    }
    assert_eq!(s.counter_rows().len(), s.category_list_rows().len());
}

#[test]
fn at_counter_db_03_counter_reveal_requires_existing_counter() {
    let mut s = SpectraStore::new_in_memory();
    let out = s.insert_pending_request(
        PendingRequestInput::v1(
            DecryptionRequestId(9),
            MonotonicTimeNs(20),
            PendingRequestKind::CounterReveal {
                category: CategoryId(42),
                observed_increments: 1,
            },
        )
        .unwrap(),
        Vec::new(),
    );
    assert!(matches!(
        out,
        Err(StorageError::ForeignKeyViolation {
            table: "pending_requests.category",
            ..
        })
    ));
}

#[test]
fn at_counter_db_04_counter_reveal_persists_once_per_request() {
    let mut s = SpectraStore::new_in_memory();
    reveal_one(&mut s, 1, 42, 10);
    s.insert_pending_request(
        PendingRequestInput::v1(
            DecryptionRequestId(9),
            MonotonicTimeNs(40),
            PendingRequestKind::CounterReveal {
                category: CategoryId(42),
                observed_increments: 1,
            },
        )
        .unwrap(),
        Vec::new(),
    )
    .unwrap();

    let row = CounterRevealRecord::v1(
        CategoryId(42),
        1,
        DecryptionRequestId(9),
        1,
        MonotonicTimeNs(50),
    )
    .unwrap();
    s.commit_counter_reveal(row.clone(), MonotonicTimeNs(50), Vec::new())
        .unwrap();
    assert!(matches!(
        s.commit_counter_reveal(row, MonotonicTimeNs(51), Vec::new()),
        Err(StorageError::SingleAssignmentViolation {
            table: "pending_requests",
            ..
        })
    ));

    assert_eq!(s.counter_reveal_rows().len(), 1);
    assert_eq!(
        s.latest_counter_reveal_row(CategoryId(42)).unwrap().count,
        1
    );
    assert_eq!(s.counter_handle(CategoryId(42)), Some(handle(10)));
    assert!(s
        .pending_request_row(DecryptionRequestId(9))
        .unwrap()
        .is_resolved());
}
