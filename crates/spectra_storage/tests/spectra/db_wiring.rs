#![forbid(unsafe_code)]

use spectra_kernel_contracts::fhe::CiphertextHandle;
use spectra_kernel_contracts::spectrum::{CategoryId, SpectrumId, SpectrumRecordInput};
use spectra_kernel_contracts::MonotonicTimeNs;
use spectra_storage::repo::SpectrumRecordRepo;
use spectra_storage::store::{SpectraStore, StorageError};

fn handle(b: u8) -> CiphertextHandle {
    CiphertextHandle::new([b; 32]).unwrap()
}

fn input(t: u64) -> SpectrumRecordInput {
    SpectrumRecordInput::v1(MonotonicTimeNs(t), handle(1), handle(2), handle(3)).unwrap()
}

#[test]
fn at_spectra_db_01_ids_are_monotonic_from_one() {
    let mut s = SpectraStore::new_in_memory();
    let a = s.insert_spectrum(input(10), |_| Ok(Vec::new())).unwrap();
    let b = s.insert_spectrum(input(11), |_| Ok(Vec::new())).unwrap();
    assert_eq!(a, SpectrumId(1));
    assert_eq!(b, SpectrumId(2));

    let views = s.spectrum_views();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].submitted_at, MonotonicTimeNs(10));
    assert_eq!(views[1].submitted_at, MonotonicTimeNs(11));
}

#[test]
fn at_spectra_db_02_unknown_and_fresh_records_read_as_sentinel() {
    let mut s = SpectraStore::new_in_memory();
    let id = s.insert_spectrum(input(10), |_| Ok(Vec::new())).unwrap();

    assert_eq!(s.reveal_state_row(id).as_tuple(), (CategoryId(0), 0, false));
    assert_eq!(
        s.reveal_state_row(SpectrumId(999)).as_tuple(),
        (CategoryId(0), 0, false)
    );
    assert!(s.spectrum_view(SpectrumId(999)).is_none());
    assert!(s.spectrum_row(SpectrumId::NONE).is_none());
}

#[test]
fn at_spectra_db_03_records_are_never_deleted() {
    let mut s = SpectraStore::new_in_memory();
    let id = s.insert_spectrum(input(10), |_| Ok(Vec::new())).unwrap();
    assert!(matches!(
        s.attempt_delete_spectrum(id),
        Err(StorageError::AppendOnlyViolation { table: "spectra" })
    ));
    assert!(s.spectrum_row(id).is_some());
}

#[test]
fn at_spectra_db_04_stored_handles_are_kept_verbatim() {
    let mut s = SpectraStore::new_in_memory();
    let id = s.insert_spectrum(input(10), |_| Ok(Vec::new())).unwrap();
    let row = s.spectrum_row(id).unwrap();
    assert_eq!(row.encrypted_payload, handle(1));
    assert_eq!(row.encrypted_category, handle(2));
    assert_eq!(row.encrypted_quantity, handle(3));
}
