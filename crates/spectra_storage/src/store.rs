#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use sha2::{Digest, Sha256};
use spectra_kernel_contracts::audit::{AuditEvent, AuditEventId, AuditEventInput};
use spectra_kernel_contracts::counter::{CounterRevealRecord, ProteinCounterRecord};
use spectra_kernel_contracts::fhe::{CiphertextHandle, DecryptionRequestId};
use spectra_kernel_contracts::reveal::{
    PendingRequestInput, PendingRequestKind, PendingRequestRecord,
};
use spectra_kernel_contracts::spectrum::{
    CategoryId, RevealState, SpectrumId, SpectrumRecord, SpectrumRecordInput, SpectrumRecordView,
};
use spectra_kernel_contracts::{hex_lower, ContractViolation, MonotonicTimeNs, Validate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    ForeignKeyViolation { table: &'static str, key: String },
    DuplicateKey { table: &'static str, key: String },
    AppendOnlyViolation { table: &'static str },
    SingleAssignmentViolation { table: &'static str, key: String },
    ContractViolation(ContractViolation),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignKeyViolation { table, key } => {
                write!(f, "{table}: no row for key {key}")
            }
            Self::DuplicateKey { table, key } => write!(f, "{table}: duplicate key {key}"),
            Self::AppendOnlyViolation { table } => write!(f, "{table} is append-only"),
            Self::SingleAssignmentViolation { table, key } => {
                write!(f, "{table}: key {key} already assigned")
            }
            Self::ContractViolation(v) => write!(f, "contract violation: {v}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

/// Ids are never reused; an exhausted id space is an error rather than a wrap or a repeat.
fn next_id(current: u64, field: &'static str) -> Result<u64, StorageError> {
    current.checked_add(1).ok_or(StorageError::ContractViolation(
        ContractViolation::InvalidValue {
            field,
            reason: "id space exhausted",
        },
    ))
}

// ------------------------
// Encrypted record store: `spectra` + `reveal_states`.
// ------------------------

#[derive(Debug, Clone)]
pub struct SpectrumRecordTable {
    records: BTreeMap<SpectrumId, SpectrumRecord>,
    reveal_states: BTreeMap<SpectrumId, RevealState>,
    next_spectrum_id: u64,
}

impl SpectrumRecordTable {
    fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            reveal_states: BTreeMap::new(),
            next_spectrum_id: 1,
        }
    }

    fn insert(&mut self, input: SpectrumRecordInput) -> Result<SpectrumId, StorageError> {
        input.validate()?;
        let spectrum_id = SpectrumId(self.next_spectrum_id);
        let next = next_id(self.next_spectrum_id, "spectra.spectrum_id")?;
        let row = SpectrumRecord::from_input_v1(spectrum_id, input)?;
        self.next_spectrum_id = next;
        self.reveal_states
            .insert(spectrum_id, RevealState::unrevealed());
        self.records.insert(spectrum_id, row);
        Ok(spectrum_id)
    }

    pub fn get(&self, spectrum_id: SpectrumId) -> Option<&SpectrumRecord> {
        self.records.get(&spectrum_id)
    }

    pub fn contains(&self, spectrum_id: SpectrumId) -> bool {
        self.records.contains_key(&spectrum_id)
    }

    /// Unknown ids read as the unrevealed sentinel.
    pub fn reveal_state(&self, spectrum_id: SpectrumId) -> RevealState {
        self.reveal_states
            .get(&spectrum_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_revealed(&self, spectrum_id: SpectrumId) -> bool {
        self.reveal_state(spectrum_id).revealed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn view(&self, spectrum_id: SpectrumId) -> Option<SpectrumRecordView> {
        let rec = self.records.get(&spectrum_id)?;
        let state = self.reveal_state(spectrum_id);
        Some(SpectrumRecordView {
            spectrum_id,
            submitted_at: rec.submitted_at,
            revealed: state.revealed,
            category: state.category,
            quantity: state.quantity,
        })
    }

    pub fn views(&self) -> Vec<SpectrumRecordView> {
        self.records
            .keys()
            .filter_map(|id| self.view(*id))
            .collect()
    }

    fn check_revealable(&self, spectrum_id: SpectrumId) -> Result<(), StorageError> {
        if !self.contains(spectrum_id) {
            return Err(StorageError::ForeignKeyViolation {
                table: "spectra",
                key: spectrum_id.0.to_string(),
            });
        }
        if self.is_revealed(spectrum_id) {
            return Err(StorageError::SingleAssignmentViolation {
                table: "reveal_states",
                key: spectrum_id.0.to_string(),
            });
        }
        Ok(())
    }

    fn mark_revealed(
        &mut self,
        spectrum_id: SpectrumId,
        category: CategoryId,
        quantity: u64,
        now: MonotonicTimeNs,
    ) -> Result<(), StorageError> {
        self.check_revealable(spectrum_id)?;
        let state = RevealState::revealed_v1(category, quantity, now)?;
        self.reveal_states.insert(spectrum_id, state);
        Ok(())
    }
}

// ------------------------
// Decryption request correlation: `pending_requests`.
// ------------------------

#[derive(Debug, Clone)]
pub struct PendingRequestTable {
    rows: BTreeMap<DecryptionRequestId, PendingRequestRecord>,
    by_spectrum: BTreeMap<SpectrumId, BTreeSet<DecryptionRequestId>>,
}

impl PendingRequestTable {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            by_spectrum: BTreeMap::new(),
        }
    }

    fn check_insertable(&self, input: &PendingRequestInput) -> Result<(), StorageError> {
        input.validate()?;
        if self.rows.contains_key(&input.request_id) {
            return Err(StorageError::DuplicateKey {
                table: "pending_requests",
                key: input.request_id.0.to_string(),
            });
        }
        Ok(())
    }

    fn insert(&mut self, input: PendingRequestInput) -> Result<DecryptionRequestId, StorageError> {
        self.check_insertable(&input)?;
        let row = PendingRequestRecord::from_input_v1(input)?;
        let request_id = row.request_id;
        if let PendingRequestKind::RecordReveal { spectrum_id } = row.kind {
            self.by_spectrum
                .entry(spectrum_id)
                .or_default()
                .insert(request_id);
        }
        self.rows.insert(request_id, row);
        Ok(request_id)
    }

    pub fn get(&self, request_id: DecryptionRequestId) -> Option<&PendingRequestRecord> {
        self.rows.get(&request_id)
    }

    /// Resolves a request id to its record, or to `SpectrumId::NONE` when it was never issued
    /// (or was issued for a counter reveal).
    pub fn spectrum_for(&self, request_id: DecryptionRequestId) -> SpectrumId {
        self.rows
            .get(&request_id)
            .map(|r| r.kind.spectrum_id())
            .unwrap_or(SpectrumId::NONE)
    }

    pub fn for_spectrum(&self, spectrum_id: SpectrumId) -> Vec<&PendingRequestRecord> {
        self.by_spectrum
            .get(&spectrum_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.rows.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn check_resolvable(&self, request_id: DecryptionRequestId) -> Result<(), StorageError> {
        match self.rows.get(&request_id) {
            None => Err(StorageError::ForeignKeyViolation {
                table: "pending_requests",
                key: request_id.0.to_string(),
            }),
            Some(r) if r.is_resolved() => Err(StorageError::SingleAssignmentViolation {
                table: "pending_requests",
                key: request_id.0.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn mark_resolved(
        &mut self,
        request_id: DecryptionRequestId,
        now: MonotonicTimeNs,
    ) -> Result<(), StorageError> {
        self.check_resolvable(request_id)?;
        if let Some(row) = self.rows.get_mut(&request_id) {
            row.resolved_at = Some(now);
        }
        Ok(())
    }

    fn collect_for_spectrum(&mut self, spectrum_id: SpectrumId) -> usize {
        let Some(ids) = self.by_spectrum.remove(&spectrum_id) else {
            return 0;
        };
        for id in &ids {
            self.rows.remove(id);
        }
        ids.len()
    }
}

// ------------------------
// Homomorphic protein counters: `protein_counters` + `category_list` + `counter_reveals`.
// ------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterIncrementOutcome {
    pub initialized: bool,
    pub increments: u64,
}

#[derive(Debug, Clone)]
pub struct ProteinCounterTable {
    counters: BTreeMap<CategoryId, ProteinCounterRecord>,
    // Append-only, first-observation order; mirrors the key set of `counters`.
    category_list: Vec<CategoryId>,
    reveals: Vec<CounterRevealRecord>,
    latest_reveal: BTreeMap<CategoryId, usize>,
}

impl ProteinCounterTable {
    fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
            category_list: Vec::new(),
            reveals: Vec::new(),
            latest_reveal: BTreeMap::new(),
        }
    }

    pub fn get(&self, category: CategoryId) -> Option<&ProteinCounterRecord> {
        self.counters.get(&category)
    }

    pub fn category_list(&self) -> &[CategoryId] {
        &self.category_list
    }

    /// Counters in first-observation order.
    pub fn rows(&self) -> Vec<&ProteinCounterRecord> {
        self.category_list
            .iter()
            .filter_map(|c| self.counters.get(c))
            .collect()
    }

    pub fn reveals(&self) -> &[CounterRevealRecord] {
        &self.reveals
    }

    pub fn latest_reveal(&self, category: CategoryId) -> Option<&CounterRevealRecord> {
        self.latest_reveal
            .get(&category)
            .and_then(|idx| self.reveals.get(*idx))
    }

    fn build_increment(
        &self,
        category: CategoryId,
        next_handle: CiphertextHandle,
        now: MonotonicTimeNs,
    ) -> Result<(ProteinCounterRecord, bool), StorageError> {
        let row = match self.counters.get(&category) {
            Some(existing) => ProteinCounterRecord::v1(
                category,
                next_handle,
                existing.increments.saturating_add(1),
                existing.initialized_at,
                now.max(existing.initialized_at),
            )?,
            None => ProteinCounterRecord::v1(category, next_handle, 1, now, now)?,
        };
        Ok((row, !self.counters.contains_key(&category)))
    }

    /// Get-or-create plus replace in one step, so `category_list` and `counters` never disagree.
    fn apply_increment(
        &mut self,
        category: CategoryId,
        next_handle: CiphertextHandle,
        now: MonotonicTimeNs,
    ) -> Result<CounterIncrementOutcome, StorageError> {
        let (row, initialized) = self.build_increment(category, next_handle, now)?;
        let increments = row.increments;
        if initialized {
            self.category_list.push(category);
        }
        self.counters.insert(category, row);
        Ok(CounterIncrementOutcome {
            initialized,
            increments,
        })
    }

    fn append_reveal(&mut self, row: CounterRevealRecord) -> Result<(), StorageError> {
        row.validate()?;
        if !self.counters.contains_key(&row.category) {
            return Err(StorageError::ForeignKeyViolation {
                table: "counter_reveals.category",
                key: row.category.0.to_string(),
            });
        }
        self.latest_reveal.insert(row.category, self.reveals.len());
        self.reveals.push(row);
        Ok(())
    }
}

// ------------------------
// Audit ledger: `audit_events` (append-only, SHA-256 hash-chained).
// ------------------------

#[derive(Debug, Clone)]
pub struct AuditLedger {
    events: Vec<AuditEvent>,
    next_audit_event_id: u64,
}

// Every variable-length field is length-prefixed so distinct rows never share a preimage.
fn update_framed(h: &mut Sha256, bytes: &[u8]) {
    h.update((bytes.len() as u64).to_be_bytes());
    h.update(bytes);
}

fn audit_event_hash(
    event_id: AuditEventId,
    prev_hash: Option<&str>,
    input: &AuditEventInput,
) -> String {
    let mut h = Sha256::new();
    h.update(b"spectra.audit.v1");
    match prev_hash {
        Some(p) => {
            h.update([1u8]);
            update_framed(&mut h, p.as_bytes());
        }
        None => h.update([0u8]),
    }
    h.update(event_id.0.to_be_bytes());
    h.update(input.created_at.0.to_be_bytes());
    update_framed(&mut h, format!("{:?}", input.engine).as_bytes());
    update_framed(&mut h, input.event_type.as_str().as_bytes());
    h.update(input.reason_code.0.to_be_bytes());
    update_framed(&mut h, format!("{:?}", input.severity).as_bytes());
    h.update(input.spectrum_id.map(|v| v.0).unwrap_or(0).to_be_bytes());
    h.update(input.request_id.map(|v| v.0).unwrap_or(0).to_be_bytes());
    match input.category {
        Some(c) => {
            h.update([1u8]);
            h.update(c.0.to_be_bytes());
        }
        None => h.update([0u8]),
    }
    h.update((input.payload_min.entries.len() as u64).to_be_bytes());
    for (k, v) in &input.payload_min.entries {
        update_framed(&mut h, k.as_str().as_bytes());
        update_framed(&mut h, v.as_str().as_bytes());
    }
    hex_lower(&h.finalize())
}

impl AuditLedger {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            next_audit_event_id: 1,
        }
    }

    fn append(&mut self, input: AuditEventInput) -> Result<AuditEventId, StorageError> {
        input.validate()?;
        let event_id = AuditEventId(self.next_audit_event_id);
        let next = next_id(self.next_audit_event_id, "audit_events.event_id")?;
        let prev_hash = self.events.last().map(|e| e.event_hash.clone());
        let event_hash = audit_event_hash(event_id, prev_hash.as_deref(), &input);
        let ev = AuditEvent::from_input_v1(event_id, prev_hash, event_hash, input)?;
        self.next_audit_event_id = next;
        self.events.push(ev);
        Ok(event_id)
    }

    pub fn rows(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn rows_by_spectrum(&self, spectrum_id: SpectrumId) -> Vec<&AuditEvent> {
        self.events
            .iter()
            .filter(|e| e.spectrum_id == Some(spectrum_id))
            .collect()
    }

    pub fn rows_since(&self, after: AuditEventId) -> &[AuditEvent] {
        let start = self.events.partition_point(|e| e.event_id <= after);
        &self.events[start..]
    }

    /// Recomputes every link of the chain.
    pub fn verify_chain(&self) -> bool {
        let mut prev: Option<&str> = None;
        for ev in &self.events {
            if ev.prev_hash.as_deref() != prev {
                return false;
            }
            let input = AuditEventInput {
                schema_version: ev.schema_version,
                created_at: ev.created_at,
                engine: ev.engine.clone(),
                event_type: ev.event_type,
                reason_code: ev.reason_code,
                severity: ev.severity,
                spectrum_id: ev.spectrum_id,
                request_id: ev.request_id,
                category: ev.category,
                payload_min: ev.payload_min.clone(),
            };
            if audit_event_hash(ev.event_id, prev, &input) != ev.event_hash {
                return false;
            }
            prev = Some(ev.event_hash.as_str());
        }
        true
    }
}

// ------------------------
// Composite store and its transactional commit paths.
// ------------------------

/// Everything a verified record reveal writes, checked as a whole before any table changes.
#[derive(Debug, Clone)]
pub struct RecordRevealCommit {
    pub request_id: DecryptionRequestId,
    pub category: CategoryId,
    pub quantity: u64,
    pub next_counter_handle: CiphertextHandle,
    pub now: MonotonicTimeNs,
    pub collect_pending: bool,
    pub audit: Vec<AuditEventInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRevealOutcome {
    pub spectrum_id: SpectrumId,
    pub counter: CounterIncrementOutcome,
    pub collected_requests: usize,
}

#[derive(Debug, Clone)]
pub struct SpectraStore {
    spectra: SpectrumRecordTable,
    pending_requests: PendingRequestTable,
    protein_counters: ProteinCounterTable,
    audit_events: AuditLedger,
}

impl Default for SpectraStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl SpectraStore {
    pub fn new_in_memory() -> Self {
        Self {
            spectra: SpectrumRecordTable::new(),
            pending_requests: PendingRequestTable::new(),
            protein_counters: ProteinCounterTable::new(),
            audit_events: AuditLedger::new(),
        }
    }

    pub fn spectra(&self) -> &SpectrumRecordTable {
        &self.spectra
    }

    pub fn pending_requests(&self) -> &PendingRequestTable {
        &self.pending_requests
    }

    pub fn protein_counters(&self) -> &ProteinCounterTable {
        &self.protein_counters
    }

    pub fn audit_ledger(&self) -> &AuditLedger {
        &self.audit_events
    }

    fn validate_audit_batch(audit: &[AuditEventInput]) -> Result<(), StorageError> {
        for ev in audit {
            ev.validate()?;
        }
        Ok(())
    }

    fn append_audit_batch(&mut self, audit: Vec<AuditEventInput>) -> Result<(), StorageError> {
        for ev in audit {
            self.audit_events.append(ev)?;
        }
        Ok(())
    }

    pub fn append_audit_event(
        &mut self,
        input: AuditEventInput,
    ) -> Result<AuditEventId, StorageError> {
        self.audit_events.append(input)
    }

    pub fn attempt_overwrite_audit_event(
        &mut self,
        _event_id: AuditEventId,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: "audit_events",
        })
    }

    pub fn attempt_delete_spectrum(&mut self, _spectrum_id: SpectrumId) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation { table: "spectra" })
    }

    /// Inserts a record with its unrevealed reveal cell and the matching audit rows.
    pub fn insert_spectrum(
        &mut self,
        input: SpectrumRecordInput,
        audit: impl FnOnce(SpectrumId) -> Result<Vec<AuditEventInput>, ContractViolation>,
    ) -> Result<SpectrumId, StorageError> {
        input.validate()?;
        let next_id = SpectrumId(self.spectra.next_spectrum_id);
        let audit = audit(next_id)?;
        Self::validate_audit_batch(&audit)?;
        let spectrum_id = self.spectra.insert(input)?;
        self.append_audit_batch(audit)?;
        Ok(spectrum_id)
    }

    pub fn insert_pending_request(
        &mut self,
        input: PendingRequestInput,
        audit: Vec<AuditEventInput>,
    ) -> Result<DecryptionRequestId, StorageError> {
        self.pending_requests.check_insertable(&input)?;
        match input.kind {
            PendingRequestKind::RecordReveal { spectrum_id } => {
                self.spectra.check_revealable(spectrum_id)?;
            }
            PendingRequestKind::CounterReveal { category, .. } => {
                if self.protein_counters.get(category).is_none() {
                    return Err(StorageError::ForeignKeyViolation {
                        table: "pending_requests.category",
                        key: category.0.to_string(),
                    });
                }
            }
        }
        Self::validate_audit_batch(&audit)?;
        let request_id = self.pending_requests.insert(input)?;
        self.append_audit_batch(audit)?;
        Ok(request_id)
    }

    /// Applies a verified record reveal: reveal cell, request resolution, counter increment,
    /// optional pending-row collection, audit rows. Nothing changes unless every check passes.
    pub fn commit_record_reveal(
        &mut self,
        commit: RecordRevealCommit,
    ) -> Result<RecordRevealOutcome, StorageError> {
        let spectrum_id = match self.pending_requests.get(commit.request_id) {
            Some(row) => match row.kind {
                PendingRequestKind::RecordReveal { spectrum_id } => spectrum_id,
                PendingRequestKind::CounterReveal { .. } => {
                    return Err(StorageError::ContractViolation(
                        ContractViolation::InvalidValue {
                            field: "record_reveal_commit.request_id",
                            reason: "request was issued for a counter reveal",
                        },
                    ))
                }
            },
            None => {
                return Err(StorageError::ForeignKeyViolation {
                    table: "pending_requests",
                    key: commit.request_id.0.to_string(),
                })
            }
        };
        self.spectra.check_revealable(spectrum_id)?;
        RevealState::revealed_v1(commit.category, commit.quantity, commit.now)?;
        self.protein_counters
            .build_increment(commit.category, commit.next_counter_handle, commit.now)?;
        Self::validate_audit_batch(&commit.audit)?;

        self.spectra
            .mark_revealed(spectrum_id, commit.category, commit.quantity, commit.now)?;
        self.pending_requests
            .mark_resolved(commit.request_id, commit.now)?;
        let counter = self.protein_counters.apply_increment(
            commit.category,
            commit.next_counter_handle,
            commit.now,
        )?;
        let collected_requests = if commit.collect_pending {
            self.pending_requests.collect_for_spectrum(spectrum_id)
        } else {
            0
        };
        self.append_audit_batch(commit.audit)?;
        Ok(RecordRevealOutcome {
            spectrum_id,
            counter,
            collected_requests,
        })
    }

    /// Applies a verified counter decryption. The counter handle itself is left untouched.
    pub fn commit_counter_reveal(
        &mut self,
        row: CounterRevealRecord,
        now: MonotonicTimeNs,
        audit: Vec<AuditEventInput>,
    ) -> Result<(), StorageError> {
        row.validate()?;
        match self.pending_requests.get(row.request_id).map(|r| r.kind) {
            Some(PendingRequestKind::CounterReveal { category, .. }) if category == row.category => {
            }
            Some(_) => {
                return Err(StorageError::ContractViolation(
                    ContractViolation::InvalidValue {
                        field: "counter_reveal_commit.request_id",
                        reason: "request was not issued for this category",
                    },
                ))
            }
            None => {
                return Err(StorageError::ForeignKeyViolation {
                    table: "pending_requests",
                    key: row.request_id.0.to_string(),
                })
            }
        }
        self.pending_requests.check_resolvable(row.request_id)?;
        if self.protein_counters.get(row.category).is_none() {
            return Err(StorageError::ForeignKeyViolation {
                table: "counter_reveals.category",
                key: row.category.0.to_string(),
            });
        }
        Self::validate_audit_batch(&audit)?;

        self.pending_requests.mark_resolved(row.request_id, now)?;
        self.protein_counters.append_reveal(row)?;
        self.append_audit_batch(audit)?;
        Ok(())
    }
}
