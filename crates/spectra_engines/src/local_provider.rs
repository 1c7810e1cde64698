#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use spectra_kernel_contracts::fhe::{
    CiphertextHandle, DecryptionRequestId, HomomorphicComputeProvider, ProviderError,
    CIPHERTEXT_HANDLE_LEN,
};
use spectra_kernel_contracts::reveal::encode_words;

const SEAL_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const MAX_HANDLE_ATTEMPTS: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalProviderConfig {
    pub first_request_id: u64,
}

impl LocalProviderConfig {
    pub fn mvp_v1() -> Self {
        Self {
            first_request_id: 1,
        }
    }
}

#[derive(Clone)]
struct SealedValue {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

/// In-process stand-in for an external homomorphic compute provider.
///
/// Every value is sealed with AES-256-GCM under a per-instance key and bound to its handle as
/// associated data. Addition opens both operands and seals the wrapping sum under a fresh
/// handle, so callers observe the same opaque-handle contract a real FHE backend offers.
/// Only the decryption side (`fulfill`, `decrypt_value`) ever produces plaintext.
pub struct LocalComputeProvider {
    key: [u8; SEAL_KEY_LEN],
    values: BTreeMap<CiphertextHandle, SealedValue>,
    queue: BTreeMap<DecryptionRequestId, Vec<CiphertextHandle>>,
    next_request_id: u64,
}

impl fmt::Debug for LocalComputeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalComputeProvider")
            .field("values", &self.values.len())
            .field("queued_requests", &self.queue.len())
            .field("next_request_id", &self.next_request_id)
            .finish()
    }
}

impl LocalComputeProvider {
    pub fn new(config: LocalProviderConfig) -> Self {
        let mut key = [0u8; SEAL_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self {
            key,
            values: BTreeMap::new(),
            queue: BTreeMap::new(),
            next_request_id: config.first_request_id,
        }
    }

    /// Encrypts a plaintext the way a submitting client would before calling `submit`.
    pub fn encrypt_value(&mut self, value: u64) -> Result<CiphertextHandle, ProviderError> {
        let handle = self.fresh_handle()?;
        let sealed = self.seal(&handle, value)?;
        self.values.insert(handle, sealed);
        Ok(handle)
    }

    /// Oracle-side decryption of a single handle.
    pub fn decrypt_value(&self, handle: &CiphertextHandle) -> Result<u64, ProviderError> {
        let sealed = self
            .values
            .get(handle)
            .ok_or(ProviderError::UnknownHandle(*handle))?;
        self.open(handle, sealed)
    }

    pub fn queued_request_ids(&self) -> Vec<DecryptionRequestId> {
        self.queue.keys().copied().collect()
    }

    /// Takes a queued request off the queue and returns its cleartext as 32-byte words, one
    /// per requested handle, in request order.
    pub fn fulfill(&mut self, request_id: DecryptionRequestId) -> Result<Vec<u8>, ProviderError> {
        let handles = self
            .queue
            .get(&request_id)
            .ok_or(ProviderError::UnknownRequest(request_id))?;
        let mut words = Vec::with_capacity(handles.len());
        for h in handles {
            words.push(self.decrypt_value(h)?);
        }
        self.queue.remove(&request_id);
        Ok(encode_words(&words))
    }

    fn fresh_handle(&self) -> Result<CiphertextHandle, ProviderError> {
        for _ in 0..MAX_HANDLE_ATTEMPTS {
            let mut bytes = [0u8; CIPHERTEXT_HANDLE_LEN];
            OsRng.fill_bytes(&mut bytes);
            let Ok(handle) = CiphertextHandle::new(bytes) else {
                continue;
            };
            if !self.values.contains_key(&handle) {
                return Ok(handle);
            }
        }
        Err(ProviderError::Unavailable("could not allocate a fresh ciphertext handle"))
    }

    fn seal(&self, handle: &CiphertextHandle, value: u64) -> Result<SealedValue, ProviderError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| ProviderError::Crypto)?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let plaintext = value.to_be_bytes();
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: handle.as_bytes(),
                },
            )
            .map_err(|_| ProviderError::Crypto)?;
        Ok(SealedValue { nonce, ciphertext })
    }

    fn open(&self, handle: &CiphertextHandle, sealed: &SealedValue) -> Result<u64, ProviderError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key).map_err(|_| ProviderError::Crypto)?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&sealed.nonce),
                Payload {
                    msg: &sealed.ciphertext,
                    aad: handle.as_bytes(),
                },
            )
            .map_err(|_| ProviderError::Crypto)?;
        let raw: [u8; 8] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| ProviderError::Crypto)?;
        Ok(u64::from_be_bytes(raw))
    }
}

impl HomomorphicComputeProvider for LocalComputeProvider {
    fn encode_zero(&mut self) -> Result<CiphertextHandle, ProviderError> {
        self.encrypt_value(0)
    }

    fn encode_one(&mut self) -> Result<CiphertextHandle, ProviderError> {
        self.encrypt_value(1)
    }

    fn add(
        &mut self,
        lhs: &CiphertextHandle,
        rhs: &CiphertextHandle,
    ) -> Result<CiphertextHandle, ProviderError> {
        let sum = self.decrypt_value(lhs)?.wrapping_add(self.decrypt_value(rhs)?);
        self.encrypt_value(sum)
    }

    fn request_decryption(
        &mut self,
        handles: &[CiphertextHandle],
    ) -> Result<DecryptionRequestId, ProviderError> {
        if handles.is_empty() {
            return Err(ProviderError::EmptyDecryptionRequest);
        }
        if let Some(h) = handles.iter().find(|h| !self.values.contains_key(*h)) {
            return Err(ProviderError::UnknownHandle(*h));
        }
        let request_id = DecryptionRequestId(self.next_request_id);
        if request_id.0 == 0 {
            return Err(ProviderError::InvalidRequestId(request_id));
        }
        self.next_request_id = self.next_request_id.saturating_add(1);
        self.queue.insert(request_id, handles.to_vec());
        Ok(request_id)
    }
}
