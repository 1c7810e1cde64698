#![forbid(unsafe_code)]

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use spectra_kernel_contracts::fhe::{DecryptionRequestId, OracleVerifier, ProviderError};

use crate::envelope::OracleCallbackEnvelope;
use crate::local_provider::LocalComputeProvider;

const ORACLE_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestOracleConfig {
    pub domain_tag: &'static str,
}

impl DigestOracleConfig {
    pub fn mvp_v1() -> Self {
        Self {
            domain_tag: "spectra.oracle.v1",
        }
    }
}

fn proof_digest(
    domain_tag: &str,
    key: &[u8; ORACLE_KEY_LEN],
    request_id: DecryptionRequestId,
    cleartext: &[u8],
) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(domain_tag.as_bytes());
    h.update(key);
    h.update(request_id.0.to_be_bytes());
    h.update(cleartext);
    let mut out = [0u8; 32];
    out.copy_from_slice(&h.finalize());
    out
}

/// Produces proofs binding a cleartext to the request it answers.
#[derive(Clone)]
pub struct DigestOracleSigner {
    config: DigestOracleConfig,
    key: [u8; ORACLE_KEY_LEN],
}

impl fmt::Debug for DigestOracleSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestOracleSigner")
            .field("domain_tag", &self.config.domain_tag)
            .finish_non_exhaustive()
    }
}

impl DigestOracleSigner {
    pub fn new(config: DigestOracleConfig, key: [u8; ORACLE_KEY_LEN]) -> Self {
        Self { config, key }
    }

    pub fn generate(config: DigestOracleConfig) -> Self {
        let mut key = [0u8; ORACLE_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(config, key)
    }

    pub fn verifier(&self) -> DigestOracleVerifier {
        DigestOracleVerifier {
            config: self.config,
            key: self.key,
        }
    }

    pub fn sign(&self, request_id: DecryptionRequestId, cleartext: &[u8]) -> Vec<u8> {
        proof_digest(self.config.domain_tag, &self.key, request_id, cleartext).to_vec()
    }
}

#[derive(Clone)]
pub struct DigestOracleVerifier {
    config: DigestOracleConfig,
    key: [u8; ORACLE_KEY_LEN],
}

impl fmt::Debug for DigestOracleVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestOracleVerifier")
            .field("domain_tag", &self.config.domain_tag)
            .finish_non_exhaustive()
    }
}

impl OracleVerifier for DigestOracleVerifier {
    fn verify(&self, request_id: DecryptionRequestId, cleartext: &[u8], proof: &[u8]) -> bool {
        let expected = proof_digest(self.config.domain_tag, &self.key, request_id, cleartext);
        if proof.len() != expected.len() {
            return false;
        }
        // Full-length compare; no early exit on the first differing byte.
        expected
            .iter()
            .zip(proof)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Key holder that answers queued provider requests with signed callbacks.
#[derive(Debug, Clone)]
pub struct LocalDecryptionOracle {
    signer: DigestOracleSigner,
}

impl LocalDecryptionOracle {
    pub fn new(signer: DigestOracleSigner) -> Self {
        Self { signer }
    }

    pub fn verifier(&self) -> DigestOracleVerifier {
        self.signer.verifier()
    }

    pub fn respond(
        &self,
        provider: &mut LocalComputeProvider,
        request_id: DecryptionRequestId,
    ) -> Result<OracleCallbackEnvelope, ProviderError> {
        let cleartext = provider.fulfill(request_id)?;
        let proof = self.signer.sign(request_id, &cleartext);
        Ok(OracleCallbackEnvelope::v1(request_id, &cleartext, &proof))
    }

    /// Answers every queued request in request-id order.
    pub fn drain(
        &self,
        provider: &mut LocalComputeProvider,
    ) -> Result<Vec<OracleCallbackEnvelope>, ProviderError> {
        let mut out = Vec::new();
        for request_id in provider.queued_request_ids() {
            out.push(self.respond(provider, request_id)?);
        }
        Ok(out)
    }
}
