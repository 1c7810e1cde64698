#![forbid(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use spectra_kernel_contracts::fhe::DecryptionRequestId;
use spectra_kernel_contracts::Validate;

#[derive(Debug)]
pub enum EnvelopeError {
    Json(serde_json::Error),
    Decode(base64::DecodeError),
    InvalidRequestId(u64),
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::Decode(err) => write!(f, "decode error: {err}"),
            Self::InvalidRequestId(id) => write!(f, "invalid request id: {id}"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl From<serde_json::Error> for EnvelopeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<base64::DecodeError> for EnvelopeError {
    fn from(value: base64::DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Wire form of one oracle callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleCallbackEnvelope {
    pub request_id: u64,
    pub cleartext_b64: String,
    pub proof_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCallback {
    pub request_id: DecryptionRequestId,
    pub cleartext: Vec<u8>,
    pub proof: Vec<u8>,
}

impl OracleCallbackEnvelope {
    pub fn v1(request_id: DecryptionRequestId, cleartext: &[u8], proof: &[u8]) -> Self {
        Self {
            request_id: request_id.0,
            cleartext_b64: BASE64.encode(cleartext),
            proof_b64: BASE64.encode(proof),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(&self) -> Result<DecodedCallback, EnvelopeError> {
        let request_id = DecryptionRequestId(self.request_id);
        request_id
            .validate()
            .map_err(|_| EnvelopeError::InvalidRequestId(self.request_id))?;
        Ok(DecodedCallback {
            request_id,
            cleartext: BASE64.decode(self.cleartext_b64.as_bytes())?,
            proof: BASE64.decode(self.proof_b64.as_bytes())?,
        })
    }
}
