//! Signing of round-state broadcasts and round-error records

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};

/// A payload together with the scheduler's signature over its JSON encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed<T> {
    pub payload: T,
    pub signature: Vec<u8>,
}

impl<T: Serialize> Signed<T> {
    /// Check the signature against the scheduler's public key
    pub fn verify(&self, key: &VerifyingKey) -> SchedulerResult<()> {
        let message = serde_json::to_vec(&self.payload)?;
        let signature = Signature::from_slice(&self.signature).map_err(|_| SchedulerError::BadSignature)?;
        key.verify(&message, &signature)
            .map_err(|_| SchedulerError::BadSignature)
    }
}

/// Holds the scheduler's ed25519 key
pub struct RoundSigner {
    key: SigningKey,
}

impl RoundSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(&seed))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn sign<T: Serialize>(&self, payload: T) -> SchedulerResult<Signed<T>> {
        let message = serde_json::to_vec(&payload)?;
        let signature = self.key.sign(&message);
        Ok(Signed {
            payload,
            signature: signature.to_bytes().to_vec(),
        })
    }
}

impl std::fmt::Debug for RoundSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundSigner")
            .field("verifying_key", &self.verifying_key())
            .finish_non_exhaustive()
    }
}
