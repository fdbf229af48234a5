//! Cryptographic primitives for the provenance ledger.
//!
//! Wraps RSA-PSS signing and SHA-256 content hashing with strong types.
//!
//! Signatures use PSS padding with SHA-256, MGF1-SHA-256 and the maximum salt
//! length the modulus allows. Signatures travel as standard base64; public keys
//! travel as SubjectPublicKeyInfo PEM.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest as _, Sha256};
use std::fmt;

use crate::error::CoreError;
use crate::types::Digest;

/// Default RSA modulus size in bits.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Output length of SHA-256 in bytes.
const HASH_LEN: usize = 32;

/// Compute the content digest of an arbitrary payload.
///
/// This is the value registered under `image_hash` / `source_hash`.
pub fn content_digest(payload: &[u8]) -> Digest {
    Digest::hash(payload)
}

/// Largest PSS salt that fits a modulus of `modulus_bits` bits.
fn max_salt_len(modulus_bits: usize) -> usize {
    let em_len = (modulus_bits - 1).div_ceil(8);
    em_len.saturating_sub(HASH_LEN + 2)
}

fn pss_for(modulus_bits: usize) -> Pss {
    Pss::new_with_salt::<Sha256>(max_salt_len(modulus_bits))
}

/// An RSA public key used to verify transaction signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse a SubjectPublicKeyInfo PEM string.
    pub fn from_pem(pem: &str) -> Result<Self, CoreError> {
        RsaPublicKey::from_public_key_pem(pem)
            .map(Self)
            .map_err(|e| CoreError::InvalidPublicKey(e.to_string()))
    }

    /// Encode as a SubjectPublicKeyInfo PEM string.
    pub fn to_pem(&self) -> Result<String, CoreError> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CoreError::Encoding(e.to_string()))
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.0.n().bits()
    }

    /// Verify a base64 signature over `message`.
    pub fn verify(&self, message: &[u8], signature_b64: &str) -> Result<(), CoreError> {
        let signature = BASE64
            .decode(signature_b64.trim())
            .map_err(|e| CoreError::MalformedSignature(e.to_string()))?;
        let hashed = Sha256::digest(message);
        self.0
            .verify(pss_for(self.bits()), &hashed, &signature)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(rsa-{})", self.bits())
    }
}

/// Verify `signature_b64` over `message` with a PEM-encoded public key.
pub fn verify_signature(public_key_pem: &str, message: &[u8], signature_b64: &str) -> Result<(), CoreError> {
    PublicKey::from_pem(public_key_pem)?.verify(message, signature_b64)
}

/// An RSA key pair for signing transactions.
#[derive(Clone)]
pub struct KeyPair {
    private_key: RsaPrivateKey,
}

impl KeyPair {
    /// Generate a new key pair with public exponent 65537.
    pub fn generate(bits: usize) -> Result<Self, CoreError> {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, bits).map_err(|e| CoreError::KeyGeneration(e.to_string()))?;
        Ok(Self { private_key })
    }

    /// Load from an unencrypted PKCS#8 PEM string.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, CoreError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| CoreError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self { private_key })
    }

    /// Encode the private key as unencrypted PKCS#8 PEM.
    pub fn to_pkcs8_pem(&self) -> Result<String, CoreError> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| CoreError::Encoding(e.to_string()))
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.private_key.to_public_key())
    }

    /// Sign a message, returning the signature as base64.
    pub fn sign(&self, message: &[u8]) -> Result<String, CoreError> {
        let mut rng = rand::thread_rng();
        let hashed = Sha256::digest(message);
        let bits = self.private_key.n().bits();
        let signature = self
            .private_key
            .sign_with_rng(&mut rng, pss_for(bits), &hashed)
            .map_err(|e| CoreError::Signing(e.to_string()))?;
        Ok(BASE64.encode(signature))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}
