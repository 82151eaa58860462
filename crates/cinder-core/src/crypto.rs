//! Keccak-256 hashing and Ed25519 signing.
//!
//! The canonical digest is legacy Keccak-256 (pre-NIST-padding), matching
//! the address scheme: an address is the trailing 20 bytes of the
//! Keccak-256 digest of a public key.
//!
//! Every input of a transaction signs the same message, the transaction
//! hash (see [`Transaction::hash`](crate::types::Transaction::hash)), which
//! excludes signatures and public keys.

use ed25519_dalek::{Signer, Verifier};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::error::TxError;
use crate::types::{Address, Hash256, Transaction};

/// Legacy Keccak-256 digest (not NIST SHA-3).
pub fn keccak256(data: &[u8]) -> Hash256 {
    Hash256(Keccak256::digest(data).into())
}

/// Derive the address owned by a raw public key: the trailing 20 bytes of
/// its Keccak-256 digest.
pub fn address_of(public_key: &[u8]) -> Address {
    let digest = keccak256(public_key);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest.as_bytes()[12..]);
    Address(addr)
}

/// Ed25519 keypair for signing transactions.
///
/// The secret key is zeroized on drop by the underlying library.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a random keypair from the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Deterministic keypair from 32 bytes of seed material.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    /// The address derived from this keypair's public key.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Sign a message, returning the raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Ed25519 public key.
#[derive(Clone)]
pub struct PublicKey {
    verifying_key: ed25519_dalek::VerifyingKey,
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(bytes).ok()?;
        Some(Self { verifying_key })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn address(&self) -> Address {
        address_of(&self.to_bytes())
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        self.verifying_key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.to_bytes()))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

/// Sign every input of a transaction with the given keypair.
///
/// All inputs sign the transaction hash, so signing does not change the
/// message other inputs sign.
pub fn sign_transaction(tx: &mut Transaction, keypair: &KeyPair) {
    let message = tx.hash();
    let signature = keypair.sign(message.as_bytes());
    let public_key = keypair.public_key().to_bytes();
    for input in &mut tx.inputs {
        input.signature = signature.to_vec();
        input.public_key = public_key.to_vec();
    }
}

/// Verify every input signature of a non-coinbase transaction against the
/// transaction hash. Coinbase transactions verify trivially.
pub fn verify_transaction(tx: &Transaction) -> Result<(), TxError> {
    if tx.is_coinbase() {
        return Ok(());
    }

    let message = tx.hash();
    for (index, input) in tx.inputs.iter().enumerate() {
        let key_bytes: [u8; 32] = input
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| TxError::MalformedPublicKey { index })?;
        let key = PublicKey::from_bytes(&key_bytes)
            .ok_or(TxError::MalformedPublicKey { index })?;
        let sig_bytes: [u8; 64] = input
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| TxError::MalformedSignature { index })?;
        if !key.verify(message.as_bytes(), &sig_bytes) {
            return Err(TxError::InvalidSignature { index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TxInput, TxOutput};

    fn unsigned_tx() -> Transaction {
        Transaction {
            inputs: vec![TxInput {
                prev_tx_hash: Hash256([0x11; 32]),
                prev_out_index: 0,
                public_key: vec![],
                signature: vec![],
            }],
            outputs: vec![TxOutput {
                value: 500,
                address: Address([0x22; 20]),
            }],
        }
    }

    // --- keccak256 ---

    #[test]
    fn keccak_empty_input_vector() {
        // Legacy Keccak-256 of the empty string, distinct from SHA3-256.
        let h = keccak256(b"");
        assert_eq!(
            h.to_string(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn keccak_deterministic() {
        assert_eq!(keccak256(b"cinder"), keccak256(b"cinder"));
        assert_ne!(keccak256(b"cinder"), keccak256(b"cinders"));
    }

    // --- Keys and addresses ---

    #[test]
    fn keypair_from_seed_deterministic() {
        let a = KeyPair::from_seed([7u8; 32]);
        let b = KeyPair::from_seed([7u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn generated_keypairs_differ() {
        assert_ne!(KeyPair::generate().public_key(), KeyPair::generate().public_key());
    }

    #[test]
    fn address_is_trailing_twenty_bytes() {
        let kp = KeyPair::from_seed([1u8; 32]);
        let pk = kp.public_key().to_bytes();
        let digest = keccak256(&pk);
        assert_eq!(kp.address().as_bytes(), &digest.as_bytes()[12..]);
    }

    #[test]
    fn address_of_matches_public_key_address() {
        let kp = KeyPair::generate();
        let pk_bytes = kp.public_key().to_bytes();
        assert_eq!(address_of(&pk_bytes), kp.address());
    }

    #[test]
    fn public_key_round_trip() {
        let kp = KeyPair::generate();
        let bytes = kp.public_key().to_bytes();
        let pk = PublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(pk, kp.public_key());
    }

    #[test]
    fn debug_hides_secret() {
        let kp = KeyPair::from_seed([9u8; 32]);
        let debug = format!("{kp:?}");
        assert!(debug.contains("public_key"));
        assert!(!debug.contains(&hex::encode([9u8; 32])));
    }

    // --- Message signing ---

    #[test]
    fn sign_verify_message() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello");
        assert!(kp.public_key().verify(b"hello", &sig));
        assert!(!kp.public_key().verify(b"tampered", &sig));
    }

    // --- Transaction signing ---

    #[test]
    fn sign_verify_transaction() {
        let kp = KeyPair::generate();
        let mut tx = unsigned_tx();
        sign_transaction(&mut tx, &kp);

        assert_eq!(tx.inputs[0].signature.len(), 64);
        assert_eq!(tx.inputs[0].public_key.len(), 32);
        assert!(verify_transaction(&tx).is_ok());
    }

    #[test]
    fn coinbase_verifies_without_signature() {
        let tx = Transaction {
            inputs: vec![TxInput {
                prev_tx_hash: Hash256::ZERO,
                prev_out_index: 0,
                public_key: vec![],
                signature: vec![],
            }],
            outputs: vec![],
        };
        assert!(verify_transaction(&tx).is_ok());
    }

    #[test]
    fn tampered_output_fails_verification() {
        let kp = KeyPair::generate();
        let mut tx = unsigned_tx();
        sign_transaction(&mut tx, &kp);
        tx.outputs[0].value = 999;

        assert_eq!(
            verify_transaction(&tx),
            Err(TxError::InvalidSignature { index: 0 })
        );
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp = KeyPair::generate();
        let mut tx = unsigned_tx();
        sign_transaction(&mut tx, &kp);
        tx.inputs[0].public_key = KeyPair::generate().public_key().to_bytes().to_vec();

        assert_eq!(
            verify_transaction(&tx),
            Err(TxError::InvalidSignature { index: 0 })
        );
    }

    #[test]
    fn short_signature_rejected() {
        let kp = KeyPair::generate();
        let mut tx = unsigned_tx();
        sign_transaction(&mut tx, &kp);
        tx.inputs[0].signature.truncate(63);

        assert_eq!(
            verify_transaction(&tx),
            Err(TxError::MalformedSignature { index: 0 })
        );
    }

    #[test]
    fn short_public_key_rejected() {
        let mut tx = unsigned_tx();
        tx.inputs[0].public_key = vec![0u8; 31];
        tx.inputs[0].signature = vec![0u8; 64];

        assert_eq!(
            verify_transaction(&tx),
            Err(TxError::MalformedPublicKey { index: 0 })
        );
    }

    #[test]
    fn multi_input_all_signed() {
        let kp = KeyPair::generate();
        let mut tx = unsigned_tx();
        tx.inputs.push(TxInput {
            prev_tx_hash: Hash256([0x33; 32]),
            prev_out_index: 2,
            public_key: vec![],
            signature: vec![],
        });
        sign_transaction(&mut tx, &kp);
        assert!(verify_transaction(&tx).is_ok());
    }
}
