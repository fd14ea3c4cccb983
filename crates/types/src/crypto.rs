//! BLS12-381 keys and signatures.
//!
//! Thin typed wrappers over `blst` (min-pk variant: public keys in G1,
//! signatures in G2). Keys and signatures are stored compressed so they are
//! `Copy`, hashable and cheap to move through channels; the accumulators
//! keep decompressed points for running point addition.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Domain separation tag for operator signatures.
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Errors from key and signature handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid public key encoding")]
    InvalidPublicKey,

    #[error("Invalid signature encoding")]
    InvalidSignature,

    #[error("Invalid key seed")]
    InvalidSeed,

    #[error("Cannot aggregate empty list")]
    Empty,

    #[error("Point aggregation failed")]
    AggregationFailed,

    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

/// A BLS secret key used by operators to sign task digests.
#[derive(Clone)]
pub struct BlsKeyPair {
    sk: blst::min_pk::SecretKey,
}

impl BlsKeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut ikm = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut ikm);
        // 32 bytes of input keying material always satisfies key_gen.
        Self::from_seed(&ikm).unwrap_or_else(|_| unreachable!("32-byte ikm is always valid"))
    }

    /// Derive a keypair from a 32-byte seed (tests, simulation, key files).
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let sk = blst::min_pk::SecretKey::key_gen(seed, &[]).map_err(|_| CryptoError::InvalidSeed)?;
        Ok(Self { sk })
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature(self.sk.sign(message, BLS_DST, &[]).to_bytes())
    }

    /// Get the public key.
    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey(self.sk.sk_to_pk().to_bytes())
    }
}

impl fmt::Debug for BlsKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsKeyPair({:?})", self.public_key())
    }
}

/// A compressed BLS public key (48 bytes, G1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlsPublicKey([u8; 48]);

impl BlsPublicKey {
    /// Size of a compressed public key in bytes.
    pub const BYTES: usize = 48;

    /// Parse and validate a compressed public key.
    ///
    /// Rejects encodings that are not on the curve, not in the subgroup, or
    /// the point at infinity.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let pk = blst::min_pk::PublicKey::key_validate(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(pk.to_bytes()))
    }

    /// Parse from hex (optional `0x` prefix).
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = decode_hex(hex)?;
        Self::from_bytes(&bytes)
    }

    /// Get the compressed bytes.
    pub fn as_bytes(&self) -> &[u8; 48] {
        &self.0
    }

    /// Hex encoding of the compressed bytes (no prefix).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_blst(self) -> Result<blst::min_pk::PublicKey, CryptoError> {
        blst::min_pk::PublicKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Verify a signature over `message` against this key.
    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> bool {
        let Ok(pk) = self.to_blst() else {
            return false;
        };
        let Ok(sig) = signature.to_blst() else {
            return false;
        };
        sig.verify(true, message, BLS_DST, &[], &pk, true) == blst::BLST_ERROR::BLST_SUCCESS
    }

    /// Aggregate public keys by point addition.
    pub fn aggregate(keys: &[BlsPublicKey]) -> Result<Self, CryptoError> {
        let mut acc = PublicKeyAccumulator::new();
        for key in keys {
            acc.add(key)?;
        }
        acc.finish().ok_or(CryptoError::Empty)
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "BlsPublicKey({}..{})", &hex[..8], &hex[hex.len() - 8..])
    }
}

impl fmt::Display for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// A compressed BLS signature (96 bytes, G2).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlsSignature([u8; 96]);

impl BlsSignature {
    /// Size of a compressed signature in bytes.
    pub const BYTES: usize = 96;

    /// Parse a compressed signature. Subgroup membership is checked at
    /// verification time.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let sig =
            blst::min_pk::Signature::from_bytes(bytes).map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(sig.to_bytes()))
    }

    /// Parse from hex (optional `0x` prefix).
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = decode_hex(hex)?;
        Self::from_bytes(&bytes)
    }

    /// Get the compressed bytes.
    pub fn as_bytes(&self) -> &[u8; 96] {
        &self.0
    }

    /// Hex encoding of the compressed bytes (no prefix).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_blst(self) -> Result<blst::min_pk::Signature, CryptoError> {
        blst::min_pk::Signature::from_bytes(&self.0).map_err(|_| CryptoError::InvalidSignature)
    }

    /// Aggregate signatures by point addition.
    pub fn aggregate(signatures: &[BlsSignature]) -> Result<Self, CryptoError> {
        let mut acc = SignatureAccumulator::new();
        for sig in signatures {
            acc.add(sig)?;
        }
        acc.finish().ok_or(CryptoError::Empty)
    }
}

impl fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSignature({}..)", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Running G1 point sum of public keys.
#[derive(Default)]
pub struct PublicKeyAccumulator {
    point: Option<blst::min_pk::AggregatePublicKey>,
}

impl PublicKeyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key into the running sum.
    pub fn add(&mut self, key: &BlsPublicKey) -> Result<(), CryptoError> {
        let pk = key.to_blst()?;
        match self.point.as_mut() {
            Some(agg) => agg
                .add_public_key(&pk, false)
                .map_err(|_| CryptoError::AggregationFailed)?,
            None => self.point = Some(blst::min_pk::AggregatePublicKey::from_public_key(&pk)),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_none()
    }

    /// Compressed sum, or `None` if nothing was added.
    pub fn finish(&self) -> Option<BlsPublicKey> {
        self.point
            .as_ref()
            .map(|agg| BlsPublicKey(agg.to_public_key().to_bytes()))
    }
}

impl fmt::Debug for PublicKeyAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKeyAccumulator")
            .field(&self.finish())
            .finish()
    }
}

/// Running G2 point sum of signatures.
#[derive(Default)]
pub struct SignatureAccumulator {
    point: Option<blst::min_pk::AggregateSignature>,
}

impl SignatureAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signature into the running sum.
    pub fn add(&mut self, signature: &BlsSignature) -> Result<(), CryptoError> {
        let sig = signature.to_blst()?;
        match self.point.as_mut() {
            Some(agg) => agg
                .add_signature(&sig, true)
                .map_err(|_| CryptoError::AggregationFailed)?,
            None => self.point = Some(blst::min_pk::AggregateSignature::from_signature(&sig)),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_none()
    }

    /// Compressed sum, or `None` if nothing was added.
    pub fn finish(&self) -> Option<BlsSignature> {
        self.point
            .as_ref()
            .map(|agg| BlsSignature(agg.to_signature().to_bytes()))
    }
}

impl fmt::Debug for SignatureAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SignatureAccumulator")
            .field(&self.finish())
            .finish()
    }
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, CryptoError> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    hex::decode(hex).map_err(|e| CryptoError::InvalidHex(e.to_string()))
}

macro_rules! impl_hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                <$ty>::from_hex(&s).map_err(de::Error::custom)
            }
        }
    };
}

impl_hex_serde!(BlsPublicKey);
impl_hex_serde!(BlsSignature);
