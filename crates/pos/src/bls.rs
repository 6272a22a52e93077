//! BLS12-381 keys and signatures in the augmented scheme.
//!
//! Public keys live in G1 (48 bytes compressed), signatures in G2 (96 bytes).
//! Every signature covers `public key ‖ message`, where the public key is
//! either the signer's own key or an explicitly supplied aggregate key.

use std::fmt;
use std::ops::Add;

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{pairing, G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use group::Curve;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

pub const PUBLIC_KEY_SIZE: usize = 48;
pub const SIGNATURE_SIZE: usize = 96;
pub const PRIVATE_KEY_SIZE: usize = 32;
pub const MIN_SEED_SIZE: usize = 32;

const AUG_SCHEME_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_AUG_";
const KEYGEN_SALT: &[u8] = b"BLS-SIG-KEYGEN-SALT-";
const KEYGEN_OKM_SIZE: usize = 48;
const LAMPORT_CHUNKS: usize = 255;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyError {
    SeedTooShort(usize),
    InvalidLength { expected: usize, actual: usize },
    InvalidPublicKey,
    InvalidSignature,
    InvalidPrivateKey,
    Derivation,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::SeedTooShort(len) => {
                write!(f, "seed of {len} bytes is shorter than {MIN_SEED_SIZE}")
            }
            KeyError::InvalidLength { expected, actual } => {
                write!(f, "expected {expected} bytes, got {actual}")
            }
            KeyError::InvalidPublicKey => write!(f, "invalid G1 public key"),
            KeyError::InvalidSignature => write!(f, "invalid G2 signature"),
            KeyError::InvalidPrivateKey => write!(f, "invalid private key scalar"),
            KeyError::Derivation => write!(f, "key derivation failed"),
        }
    }
}

impl std::error::Error for KeyError {}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], KeyError> {
    bytes.try_into().map_err(|_| KeyError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct PrivateKey(Scalar);

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl PrivateKey {
    /// IETF BLS KeyGen: HKDF-SHA256 over `seed ‖ 0x00` with the keygen salt,
    /// 48 output bytes reduced modulo the group order.
    pub fn key_gen(seed: &[u8]) -> Result<Self, KeyError> {
        if seed.len() < MIN_SEED_SIZE {
            return Err(KeyError::SeedTooShort(seed.len()));
        }
        let mut ikm = Vec::with_capacity(seed.len() + 1);
        ikm.extend_from_slice(seed);
        ikm.push(0);
        let info = (KEYGEN_OKM_SIZE as u16).to_be_bytes();
        let mut okm = [0u8; KEYGEN_OKM_SIZE];
        Hkdf::<Sha256>::new(Some(KEYGEN_SALT), &ikm)
            .expand(&info, &mut okm)
            .map_err(|_| KeyError::Derivation)?;
        Ok(Self(scalar_from_be_bytes(&okm)))
    }

    /// Big-endian scalar encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let mut le = fixed::<PRIVATE_KEY_SIZE>(bytes)?;
        le.reverse();
        Option::<Scalar>::from(Scalar::from_bytes(&le))
            .map(Self)
            .ok_or(KeyError::InvalidPrivateKey)
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        let mut out = self.0.to_bytes();
        out.reverse();
        out
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey((G1Projective::generator() * self.0).to_affine())
    }

    /// Hardened child derivation through a compressed Lamport public key.
    pub fn derive_child(&self, index: u32) -> Result<Self, KeyError> {
        let salt = index.to_be_bytes();
        let ikm = self.to_bytes();
        let not_ikm = ikm.map(|byte| !byte);

        let mut lamport_pk = Sha256::new();
        for seed in [ikm, not_ikm] {
            let mut lamport_sk = vec![0u8; 32 * LAMPORT_CHUNKS];
            Hkdf::<Sha256>::new(Some(&salt), &seed)
                .expand(&[], &mut lamport_sk)
                .map_err(|_| KeyError::Derivation)?;
            for chunk in lamport_sk.chunks_exact(32) {
                lamport_pk.update(Sha256::digest(chunk));
            }
        }
        let compressed: [u8; 32] = lamport_pk.finalize().into();
        Self::key_gen(&compressed)
    }

    pub fn derive_path(&self, path: &[u32]) -> Result<Self, KeyError> {
        path.iter()
            .try_fold(*self, |key, index| key.derive_child(*index))
    }

    /// Sign `message` prefixed with this key's own public key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.sign_prepend(message, &self.public_key())
    }

    /// Sign `message` prefixed with `prepend`, so the result verifies (alone
    /// or aggregated with other signers' shares) under `prepend`.
    pub fn sign_prepend(&self, message: &[u8], prepend: &PublicKey) -> Signature {
        Signature((hash_augmented(prepend, message) * self.0).to_affine())
    }
}

fn scalar_from_be_bytes(bytes: &[u8; KEYGEN_OKM_SIZE]) -> Scalar {
    let mut wide = [0u8; 64];
    for (dst, src) in wide.iter_mut().zip(bytes.iter().rev()) {
        *dst = *src;
    }
    Scalar::from_bytes_wide(&wide)
}

fn hash_augmented(public_key: &PublicKey, message: &[u8]) -> G2Projective {
    let mut augmented = Vec::with_capacity(PUBLIC_KEY_SIZE + message.len());
    augmented.extend_from_slice(&public_key.to_bytes());
    augmented.extend_from_slice(message);
    // hash_to_curve is written against digest 0.9
    <G2Projective as HashToCurve<ExpandMsgXmd<sha2_09::Sha256>>>::hash_to_curve(
        &augmented,
        AUG_SCHEME_DST,
    )
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublicKey(G1Affine);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let raw = fixed::<PUBLIC_KEY_SIZE>(bytes)?;
        Option::<G1Affine>::from(G1Affine::from_compressed(&raw))
            .map(Self)
            .ok_or(KeyError::InvalidPublicKey)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_compressed()
    }

    pub fn is_identity(&self) -> bool {
        bool::from(self.0.is_identity())
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        if self.is_identity() {
            return false;
        }
        pairing(&G1Affine::generator(), &signature.0)
            == pairing(&self.0, &hash_augmented(self, message).to_affine())
    }
}

impl Add for PublicKey {
    type Output = PublicKey;

    fn add(self, other: PublicKey) -> PublicKey {
        PublicKey((G1Projective::from(self.0) + other.0).to_affine())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature(G2Affine);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let raw = fixed::<SIGNATURE_SIZE>(bytes)?;
        Option::<G2Affine>::from(G2Affine::from_compressed(&raw))
            .map(Self)
            .ok_or(KeyError::InvalidSignature)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        self.0.to_compressed()
    }

    pub fn aggregate(signatures: &[Signature]) -> Signature {
        let sum = signatures
            .iter()
            .fold(G2Projective::identity(), |acc, signature| acc + signature.0);
        Signature(sum.to_affine())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tag: u8) -> PrivateKey {
        PrivateKey::key_gen(&[tag; 32]).expect("keygen")
    }

    fn fingerprint(public_key: &PublicKey) -> u32 {
        let digest = Sha256::digest(public_key.to_bytes());
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    fn hex_bytes(hex: &str) -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|idx| u8::from_str_radix(&hex[idx..idx + 2], 16).expect("hex"))
            .collect()
    }

    #[test]
    fn key_gen_matches_reference_fingerprints() {
        assert_eq!(fingerprint(&key(0x00).public_key()), 0xb40d_d58a);
        assert_eq!(fingerprint(&key(0x01).public_key()), 0xb839_add1);
    }

    #[test]
    fn hardened_derivation_matches_reference_vector() {
        let seed = hex_bytes("3141592653589793238462643383279502884197169399375105820974944592");
        let master = PrivateKey::key_gen(&seed).expect("keygen");
        assert_eq!(
            master.to_bytes().to_vec(),
            hex_bytes("4ff5e145590ed7b71e577bb04032396d1619ff41cb4e350053ed2dce8d1efd1c")
        );
        let child = master.derive_child(3_141_592_653).expect("child");
        assert_eq!(
            child.to_bytes().to_vec(),
            hex_bytes("5c62dcf9654481292aafa3348f1d1b0017bbfb44d6881d26d2b17836b38f204d")
        );
    }

    #[test]
    fn key_gen_rejects_short_seed() {
        assert_eq!(PrivateKey::key_gen(&[0u8; 31]), Err(KeyError::SeedTooShort(31)));
    }

    #[test]
    fn key_gen_is_deterministic() {
        assert_eq!(key(1), key(1));
        assert_ne!(key(1), key(2));
        assert_eq!(key(1).public_key(), key(1).public_key());
    }

    #[test]
    fn private_key_bytes_roundtrip() {
        let sk = key(3);
        assert_eq!(PrivateKey::from_bytes(&sk.to_bytes()), Ok(sk));
        assert!(PrivateKey::from_bytes(&[0xff; 32]).is_err());
        assert!(PrivateKey::from_bytes(&[1; 31]).is_err());
    }

    #[test]
    fn public_key_bytes_roundtrip() {
        let pk = key(4).public_key();
        assert_eq!(PublicKey::from_bytes(&pk.to_bytes()), Ok(pk));
        assert_eq!(
            PublicKey::from_bytes(&[0u8; 47]),
            Err(KeyError::InvalidLength {
                expected: 48,
                actual: 47
            })
        );
        assert_eq!(
            PublicKey::from_bytes(&[0x11; 48]),
            Err(KeyError::InvalidPublicKey)
        );
    }

    #[test]
    fn child_derivation_depends_on_index() {
        let master = key(5);
        let a = master.derive_child(0).expect("child");
        let b = master.derive_child(1).expect("child");
        assert_ne!(a, b);
        assert_eq!(master.derive_child(0).expect("child"), a);
        assert_eq!(
            master.derive_path(&[0, 1]).expect("path"),
            a.derive_child(1).expect("child")
        );
    }

    #[test]
    fn sign_and_verify() {
        let sk = key(6);
        let pk = sk.public_key();
        let signature = sk.sign(b"challenge");
        assert!(pk.verify(b"challenge", &signature));
        assert!(!pk.verify(b"challengf", &signature));
        assert!(!key(7).public_key().verify(b"challenge", &signature));

        let decoded = Signature::from_bytes(&signature.to_bytes()).expect("decode");
        assert!(pk.verify(b"challenge", &decoded));
    }

    #[test]
    fn aggregate_verifies_under_summed_key() {
        let a = key(8);
        let b = key(9);
        let combined = a.public_key() + b.public_key();
        let message = [0x42u8; 32];
        let aggregate = Signature::aggregate(&[
            a.sign_prepend(&message, &combined),
            b.sign_prepend(&message, &combined),
        ]);
        assert!(combined.verify(&message, &aggregate));
        assert!(!combined.verify(&message, &a.sign_prepend(&message, &combined)));
    }
}
