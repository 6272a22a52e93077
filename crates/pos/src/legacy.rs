//! Passphrase-derived curve25519 keys for legacy capacity mining.
//!
//! Public keys are X25519 (Montgomery u) coordinates. Signatures are `v ‖ h`
//! where `h = H(data ‖ Y)` and `Y` is a one-time commitment key. A verifier
//! recovers the Edwards point with sign 0 from the public key, recomputes
//! `Y = v·P + h·B` and checks the hash.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::{clamp_integer, Scalar};
use qitd_primitives::{sha256, sha256_concat};

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

struct KeyPair {
    public: [u8; PUBLIC_KEY_SIZE],
    /// Satisfies `signing·B == to_edwards(public, 0)`.
    signing: Scalar,
}

fn keygen(seed: [u8; 32]) -> KeyPair {
    let clamped = Scalar::from_bytes_mod_order(clamp_integer(seed));
    let point = EdwardsPoint::mul_base(&clamped);
    let public = point.to_montgomery().to_bytes();
    let signing = if point.compress().as_bytes()[31] >> 7 == 1 {
        -clamped
    } else {
        clamped
    };
    KeyPair { public, signing }
}

fn passphrase_keys(passphrase: &str) -> KeyPair {
    keygen(sha256(passphrase.as_bytes()))
}

pub fn public_key_from_passphrase(passphrase: &str) -> [u8; PUBLIC_KEY_SIZE] {
    passphrase_keys(passphrase).public
}

pub fn plotter_id_from_public_key(public_key: &[u8; PUBLIC_KEY_SIZE]) -> u64 {
    let digest = sha256(public_key);
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(low)
}

pub fn plotter_id_from_passphrase(passphrase: &str) -> u64 {
    plotter_id_from_public_key(&public_key_from_passphrase(passphrase))
}

/// Returns `None` only when the derived signing scalar is not invertible.
pub fn sign(
    passphrase: &str,
    data: &[u8; 32],
) -> Option<([u8; SIGNATURE_SIZE], [u8; PUBLIC_KEY_SIZE])> {
    let keys = passphrase_keys(passphrase);
    if keys.signing == Scalar::ZERO {
        return None;
    }

    let commit_seed = sha256_concat(&[data, keys.signing.as_bytes()]);
    let commit_scalar = Scalar::from_bytes_mod_order(clamp_integer(commit_seed));
    let commitment = MontgomeryPoint::mul_base(&commit_scalar).to_bytes();
    let h = sha256_concat(&[data, &commitment]);
    let h_scalar = Scalar::from_bytes_mod_order(h);
    let v = (commit_scalar - h_scalar) * keys.signing.invert();

    let mut signature = [0u8; SIGNATURE_SIZE];
    signature[..32].copy_from_slice(v.as_bytes());
    signature[32..].copy_from_slice(&h);
    Some((signature, keys.public))
}

pub fn verify(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    data: &[u8; 32],
    signature: &[u8; SIGNATURE_SIZE],
) -> bool {
    let Some(point) = MontgomeryPoint(*public_key).to_edwards(0) else {
        return false;
    };
    let mut v_bytes = [0u8; 32];
    v_bytes.copy_from_slice(&signature[..32]);
    let Some(v) = Option::<Scalar>::from(Scalar::from_canonical_bytes(v_bytes)) else {
        return false;
    };
    let mut h = [0u8; 32];
    h.copy_from_slice(&signature[32..]);
    let h_scalar = Scalar::from_bytes_mod_order(h);

    let commitment = EdwardsPoint::vartime_double_scalar_mul_basepoint(&v, &point, &h_scalar);
    sha256_concat(&[data, commitment.to_montgomery().as_bytes()]) == h
}
