//! Farmer identity: master keys, role keys, plot keys and ids.

use pbkdf2::pbkdf2_hmac;
use qitd_consensus::constants::{FARMER_KEY_PATH, LOCAL_KEY_PATH, POOL_KEY_PATH};
use qitd_consensus::Hash256;
use qitd_primitives::block::TAPROOT_POOL_HASH_SIZE;
use qitd_primitives::{sha256, sha256_concat};
use sha2::Sha512;

use crate::bls::{KeyError, PrivateKey, PublicKey, PUBLIC_KEY_SIZE};

const MNEMONIC_SALT_PREFIX: &str = "mnemonic";
const MNEMONIC_ROUNDS: u32 = 2048;

/// PBKDF2-HMAC-SHA512 seed expansion of a mnemonic phrase.
pub fn mnemonic_to_seed(mnemonic: &str, password: &str) -> [u8; 64] {
    let salt = format!("{MNEMONIC_SALT_PREFIX}{password}");
    let mut seed = [0u8; 64];
    pbkdf2_hmac::<Sha512>(mnemonic.as_bytes(), salt.as_bytes(), MNEMONIC_ROUNDS, &mut seed);
    seed
}

pub fn derive_master_key(passphrase: &str) -> Result<PrivateKey, KeyError> {
    PrivateKey::key_gen(&mnemonic_to_seed(passphrase, ""))
}

pub fn derive_child(master: &PrivateKey, path: &[u32]) -> Result<PrivateKey, KeyError> {
    master.derive_path(path)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyRole {
    Farmer,
    Pool,
    Local,
}

impl KeyRole {
    pub fn path(self) -> &'static [u32] {
        match self {
            KeyRole::Farmer => &FARMER_KEY_PATH,
            KeyRole::Pool => &POOL_KEY_PATH,
            KeyRole::Local => &LOCAL_KEY_PATH,
        }
    }
}

pub fn derive_role_key(master: &PrivateKey, role: KeyRole) -> Result<PrivateKey, KeyError> {
    derive_child(master, role.path())
}

pub fn plot_public_key(
    local: &PublicKey,
    farmer: &PublicKey,
    taproot: Option<&PublicKey>,
) -> PublicKey {
    let sum = *local + *farmer;
    match taproot {
        Some(taproot) => sum + *taproot,
        None => sum,
    }
}

/// Recomputable from the two public keys alone.
pub fn taproot_private_key(local: &PublicKey, farmer: &PublicKey) -> Result<PrivateKey, KeyError> {
    let sum = *local + *farmer;
    let seed = sha256_concat(&[&sum.to_bytes(), &local.to_bytes(), &farmer.to_bytes()]);
    PrivateKey::key_gen(&seed)
}

/// A pool field is either a 48-byte pool public key or a 32-byte pool
/// contract hash; only the latter selects the taproot variant.
pub fn is_taproot_pool(pool_key_bytes: &[u8]) -> Result<bool, KeyError> {
    match pool_key_bytes.len() {
        TAPROOT_POOL_HASH_SIZE => Ok(true),
        PUBLIC_KEY_SIZE => Ok(false),
        actual => Err(KeyError::InvalidLength {
            expected: PUBLIC_KEY_SIZE,
            actual,
        }),
    }
}

pub fn plot_public_key_for_pool(
    local: &PublicKey,
    farmer: &PublicKey,
    pool_key_bytes: &[u8],
) -> Result<PublicKey, KeyError> {
    if !is_taproot_pool(pool_key_bytes)? {
        return Ok(plot_public_key(local, farmer, None));
    }
    let taproot = taproot_private_key(local, farmer)?.public_key();
    Ok(plot_public_key(local, farmer, Some(&taproot)))
}

pub fn plot_id(pool_key_bytes: &[u8], plot_key: &PublicKey) -> Hash256 {
    sha256_concat(&[pool_key_bytes, &plot_key.to_bytes()])
}

/// 64-bit id for a 48-byte farmer public key; any other length maps to 0.
pub fn farmer_id(farmer_pubkey: &[u8]) -> u64 {
    if farmer_pubkey.len() != PUBLIC_KEY_SIZE {
        return 0;
    }
    let Ok(key) = PrivateKey::key_gen(&sha256(farmer_pubkey)) else {
        return 0;
    };
    let digest = sha256(&key.public_key().to_bytes());
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_key_is_deterministic() {
        let a = derive_master_key("correct horse battery staple").expect("master");
        let b = derive_master_key("correct horse battery staple").expect("master");
        let c = derive_master_key("correct horse battery stapler").expect("master");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn mnemonic_seed_uses_password_salt() {
        assert_ne!(mnemonic_to_seed("phrase", ""), mnemonic_to_seed("phrase", "x"));
    }

    #[test]
    fn role_keys_differ() {
        let master = derive_master_key("roles").expect("master");
        let farmer = derive_role_key(&master, KeyRole::Farmer).expect("farmer");
        let pool = derive_role_key(&master, KeyRole::Pool).expect("pool");
        let local = derive_role_key(&master, KeyRole::Local).expect("local");
        assert_ne!(farmer, pool);
        assert_ne!(farmer, local);
        assert_ne!(pool, local);
    }

    #[test]
    fn taproot_key_needs_only_public_keys() {
        let local = PrivateKey::key_gen(&[1; 32]).expect("local").public_key();
        let farmer = PrivateKey::key_gen(&[2; 32]).expect("farmer").public_key();
        assert_eq!(
            taproot_private_key(&local, &farmer).expect("taproot"),
            taproot_private_key(&local, &farmer).expect("taproot")
        );

        let taproot = taproot_private_key(&local, &farmer).expect("taproot").public_key();
        assert_eq!(
            plot_public_key_for_pool(&local, &farmer, &[0u8; 32]).expect("plot key"),
            plot_public_key(&local, &farmer, Some(&taproot))
        );
        assert_eq!(
            plot_public_key_for_pool(&local, &farmer, &[0u8; 48]).expect("plot key"),
            local + farmer
        );
    }

    #[test]
    fn pool_field_length_selects_variant() {
        let local = PrivateKey::key_gen(&[1; 32]).expect("local").public_key();
        let farmer = PrivateKey::key_gen(&[2; 32]).expect("farmer").public_key();
        assert_eq!(is_taproot_pool(&[0u8; 32]), Ok(true));
        assert_eq!(is_taproot_pool(&[0u8; 48]), Ok(false));
        for len in [0, 31, 33, 47, 49, 96] {
            assert_eq!(
                plot_public_key_for_pool(&local, &farmer, &vec![0u8; len]),
                Err(KeyError::InvalidLength {
                    expected: PUBLIC_KEY_SIZE,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn plot_id_covers_pool_and_plot_key() {
        let plot_key = PrivateKey::key_gen(&[3; 32]).expect("key").public_key();
        assert_ne!(plot_id(&[0u8; 48], &plot_key), plot_id(&[1u8; 48], &plot_key));
        assert_eq!(plot_id(&[0u8; 32], &plot_key), plot_id(&[0u8; 32], &plot_key));
    }

    #[test]
    fn farmer_id_rejects_wrong_length() {
        assert_eq!(farmer_id(&[7u8; 47]), 0);
        let pk = PrivateKey::key_gen(&[4; 32]).expect("key").public_key().to_bytes();
        assert_ne!(farmer_id(&pk), 0);
        assert_eq!(farmer_id(&pk), farmer_id(&pk));
    }
}
