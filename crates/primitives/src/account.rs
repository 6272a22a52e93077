//! Account ids: the 20-byte grouping key derived from a destination script.

use qitd_consensus::AccountId;

use crate::hash::hash160;

pub const ACCOUNT_ID_SIZE: usize = 20;

const OP_0: u8 = 0x00;
const OP_PUSH_20: u8 = 0x14;
const OP_DUP: u8 = 0x76;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_HASH160: u8 = 0xa9;
const OP_CHECKSIG: u8 = 0xac;
const OP_RETURN: u8 = 0x6a;

/// Account id owning an output script.
///
/// Standard P2SH, P2PKH and P2WPKH scripts map to their embedded hash, any
/// other spendable script maps to its HASH160. Empty and `OP_RETURN` scripts
/// have no owner.
pub fn account_id_from_script(script: &[u8]) -> Option<AccountId> {
    match script {
        [] | [OP_RETURN, ..] => None,
        [OP_HASH160, OP_PUSH_20, hash @ .., OP_EQUAL] if hash.len() == ACCOUNT_ID_SIZE => {
            hash.try_into().ok()
        }
        [OP_DUP, OP_HASH160, OP_PUSH_20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG]
            if hash.len() == ACCOUNT_ID_SIZE =>
        {
            hash.try_into().ok()
        }
        [OP_0, OP_PUSH_20, hash @ ..] if hash.len() == ACCOUNT_ID_SIZE => hash.try_into().ok(),
        _ => Some(hash160(script)),
    }
}

/// Pay-to-script-hash output script whose account id is `account`.
pub fn p2sh_script(account: &AccountId) -> Vec<u8> {
    let mut script = Vec::with_capacity(ACCOUNT_ID_SIZE + 3);
    script.push(OP_HASH160);
    script.push(OP_PUSH_20);
    script.extend_from_slice(account);
    script.push(OP_EQUAL);
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_scripts_expose_their_hash() {
        let id = [0x42u8; 20];
        assert_eq!(account_id_from_script(&p2sh_script(&id)), Some(id));

        let mut p2pkh = vec![OP_DUP, OP_HASH160, OP_PUSH_20];
        p2pkh.extend_from_slice(&id);
        p2pkh.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        assert_eq!(account_id_from_script(&p2pkh), Some(id));

        let mut p2wpkh = vec![OP_0, OP_PUSH_20];
        p2wpkh.extend_from_slice(&id);
        assert_eq!(account_id_from_script(&p2wpkh), Some(id));
    }

    #[test]
    fn other_scripts_hash_whole_script() {
        let script = [0x51u8];
        assert_eq!(account_id_from_script(&script), Some(hash160(&script)));
        assert_eq!(account_id_from_script(&[]), None);
        assert_eq!(account_id_from_script(&[OP_RETURN, 0x01, 0x00]), None);
    }
}
