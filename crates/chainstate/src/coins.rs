//! Coins (unspent outputs) and their payload variants.

use std::collections::BTreeMap;

use qitd_consensus::{AccountId, Amount};
use qitd_primitives::encoding::{DecodeError, Decoder, Encodable, Encoder};
use qitd_primitives::{account_id_from_script, OutPoint, TxOut};

pub const COIN_KEY_LEN: usize = 36;

const PAYLOAD_NONE: u8 = 0;
const PAYLOAD_BIND_PLOTTER: u8 = 1;
const PAYLOAD_POINT: u8 = 2;
const PAYLOAD_STAKING: u8 = 3;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum CoinPayload {
    #[default]
    None,
    BindPlotter {
        plotter_id: u64,
    },
    Point {
        receiver: AccountId,
        amount: Amount,
    },
    Staking {
        receiver: AccountId,
        amount: Amount,
        lock_blocks: u32,
    },
}

impl CoinPayload {
    fn encode_into(&self, encoder: &mut Encoder) {
        match self {
            CoinPayload::None => encoder.write_u8(PAYLOAD_NONE),
            CoinPayload::BindPlotter { plotter_id } => {
                encoder.write_u8(PAYLOAD_BIND_PLOTTER);
                encoder.write_u64_le(*plotter_id);
            }
            CoinPayload::Point { receiver, amount } => {
                encoder.write_u8(PAYLOAD_POINT);
                encoder.write_account_id(receiver);
                encoder.write_i64_le(*amount);
            }
            CoinPayload::Staking {
                receiver,
                amount,
                lock_blocks,
            } => {
                encoder.write_u8(PAYLOAD_STAKING);
                encoder.write_account_id(receiver);
                encoder.write_i64_le(*amount);
                encoder.write_u32_le(*lock_blocks);
            }
        }
    }

    fn decode_from(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        match decoder.read_u8()? {
            PAYLOAD_NONE => Ok(CoinPayload::None),
            PAYLOAD_BIND_PLOTTER => Ok(CoinPayload::BindPlotter {
                plotter_id: decoder.read_u64_le()?,
            }),
            PAYLOAD_POINT => Ok(CoinPayload::Point {
                receiver: decoder.read_account_id()?,
                amount: decoder.read_i64_le()?,
            }),
            PAYLOAD_STAKING => Ok(CoinPayload::Staking {
                receiver: decoder.read_account_id()?,
                amount: decoder.read_i64_le()?,
                lock_blocks: decoder.read_u32_le()?,
            }),
            _ => Err(DecodeError::InvalidData("unknown coin payload")),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Coin {
    pub out: TxOut,
    pub height: u32,
    pub is_coinbase: bool,
    /// Only meaningful in memory; spent coins are erased from the store.
    pub spent: bool,
    pub owner: Option<AccountId>,
    pub payload: CoinPayload,
}

impl Coin {
    /// New unspent coin whose owner is derived from the output script.
    pub fn new(out: TxOut, height: u32, is_coinbase: bool, payload: CoinPayload) -> Self {
        let owner = account_id_from_script(&out.script_pubkey);
        Self {
            out,
            height,
            is_coinbase,
            spent: false,
            owner,
            payload,
        }
    }

    pub fn value(&self) -> Amount {
        self.out.value
    }

    pub fn spend(&mut self) {
        self.spent = true;
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(64 + self.out.script_pubkey.len());
        self.out.consensus_encode(&mut encoder);
        encoder.write_u32_le(self.height);
        encoder.write_bool(self.is_coinbase);
        match &self.owner {
            Some(owner) => {
                encoder.write_u8(1);
                encoder.write_account_id(owner);
            }
            None => encoder.write_u8(0),
        }
        self.payload.encode_into(&mut encoder);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        let height = decoder.read_u32_le()?;
        let is_coinbase = decoder.read_bool()?;
        let owner = match decoder.read_u8()? {
            0 => None,
            1 => Some(decoder.read_account_id()?),
            _ => return Err(DecodeError::InvalidData("coin owner flag")),
        };
        let payload = CoinPayload::decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self {
            out: TxOut {
                value,
                script_pubkey,
            },
            height,
            is_coinbase,
            spent: false,
            owner,
            payload,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoinsCacheEntry {
    pub coin: Coin,
    pub dirty: bool,
}

impl CoinsCacheEntry {
    pub fn dirty(coin: Coin) -> Self {
        Self { coin, dirty: true }
    }
}

/// In-flight coin changes, ordered so batches are written deterministically.
pub type CoinsMap = BTreeMap<OutPoint, CoinsCacheEntry>;

pub fn coin_key(outpoint: &OutPoint) -> [u8; COIN_KEY_LEN] {
    let mut key = [0u8; COIN_KEY_LEN];
    key[..32].copy_from_slice(&outpoint.hash);
    key[32..].copy_from_slice(&outpoint.index.to_le_bytes());
    key
}

pub fn outpoint_from_coin_key(key: &[u8]) -> Option<OutPoint> {
    if key.len() != COIN_KEY_LEN {
        return None;
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&key[..32]);
    let index = u32::from_le_bytes(key[32..].try_into().ok()?);
    Some(OutPoint::new(hash, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qitd_primitives::p2sh_script;

    fn sample(payload: CoinPayload) -> Coin {
        Coin::new(TxOut::new(5_000, p2sh_script(&[4u8; 20])), 77, false, payload)
    }

    #[test]
    fn owner_follows_script() {
        assert_eq!(sample(CoinPayload::None).owner, Some([4u8; 20]));
        let burn = Coin::new(TxOut::new(1, vec![0x6a, 0x01, 0x00]), 1, false, CoinPayload::None);
        assert_eq!(burn.owner, None);
    }

    #[test]
    fn payload_variants_persist() {
        for payload in [
            CoinPayload::None,
            CoinPayload::BindPlotter { plotter_id: 99 },
            CoinPayload::Point {
                receiver: [5u8; 20],
                amount: 300,
            },
            CoinPayload::Staking {
                receiver: [6u8; 20],
                amount: 400,
                lock_blocks: 12,
            },
        ] {
            let coin = sample(payload);
            assert_eq!(Coin::decode(&coin.encode()), Ok(coin));
        }
    }

    #[test]
    fn decode_rejects_unknown_payload_and_trailing_bytes() {
        let mut bytes = sample(CoinPayload::None).encode();
        bytes.push(0);
        assert_eq!(Coin::decode(&bytes), Err(DecodeError::TrailingBytes));

        let last = bytes.len() - 2;
        bytes.truncate(last + 1);
        bytes[last] = 9;
        assert!(Coin::decode(&bytes).is_err());
    }

    #[test]
    fn coin_key_parses_back() {
        let outpoint = OutPoint::new([3u8; 32], 0x0102_0304);
        assert_eq!(outpoint_from_coin_key(&coin_key(&outpoint)), Some(outpoint));
        assert_eq!(outpoint_from_coin_key(&[0u8; 35]), None);
    }
}
