//! Block header with the flag-encoded proof-of-space layout.

use qitd_consensus::constants::{
    BASE_TARGET_MASK, HEADER_FLAG_SIGNATURE, HEADER_FLAG_SPACE_PROOF, MAX_PLOT_SIZE,
    MIN_PLOT_SIZE,
};
use qitd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;

pub const BLS_PUBLIC_KEY_SIZE: usize = 48;
pub const TAPROOT_POOL_HASH_SIZE: usize = 32;
pub const BLS_SIGNATURE_SIZE: usize = 96;
pub const MAX_SPACE_PROOF_SIZE: usize = 1024;
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;
pub const MAX_HEADER_SIGNATURE_SIZE: usize = 72;

/// Chia-style proof of space carried by a block header.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SpaceProof {
    pub farmer_pubkey: Vec<u8>,
    /// 48-byte pool public key, or a 32-byte pool contract hash in taproot mode.
    pub pool_pubkey: Vec<u8>,
    pub local_pubkey: Vec<u8>,
    pub proof: Vec<u8>,
    pub k: i32,
    pub signature: Vec<u8>,
    pub scan_iterations: i32,
}

impl SpaceProof {
    pub fn is_null(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_taproot(&self) -> bool {
        self.pool_pubkey.len() == TAPROOT_POOL_HASH_SIZE
    }

    /// All fixed-length fields have their exact sizes and `k` is a supported plot size.
    pub fn is_well_formed(&self) -> bool {
        self.farmer_pubkey.len() == BLS_PUBLIC_KEY_SIZE
            && (self.pool_pubkey.len() == BLS_PUBLIC_KEY_SIZE || self.is_taproot())
            && self.local_pubkey.len() == BLS_PUBLIC_KEY_SIZE
            && !self.proof.is_empty()
            && (MIN_PLOT_SIZE..=MAX_PLOT_SIZE).contains(&self.k)
            && self.signature.len() == BLS_SIGNATURE_SIZE
            && (0..i32::MAX).contains(&self.scan_iterations)
    }
}

impl Encodable for SpaceProof {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_var_bytes(&self.farmer_pubkey);
        encoder.write_var_bytes(&self.pool_pubkey);
        encoder.write_var_bytes(&self.local_pubkey);
        encoder.write_var_bytes(&self.proof);
        encoder.write_i32_le(self.k);
        encoder.write_var_bytes(&self.signature);
        encoder.write_i32_le(self.scan_iterations);
    }
}

impl Decodable for SpaceProof {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            farmer_pubkey: decoder.read_limited_bytes(BLS_PUBLIC_KEY_SIZE)?,
            pool_pubkey: decoder.read_limited_bytes(BLS_PUBLIC_KEY_SIZE)?,
            local_pubkey: decoder.read_limited_bytes(BLS_PUBLIC_KEY_SIZE)?,
            proof: decoder.read_limited_bytes(MAX_SPACE_PROOF_SIZE)?,
            k: decoder.read_i32_le()?,
            signature: decoder.read_limited_bytes(BLS_SIGNATURE_SIZE)?,
            scan_iterations: decoder.read_i32_le()?,
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    /// Only the low 48 bits are serialized.
    pub base_target: u64,
    /// Capacity nonce before proof of space, required iterations after.
    pub nonce: u64,
    /// Capacity plotter id before proof of space, farmer id after.
    pub plotter_id: u64,
    pub space_proof: Option<SpaceProof>,
    pub pubkey: Vec<u8>,
    pub signature: Vec<u8>,
}

impl BlockHeader {
    pub fn flags(&self) -> u64 {
        let mut flags = self.base_target & BASE_TARGET_MASK;
        if self.space_proof.is_some() {
            flags |= HEADER_FLAG_SPACE_PROOF;
        }
        if !self.pubkey.is_empty() {
            flags |= HEADER_FLAG_SIGNATURE;
        }
        flags
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        self.encode_with_mode(true)
    }

    /// Encoding without the trailing generator signature.
    pub fn consensus_encode_unsigned(&self) -> Vec<u8> {
        self.encode_with_mode(false)
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    /// Hash committed to by the generator signature.
    pub fn unsigned_hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode_unsigned())
    }

    fn encode_with_mode(&self, include_signature: bool) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(128);
        encoder.write_i32_le(self.version);
        encoder.write_hash(&self.prev_block);
        encoder.write_hash(&self.merkle_root);
        encoder.write_u32_le(self.time);
        encoder.write_u64_le(self.flags());
        encoder.write_u64_le(self.nonce);
        encoder.write_u64_le(self.plotter_id);
        if let Some(space_proof) = &self.space_proof {
            space_proof.consensus_encode(&mut encoder);
        }
        if !self.pubkey.is_empty() {
            encoder.write_var_bytes(&self.pubkey);
            if include_signature {
                encoder.write_var_bytes(&self.signature);
            }
        }
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_exact(bytes, true)
    }

    pub fn consensus_decode_unsigned(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_exact(bytes, false)
    }

    fn decode_exact(bytes: &[u8], include_signature: bool) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = Self::consensus_decode_from(&mut decoder, include_signature)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(header)
    }

    pub fn consensus_decode_from(
        decoder: &mut Decoder,
        include_signature: bool,
    ) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let prev_block = decoder.read_hash()?;
        let merkle_root = decoder.read_hash()?;
        let time = decoder.read_u32_le()?;
        let flags = decoder.read_u64_le()?;
        let nonce = decoder.read_u64_le()?;
        let plotter_id = decoder.read_u64_le()?;

        let space_proof = if flags & HEADER_FLAG_SPACE_PROOF != 0 {
            Some(SpaceProof::consensus_decode(decoder)?)
        } else {
            None
        };

        let (pubkey, signature) = if flags & HEADER_FLAG_SIGNATURE != 0 {
            let pubkey = decoder.read_limited_bytes(COMPRESSED_PUBLIC_KEY_SIZE)?;
            if pubkey.is_empty() {
                return Err(DecodeError::InvalidData("signature flag with empty public key"));
            }
            let signature = if include_signature {
                decoder.read_limited_bytes(MAX_HEADER_SIGNATURE_SIZE)?
            } else {
                Vec::new()
            };
            (pubkey, signature)
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(Self {
            version,
            prev_block,
            merkle_root,
            time,
            base_target: flags & BASE_TARGET_MASK,
            nonce,
            plotter_id,
            space_proof,
            pubkey,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_proof() -> SpaceProof {
        SpaceProof {
            farmer_pubkey: vec![1; 48],
            pool_pubkey: vec![2; 48],
            local_pubkey: vec![3; 48],
            proof: vec![4; 256],
            k: 32,
            signature: vec![5; 96],
            scan_iterations: 7,
        }
    }

    #[test]
    fn well_formed_requires_exact_sizes() {
        let proof = sample_proof();
        assert!(proof.is_well_formed());

        let mut taproot = proof.clone();
        taproot.pool_pubkey = vec![9; 32];
        assert!(taproot.is_well_formed());
        assert!(taproot.is_taproot());

        let mut short_key = proof.clone();
        short_key.farmer_pubkey.pop();
        assert!(!short_key.is_well_formed());

        for k in [31, 51] {
            let mut bad_k = proof.clone();
            bad_k.k = k;
            assert!(!bad_k.is_well_formed());
        }

        let mut negative_scan = proof.clone();
        negative_scan.scan_iterations = -1;
        assert!(!negative_scan.is_well_formed());

        assert!(SpaceProof::default().is_null());
        assert!(!proof.is_null());
    }

    #[test]
    fn flags_word_layout() {
        let mut header = BlockHeader {
            base_target: 0xffff_0000_0000_1234,
            ..BlockHeader::default()
        };
        assert_eq!(header.flags(), 0x1234);
        header.space_proof = Some(sample_proof());
        assert_eq!(header.flags(), 0x4000_0000_0000_1234);
        header.pubkey = vec![2; 33];
        assert_eq!(header.flags(), 0xc000_0000_0000_1234);
    }
}
