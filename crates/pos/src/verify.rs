//! Proof-of-space header verification.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use qitd_consensus::constants::{INITIAL_BASE_TARGET, MAX_PLOT_FILTER_BITS};
use qitd_consensus::{ConsensusParams, Hash256};
use qitd_primitives::{sha256_concat, BlockHeader, SpaceProof};

use crate::bls::{PublicKey, Signature};
use crate::identity::{farmer_id, plot_id, plot_public_key_for_pool};

mod wide {
    #![allow(clippy::all)]
    uint::construct_uint! {
        pub struct U1024(16);
    }
}

use wide::U1024;

pub const QUALITY_SIZE: usize = 32;

/// The parts of the previous block the verifier reads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainPosition {
    pub hash: Hash256,
    pub height: i32,
    pub base_target: u64,
    pub next_generation_signature: Hash256,
}

/// External proof-of-space validation. Returns the proof quality, or `None`
/// when the proof does not verify for the given plot and challenge.
pub trait QualityOracle: Send + Sync {
    fn quality(&self, plot_id: &Hash256, k: u8, challenge: &Hash256, proof: &[u8]) -> Option<Vec<u8>>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerifyResult {
    Success,
    MalformedInput,
    PlotFilterRejected,
    QualityInvalid,
    SignatureInvalid,
    IterationsMismatch,
    InternalException,
}

impl VerifyResult {
    pub fn as_str(self) -> &'static str {
        match self {
            VerifyResult::Success => "success",
            VerifyResult::MalformedInput => "error",
            VerifyResult::PlotFilterRejected => "error-plotfilters",
            VerifyResult::QualityInvalid => "error-PoS",
            VerifyResult::SignatureInvalid => "error-BLS",
            VerifyResult::IterationsMismatch => "error-iterations",
            VerifyResult::InternalException => "error-exception",
        }
    }

    pub fn is_success(self) -> bool {
        self == VerifyResult::Success
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn create_challenge(generation_signature: &Hash256, scan_iterations: i32) -> Hash256 {
    let iterations = (scan_iterations as i64 as u64).to_be_bytes();
    sha256_concat(&[generation_signature, &iterations])
}

/// Panics when `filter_bits` exceeds 31; that is a parameter error, not bad input.
pub fn passes_plot_filter(plot_id: &Hash256, challenge: &Hash256, filter_bits: u32) -> bool {
    assert!(
        filter_bits <= MAX_PLOT_FILTER_BITS,
        "plot filter bits {filter_bits} out of range"
    );
    if filter_bits == 0 {
        return true;
    }
    let digest = sha256_concat(&[plot_id, challenge]);
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix >> (32 - filter_bits) == 0
}

fn expected_plot_size(k: u8) -> U1024 {
    let k = u64::from(k);
    U1024::from(2 * k + 1) * U1024::from(2u8).pow(U1024::from(k - 1))
}

/// Iterations required for `quality` at `challenge`, never zero. `None` when
/// `prev_base_target` is zero.
pub fn required_iterations(
    prev_base_target: u64,
    quality: &[u8; QUALITY_SIZE],
    challenge: &Hash256,
    k: u8,
) -> Option<u64> {
    if prev_base_target == 0 || k == 0 {
        return None;
    }
    let difficulty = U1024::from(INITIAL_BASE_TARGET / prev_base_target);
    let quality_hash = U1024::from_big_endian(&sha256_concat(&[quality, challenge]));
    let two = U1024::from(2u8);

    let numerator = difficulty * two.pow(U1024::from(67u8)) * quality_hash;
    let denominator = two.pow(U1024::from(256u16)) * expected_plot_size(k);
    let iterations = (numerator / denominator).low_u64();
    Some(iterations.max(1))
}

fn well_formed(header: &BlockHeader) -> Option<&SpaceProof> {
    header
        .space_proof
        .as_ref()
        .filter(|proof| !proof.is_null() && proof.is_well_formed())
}

/// Steps shared by both verification modes, from challenge to iterations.
pub fn verify_and_get_iterations(
    prev: &ChainPosition,
    proof: &SpaceProof,
    params: &ConsensusParams,
    oracle: &dyn QualityOracle,
) -> Result<u64, VerifyResult> {
    if !proof.is_well_formed() {
        return Err(VerifyResult::MalformedInput);
    }
    let challenge = create_challenge(&prev.next_generation_signature, proof.scan_iterations);

    let local = PublicKey::from_bytes(&proof.local_pubkey).map_err(|_| VerifyResult::InternalException)?;
    let farmer = PublicKey::from_bytes(&proof.farmer_pubkey).map_err(|_| VerifyResult::InternalException)?;
    let plot_key = plot_public_key_for_pool(&local, &farmer, &proof.pool_pubkey)
        .map_err(|_| VerifyResult::InternalException)?;
    let plot = plot_id(&proof.pool_pubkey, &plot_key);

    if !passes_plot_filter(&plot, &challenge, params.plot_filter_bits) {
        return Err(VerifyResult::PlotFilterRejected);
    }

    let signature = Signature::from_bytes(&proof.signature).map_err(|_| VerifyResult::InternalException)?;
    if !plot_key.verify(&challenge, &signature) {
        return Err(VerifyResult::SignatureInvalid);
    }

    let k = proof.k as u8;
    let quality = catch_unwind(AssertUnwindSafe(|| {
        oracle.quality(&plot, k, &challenge, &proof.proof)
    }))
    .map_err(|_| {
        qitd_log::log_warn!("quality oracle panicked for plot {}", hex_prefix(&plot));
        VerifyResult::InternalException
    })?;
    let quality: [u8; QUALITY_SIZE] = quality
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(VerifyResult::QualityInvalid)?;

    required_iterations(prev.base_target, &quality, &challenge, k).ok_or(VerifyResult::InternalException)
}

fn hex_prefix(hash: &Hash256) -> String {
    hash[..8].iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn verify_block_header(
    prev: &ChainPosition,
    header: &BlockHeader,
    params: &ConsensusParams,
    oracle: &dyn QualityOracle,
) -> VerifyResult {
    let Some(proof) = well_formed(header) else {
        return VerifyResult::MalformedInput;
    };
    if header.plotter_id != farmer_id(&proof.farmer_pubkey) {
        return VerifyResult::MalformedInput;
    }
    match verify_and_get_iterations(prev, proof, params, oracle) {
        Ok(iterations) if iterations == header.nonce => VerifyResult::Success,
        Ok(iterations) => {
            qitd_log::log_debug!(
                "space proof iterations mismatch: header {} computed {}",
                header.nonce,
                iterations
            );
            VerifyResult::IterationsMismatch
        }
        Err(result) => result,
    }
}

/// Verifies a locally assembled header and, on success, stamps the farmer id
/// and required iterations into it.
pub fn verify_and_update_block_header(
    prev: &ChainPosition,
    header: &mut BlockHeader,
    params: &ConsensusParams,
    oracle: &dyn QualityOracle,
) -> VerifyResult {
    let Some(proof) = well_formed(header) else {
        return VerifyResult::MalformedInput;
    };
    let farmer = farmer_id(&proof.farmer_pubkey);
    match verify_and_get_iterations(prev, proof, params, oracle) {
        Ok(iterations) => {
            header.plotter_id = farmer;
            header.nonce = iterations;
            VerifyResult::Success
        }
        Err(result) => result,
    }
}
