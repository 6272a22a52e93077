//! Assembling signed space proofs for locally farmed blocks.

use qitd_consensus::Hash256;
use qitd_primitives::SpaceProof;

use crate::bls::{KeyError, PrivateKey, Signature};
use crate::identity::{is_taproot_pool, plot_public_key_for_pool, taproot_private_key};
use crate::verify::create_challenge;

/// Key material of one plot. `pool_key_bytes` is a 48-byte pool public key or
/// a 32-byte pool contract hash.
pub struct PlotKeys {
    pub farmer: PrivateKey,
    pub local: PrivateKey,
    pub pool_key_bytes: Vec<u8>,
}

/// Signs the challenge for `generation_signature` and `scan_iterations` with
/// every share of the plot key and returns the filled proof.
pub fn sign_space_proof(
    keys: &PlotKeys,
    generation_signature: &Hash256,
    scan_iterations: i32,
    k: i32,
    proof: Vec<u8>,
) -> Result<SpaceProof, KeyError> {
    let challenge = create_challenge(generation_signature, scan_iterations);
    let local = keys.local.public_key();
    let farmer = keys.farmer.public_key();
    let plot_key = plot_public_key_for_pool(&local, &farmer, &keys.pool_key_bytes)?;

    let mut shares = vec![
        keys.local.sign_prepend(&challenge, &plot_key),
        keys.farmer.sign_prepend(&challenge, &plot_key),
    ];
    if is_taproot_pool(&keys.pool_key_bytes)? {
        let taproot = taproot_private_key(&local, &farmer)?;
        shares.push(taproot.sign_prepend(&challenge, &plot_key));
    }

    Ok(SpaceProof {
        farmer_pubkey: farmer.to_bytes().to_vec(),
        pool_pubkey: keys.pool_key_bytes.clone(),
        local_pubkey: local.to_bytes().to_vec(),
        proof,
        k,
        signature: Signature::aggregate(&shares).to_bytes().to_vec(),
        scan_iterations,
    })
}
