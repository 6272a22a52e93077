use qitd_consensus::{consensus_params, Network};
use qitd_pos::bls::KeyError;
use qitd_pos::identity::{derive_master_key, derive_role_key, farmer_id, KeyRole};
use qitd_pos::submit::{sign_space_proof, PlotKeys};
use qitd_pos::{
    verify_and_update_block_header, verify_block_header, ChainPosition, QualityOracle,
    VerifyResult,
};
use qitd_primitives::{sha256, BlockHeader};

struct HashOracle;

impl QualityOracle for HashOracle {
    fn quality(&self, _plot_id: &[u8; 32], _k: u8, _challenge: &[u8; 32], proof: &[u8]) -> Option<Vec<u8>> {
        Some(sha256(proof).to_vec())
    }
}

struct RejectingOracle;

impl QualityOracle for RejectingOracle {
    fn quality(&self, _: &[u8; 32], _: u8, _: &[u8; 32], _: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

struct ShortOracle;

impl QualityOracle for ShortOracle {
    fn quality(&self, _: &[u8; 32], _: u8, _: &[u8; 32], _: &[u8]) -> Option<Vec<u8>> {
        Some(vec![0u8; 31])
    }
}

struct PanickingOracle;

impl QualityOracle for PanickingOracle {
    fn quality(&self, _: &[u8; 32], _: u8, _: &[u8; 32], _: &[u8]) -> Option<Vec<u8>> {
        panic!("corrupt proof table")
    }
}

fn prev() -> ChainPosition {
    ChainPosition {
        hash: [1u8; 32],
        height: 200,
        base_target: 1_000_000,
        next_generation_signature: [7u8; 32],
    }
}

fn plot_keys(pool_len: usize) -> PlotKeys {
    let master = derive_master_key("farm test").expect("master");
    PlotKeys {
        farmer: derive_role_key(&master, KeyRole::Farmer).expect("farmer"),
        local: derive_role_key(&master, KeyRole::Local).expect("local"),
        pool_key_bytes: if pool_len == 48 {
            derive_role_key(&master, KeyRole::Pool)
                .expect("pool")
                .public_key()
                .to_bytes()
                .to_vec()
        } else {
            vec![0x33; pool_len]
        },
    }
}

fn signed_header(pool_len: usize, k: i32) -> BlockHeader {
    let proof = sign_space_proof(&plot_keys(pool_len), &prev().next_generation_signature, 3, k, vec![0xaa; 64])
        .expect("proof");
    BlockHeader {
        version: 1,
        prev_block: prev().hash,
        base_target: prev().base_target,
        space_proof: Some(proof),
        ..BlockHeader::default()
    }
}

fn completed_header(pool_len: usize) -> BlockHeader {
    let params = consensus_params(Network::Regtest);
    let mut header = signed_header(pool_len, 32);
    assert_eq!(
        verify_and_update_block_header(&prev(), &mut header, &params, &HashOracle),
        VerifyResult::Success
    );
    header
}

#[test]
fn update_mode_stamps_farmer_and_iterations() {
    let header = completed_header(48);
    let proof = header.space_proof.as_ref().expect("proof");
    assert_eq!(header.plotter_id, farmer_id(&proof.farmer_pubkey));
    assert!(header.nonce >= 1);
}

#[test]
fn completed_header_verifies() {
    let params = consensus_params(Network::Regtest);
    for pool_len in [48, 32] {
        let header = completed_header(pool_len);
        assert_eq!(verify_block_header(&prev(), &header, &params, &HashOracle), VerifyResult::Success);
    }
}

#[test]
fn survives_serialization() {
    let params = consensus_params(Network::Regtest);
    let header = completed_header(48);
    let decoded = BlockHeader::consensus_decode(&header.consensus_encode()).expect("decode");
    assert_eq!(verify_block_header(&prev(), &decoded, &params, &HashOracle), VerifyResult::Success);
}

#[test]
fn plot_size_below_minimum_is_malformed() {
    let params = consensus_params(Network::Regtest);
    let mut header = completed_header(48);
    header.space_proof.as_mut().expect("proof").k = 31;
    assert_eq!(
        verify_block_header(&prev(), &header, &params, &PanickingOracle),
        VerifyResult::MalformedInput
    );
}

#[test]
fn missing_proof_or_wrong_farmer_is_malformed() {
    let params = consensus_params(Network::Regtest);
    let mut header = completed_header(48);
    header.plotter_id ^= 1;
    assert_eq!(verify_block_header(&prev(), &header, &params, &HashOracle), VerifyResult::MalformedInput);

    header.space_proof = None;
    assert_eq!(verify_block_header(&prev(), &header, &params, &HashOracle), VerifyResult::MalformedInput);
}

#[test]
fn nonce_must_match_iterations() {
    let params = consensus_params(Network::Regtest);
    let mut header = completed_header(48);
    header.nonce += 1;
    assert_eq!(
        verify_block_header(&prev(), &header, &params, &HashOracle),
        VerifyResult::IterationsMismatch
    );
}

#[test]
fn signature_over_other_challenge_fails() {
    let params = consensus_params(Network::Regtest);
    let mut header = completed_header(48);
    header.space_proof.as_mut().expect("proof").scan_iterations = 4;
    assert_eq!(
        verify_block_header(&prev(), &header, &params, &HashOracle),
        VerifyResult::SignatureInvalid
    );
}

#[test]
fn oracle_failures_are_classified() {
    let params = consensus_params(Network::Regtest);
    let header = completed_header(48);
    assert_eq!(
        verify_block_header(&prev(), &header, &params, &RejectingOracle),
        VerifyResult::QualityInvalid
    );
    assert_eq!(verify_block_header(&prev(), &header, &params, &ShortOracle), VerifyResult::QualityInvalid);
    assert_eq!(
        verify_block_header(&prev(), &header, &params, &PanickingOracle),
        VerifyResult::InternalException
    );
}

#[test]
fn undecodable_key_is_internal_exception() {
    let params = consensus_params(Network::Regtest);
    let mut header = completed_header(48);
    let proof = header.space_proof.as_mut().expect("proof");
    proof.local_pubkey = vec![0x11; 48];
    assert_eq!(
        verify_block_header(&prev(), &header, &params, &HashOracle),
        VerifyResult::InternalException
    );
}

#[test]
fn zero_previous_base_target_is_internal_exception() {
    let params = consensus_params(Network::Regtest);
    let header = completed_header(48);
    let position = ChainPosition { base_target: 0, ..prev() };
    assert_eq!(
        verify_block_header(&position, &header, &params, &HashOracle),
        VerifyResult::InternalException
    );
}

#[test]
fn plot_filter_applies_with_network_bits() {
    let mut params = consensus_params(Network::Regtest);
    params.plot_filter_bits = 31;
    let header = completed_header(48);
    assert_eq!(
        verify_block_header(&prev(), &header, &params, &HashOracle),
        VerifyResult::PlotFilterRejected
    );
}

#[test]
fn proof_construction_rejects_odd_pool_field() {
    for pool_len in [0, 31, 40, 64] {
        assert!(matches!(
            sign_space_proof(&plot_keys(pool_len), &prev().next_generation_signature, 3, 32, vec![0xaa; 64]),
            Err(KeyError::InvalidLength { actual, .. }) if actual == pool_len
        ));
    }
}
