//! Proof-of-space and legacy proof-of-capacity verification.

pub mod bls;
pub mod identity;
pub mod legacy;
pub mod nonce;
pub mod submit;
pub mod verify;

pub use bls::{KeyError, PrivateKey, PublicKey, Signature};
pub use verify::{
    create_challenge, passes_plot_filter, required_iterations, verify_and_update_block_header,
    verify_block_header, ChainPosition, QualityOracle, VerifyResult,
};
