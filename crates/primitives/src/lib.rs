//! Core header/output types, hashing, and consensus serialization.

pub mod account;
pub mod block;
pub mod encoding;
pub mod hash;
pub mod outpoint;
pub mod transaction;

pub use account::{account_id_from_script, p2sh_script, ACCOUNT_ID_SIZE};
pub use block::{BlockHeader, SpaceProof};
pub use hash::{hash160, sha256, sha256_concat, sha256d};
pub use outpoint::OutPoint;
pub use transaction::TxOut;
