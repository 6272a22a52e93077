//! Column-oriented key-value storage used by the chain state.
//!
//! Every column corresponds to one single-byte key prefix of the on-disk
//! namespace. Backends either keep one partition per column or, like
//! [`memory::MemoryStore`], a single sorted keyspace of `prefix ‖ key`.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

pub mod memory;

#[cfg(feature = "fjall")]
pub mod fjall;

#[derive(Debug)]
pub enum StoreError {
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Column {
    /// Unspent coins keyed by output reference.
    Coin,
    BlockFiles,
    BlockIndex,
    /// Named boolean flags.
    Flag,
    /// Singleton records keyed by their [`meta`] tag.
    Meta,
    Balance,
    BindPlotter,
    PointSend,
    PointReceive,
    StakingSend,
    StakingReceive,
    /// Pool list keyed by epoch hash.
    StakingPoolEpoch,
    /// User list keyed by epoch hash and pool id.
    StakingPoolUsers,
}

impl Column {
    pub const ALL: [Column; 13] = [
        Column::Coin,
        Column::BlockFiles,
        Column::BlockIndex,
        Column::Flag,
        Column::Meta,
        Column::Balance,
        Column::BindPlotter,
        Column::PointSend,
        Column::PointReceive,
        Column::StakingSend,
        Column::StakingReceive,
        Column::StakingPoolEpoch,
        Column::StakingPoolUsers,
    ];

    /// Position in [`Column::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn prefix(self) -> u8 {
        match self {
            Column::Coin => b'C',
            Column::BlockFiles => b'f',
            Column::BlockIndex => b'b',
            Column::Flag => b'F',
            Column::Meta => b'M',
            Column::Balance => b'c',
            Column::BindPlotter => b'r',
            Column::PointSend => b'P',
            Column::PointReceive => b'p',
            Column::StakingSend => b'S',
            Column::StakingReceive => b's',
            Column::StakingPoolEpoch => b'T',
            Column::StakingPoolUsers => b't',
        }
    }

    pub fn from_prefix(prefix: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|column| column.prefix() == prefix)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Coin => "coin",
            Column::BlockFiles => "block_files",
            Column::BlockIndex => "block_index",
            Column::Flag => "flag",
            Column::Meta => "meta",
            Column::Balance => "balance_index",
            Column::BindPlotter => "bind_plotter_index",
            Column::PointSend => "point_send_index",
            Column::PointReceive => "point_receive_index",
            Column::StakingSend => "staking_send_index",
            Column::StakingReceive => "staking_receive_index",
            Column::StakingPoolEpoch => "staking_pool_epoch",
            Column::StakingPoolUsers => "staking_pool_users",
        }
    }
}

/// Tags of the singleton records stored in [`Column::Meta`].
pub mod meta {
    pub const BEST_BLOCK: &[u8] = b"B";
    /// In-progress `{new, old}` tip transition.
    pub const HEAD_BLOCKS: &[u8] = b"H";
    pub const REINDEXING: &[u8] = b"R";
    pub const LAST_BLOCK_FILE: &[u8] = b"l";
    pub const INDEX_VERSION: &[u8] = b"V";
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteKey(SmallVec<[u8; 64]>);

impl WriteKey {
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteValue(SmallVec<[u8; 48]>);

impl WriteValue {
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

macro_rules! byte_buffer_conversions {
    ($name:ident) => {
        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.as_slice()
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(value: Vec<u8>) -> Self {
                Self(SmallVec::from_vec(value))
            }
        }

        impl From<&[u8]> for $name {
            fn from(value: &[u8]) -> Self {
                Self(SmallVec::from_slice(value))
            }
        }

        impl<const N: usize> From<[u8; N]> for $name {
            fn from(value: [u8; N]) -> Self {
                Self(SmallVec::from_slice(&value))
            }
        }

        impl<const N: usize> From<&[u8; N]> for $name {
            fn from(value: &[u8; N]) -> Self {
                Self(SmallVec::from_slice(value))
            }
        }
    };
}

byte_buffer_conversions!(WriteKey);
byte_buffer_conversions!(WriteValue);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WriteOp {
    Put {
        column: Column,
        key: WriteKey,
        value: WriteValue,
    },
    Delete {
        column: Column,
        key: WriteKey,
    },
}

impl WriteOp {
    pub fn column(&self) -> Column {
        match self {
            WriteOp::Put { column, .. } | WriteOp::Delete { column, .. } => *column,
        }
    }
}

/// Per-operation bookkeeping counted by [`WriteBatch::size_estimate`].
const OP_OVERHEAD_BYTES: usize = 8;

#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    size_estimate: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.ops.reserve(additional);
    }

    pub fn put(&mut self, column: Column, key: impl Into<WriteKey>, value: impl Into<WriteValue>) {
        let key = key.into();
        let value = value.into();
        self.size_estimate += OP_OVERHEAD_BYTES + 1 + key.as_slice().len() + value.as_slice().len();
        self.ops.push(WriteOp::Put { column, key, value });
    }

    pub fn delete(&mut self, column: Column, key: impl Into<WriteKey>) {
        let key = key.into();
        self.size_estimate += OP_OVERHEAD_BYTES + 1 + key.as_slice().len();
        self.ops.push(WriteOp::Delete { column, key });
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Approximate serialized size, used to split large commits.
    pub fn size_estimate(&self) -> usize {
        self.size_estimate
    }

    pub fn clear(&mut self) {
        self.ops.clear();
        self.size_estimate = 0;
    }

    pub fn append(&mut self, other: &mut WriteBatch) {
        self.size_estimate += other.size_estimate;
        self.ops.append(&mut other.ops);
        other.size_estimate = 0;
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;
pub type PrefixVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<(), StoreError> + 'a;
/// Returns `false` to stop the scan.
pub type RangeVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> Result<bool, StoreError> + 'a;

/// Sorted key-value store. Prefix scans visit keys in ascending order and
/// observe either all or none of any committed batch.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError>;
    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError>;
    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError>;
    /// Visits keys `>= start` in `column` in ascending order until the
    /// visitor returns `false`.
    fn for_each_from<'a>(
        &self,
        column: Column,
        start: &[u8],
        visitor: &mut RangeVisitor<'a>,
    ) -> Result<(), StoreError>;
    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError>;

    fn exists(&self, column: Column, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(column, key)?.is_some())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.as_ref().get(column, key)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.as_ref().put(column, key, value)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.as_ref().delete(column, key)
    }

    fn scan_prefix(&self, column: Column, prefix: &[u8]) -> Result<ScanResult, StoreError> {
        self.as_ref().scan_prefix(column, prefix)
    }

    fn for_each_prefix<'a>(
        &self,
        column: Column,
        prefix: &[u8],
        visitor: &mut PrefixVisitor<'a>,
    ) -> Result<(), StoreError> {
        self.as_ref().for_each_prefix(column, prefix, visitor)
    }

    fn for_each_from<'a>(
        &self,
        column: Column,
        start: &[u8],
        visitor: &mut RangeVisitor<'a>,
    ) -> Result<(), StoreError> {
        self.as_ref().for_each_from(column, start, visitor)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        self.as_ref().write_batch(batch)
    }

    fn exists(&self, column: Column, key: &[u8]) -> Result<bool, StoreError> {
        self.as_ref().exists(column, key)
    }
}
