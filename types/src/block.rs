//! Blocks of the DAG ledger and the hash that identifies them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TypesError;
use crate::hash::{blake2b_256, TxHash};
use crate::time::Timestamp;
use crate::transaction::Transaction;

/// A 32-byte block hash identifying a block in the DAG.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl Default for BlockHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Lower-case hex, used for textual storage keys.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({}\u{2026})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Every parent this block references. Order is not significant to consensus.
    pub parents: Vec<BlockHash>,
    /// Commitment to the transaction list, see [`Block::compute_tx_root`].
    pub tx_root: [u8; 32],
    pub timestamp: Timestamp,
    /// Compact difficulty target.
    pub difficulty: u32,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> BlockHash {
        let mut buf = Vec::with_capacity(64 + self.parents.len() * 32);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&(self.parents.len() as u32).to_le_bytes());
        for parent in &self.parents {
            buf.extend_from_slice(parent.as_bytes());
        }
        buf.extend_from_slice(&self.tx_root);
        buf.extend_from_slice(&self.timestamp.as_secs().to_le_bytes());
        buf.extend_from_slice(&self.difficulty.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        BlockHash::new(blake2b_256(&buf))
    }
}

/// An immutable block: header plus transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn parents(&self) -> &[BlockHash] {
        &self.header.parents
    }

    pub fn timestamp(&self) -> Timestamp {
        self.header.timestamp
    }

    /// Blake2b over the concatenated transaction hashes.
    pub fn compute_tx_root(transactions: &[Transaction]) -> [u8; 32] {
        let mut buf = Vec::with_capacity(transactions.len() * 32);
        for tx in transactions {
            buf.extend_from_slice(tx.hash().as_bytes());
        }
        blake2b_256(&buf)
    }

    pub fn tx_hashes(&self) -> Vec<TxHash> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        bincode::serialize(self).map_err(|e| TypesError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        bincode::deserialize(bytes).map_err(|e| TypesError::Serialization(e.to_string()))
    }

    /// Serialized size in bytes.
    pub fn serialized_size(&self) -> Result<u64, TypesError> {
        bincode::serialized_size(self).map_err(|e| TypesError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::transaction::{OutPoint, TxIn, TxKind, TxOut};

    fn sample_block() -> Block {
        let coinbase = Transaction {
            version: 1,
            kind: TxKind::Coinbase,
            inputs: vec![TxIn::new(OutPoint::NULL)],
            outputs: vec![TxOut::new(Amount::primary(50), vec![0x51])],
            lock_time: 0,
        };
        let transactions = vec![coinbase];
        Block {
            header: BlockHeader {
                version: 1,
                parents: vec![BlockHash::new([1; 32])],
                tx_root: Block::compute_tx_root(&transactions),
                timestamp: Timestamp::new(1_000),
                difficulty: 0x207fffff,
                nonce: 0,
            },
            transactions,
        }
    }

    #[test]
    fn nonce_changes_hash() {
        let a = sample_block();
        let mut b = a.clone();
        b.header.nonce = 1;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn bytes_round_trip_preserves_hash() {
        let block = sample_block();
        let bytes = block.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, block.serialized_size().unwrap());
        let decoded = Block::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(Block::from_bytes(&[0xff, 0x01]).is_err());
    }

    #[test]
    fn debug_is_abbreviated() {
        let dbg = format!("{:?}", BlockHash::new([0xab; 32]));
        assert_eq!(dbg, "BlockHash(abababab\u{2026})");
    }
}
