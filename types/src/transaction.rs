//! Transactions, inputs, outputs and the outpoints that link them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::{Amount, CoinId};
use crate::hash::{blake2b_256, TxHash};

/// Script opcode marking an output as provably unspendable.
pub const OP_RETURN: u8 = 0x6a;

/// Reference to a single output of a previous transaction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: TxHash,
    pub index: u32,
}

impl OutPoint {
    /// The outpoint carried by coinbase inputs.
    pub const NULL: Self = Self {
        hash: TxHash::ZERO,
        index: u32::MAX,
    };

    pub fn new(hash: TxHash, index: u32) -> Self {
        Self { hash, index }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Storage key: the transaction hash followed by the big-endian index,
    /// so all outputs of one transaction are adjacent in key order.
    pub fn to_key(&self) -> [u8; 36] {
        let mut key = [0u8; 36];
        key[..32].copy_from_slice(self.hash.as_bytes());
        key[32..].copy_from_slice(&self.index.to_be_bytes());
        key
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        if key.len() != 36 {
            return None;
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&key[..32]);
        let mut index = [0u8; 4];
        index.copy_from_slice(&key[32..]);
        Some(Self {
            hash: TxHash::new(hash),
            index: u32::from_be_bytes(index),
        })
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutPoint({:?}:{})", self.hash, self.index)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// What a transaction does to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    /// Block reward. Its single input carries [`OutPoint::NULL`].
    Coinbase,
    /// Ordinary spend of primary or token outputs.
    Regular,
    /// Creates a new token. Input 0 designates the token and spends nothing.
    TokenMint,
    /// Token bookkeeping only. No UTXO effects.
    TokenTransfer,
    /// Brings value in from the side chain. No local inputs are spent.
    CrossChainImport,
    /// Executed by the VM service. No UTXO effects.
    CrossChainVm,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub previous_out: OutPoint,
    pub sequence: u32,
    pub signature_script: Vec<u8>,
}

impl TxIn {
    pub fn new(previous_out: OutPoint) -> Self {
        Self {
            previous_out,
            sequence: u32::MAX,
            signature_script: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub amount: Amount,
    pub pk_script: Vec<u8>,
}

impl TxOut {
    pub fn new(amount: Amount, pk_script: Vec<u8>) -> Self {
        Self { amount, pk_script }
    }

    /// Outputs whose script begins with `OP_RETURN` never enter the UTXO set.
    pub fn is_unspendable(&self) -> bool {
        self.pk_script.first() == Some(&OP_RETURN)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub kind: TxKind,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// Content hash over every field of the transaction.
    pub fn hash(&self) -> TxHash {
        let mut buf = Vec::with_capacity(64 + self.inputs.len() * 48 + self.outputs.len() * 40);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.push(self.kind_tag());
        buf.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            buf.extend_from_slice(input.previous_out.hash.as_bytes());
            buf.extend_from_slice(&input.previous_out.index.to_le_bytes());
            buf.extend_from_slice(&input.sequence.to_le_bytes());
            buf.extend_from_slice(&(input.signature_script.len() as u32).to_le_bytes());
            buf.extend_from_slice(&input.signature_script);
        }
        buf.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            buf.extend_from_slice(&output.amount.value.to_le_bytes());
            buf.extend_from_slice(&output.amount.coin.0.to_le_bytes());
            buf.extend_from_slice(&(output.pk_script.len() as u32).to_le_bytes());
            buf.extend_from_slice(&output.pk_script);
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        TxHash::new(blake2b_256(&buf))
    }

    fn kind_tag(&self) -> u8 {
        match self.kind {
            TxKind::Coinbase => 0,
            TxKind::Regular => 1,
            TxKind::TokenMint => 2,
            TxKind::TokenTransfer => 3,
            TxKind::CrossChainImport => 4,
            TxKind::CrossChainVm => 5,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.kind == TxKind::Coinbase
    }

    pub fn is_token_mint(&self) -> bool {
        self.kind == TxKind::TokenMint
    }

    pub fn is_token(&self) -> bool {
        matches!(self.kind, TxKind::TokenMint | TxKind::TokenTransfer)
    }

    pub fn is_import(&self) -> bool {
        self.kind == TxKind::CrossChainImport
    }

    pub fn is_vm(&self) -> bool {
        self.kind == TxKind::CrossChainVm
    }

    /// Whether applying this transaction touches the UTXO set at all.
    pub fn has_utxo_effects(&self) -> bool {
        !matches!(self.kind, TxKind::TokenTransfer | TxKind::CrossChainVm)
    }

    /// Inputs that reference real outputs in the UTXO set.
    pub fn spending_inputs(&self) -> &[TxIn] {
        match self.kind {
            TxKind::Regular => &self.inputs,
            TxKind::TokenMint if !self.inputs.is_empty() => &self.inputs[1..],
            _ => &[],
        }
    }

    /// Total output value in `coin`, saturating.
    pub fn output_value(&self, coin: CoinId) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.amount.coin == coin)
            .fold(0u64, |acc, o| acc.saturating_add(o.amount.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(inputs: usize) -> Transaction {
        Transaction {
            version: 1,
            kind: TxKind::Regular,
            inputs: (0..inputs)
                .map(|i| TxIn::new(OutPoint::new(TxHash::new([i as u8; 32]), 0)))
                .collect(),
            outputs: vec![TxOut::new(Amount::primary(5), vec![0x51])],
            lock_time: 0,
        }
    }

    #[test]
    fn outpoint_key_round_trip() {
        let op = OutPoint::new(TxHash::new([9; 32]), 258);
        assert_eq!(OutPoint::from_key(&op.to_key()), Some(op));
        assert!(OutPoint::from_key(&[0u8; 10]).is_none());
    }

    #[test]
    fn hash_changes_with_kind() {
        let a = regular(1);
        let mut b = a.clone();
        b.kind = TxKind::TokenMint;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn token_mint_skips_designation_input() {
        let mut tx = regular(3);
        tx.kind = TxKind::TokenMint;
        assert_eq!(tx.spending_inputs().len(), 2);
        tx.kind = TxKind::CrossChainImport;
        assert!(tx.spending_inputs().is_empty());
    }

    #[test]
    fn op_return_is_unspendable() {
        assert!(TxOut::new(Amount::primary(0), vec![OP_RETURN, 1]).is_unspendable());
        assert!(!TxOut::new(Amount::primary(0), vec![]).is_unspendable());
    }
}
