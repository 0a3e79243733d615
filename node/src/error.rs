use std::fmt;

use thiserror::Error;

/// Category of a consensus-rule violation. A block rejected with one of
/// these left no trace in the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleErrorKind {
    DuplicateBlock,
    BadStructure,
    BadProofOfWork,
    CheckpointTimeTooOld,
    DifficultyTooLow,
    BadTimestamp,
    TipsExpired,
}

impl fmt::Display for RuleErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleErrorKind::DuplicateBlock => "duplicate block",
            RuleErrorKind::BadStructure => "malformed block",
            RuleErrorKind::BadProofOfWork => "bad proof of work",
            RuleErrorKind::CheckpointTimeTooOld => "timestamp before checkpoint",
            RuleErrorKind::DifficultyTooLow => "difficulty too low",
            RuleErrorKind::BadTimestamp => "bad timestamp",
            RuleErrorKind::TipsExpired => "tips expired",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RuleError {
    pub kind: RuleErrorKind,
    pub message: String,
}

impl RuleError {
    pub fn new(kind: RuleErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    /// The block breaks a consensus rule. Nothing was mutated.
    #[error("rule violation: {0}")]
    Rule(#[from] RuleError),

    /// The block cannot be placed, e.g. its main parent is unknown. Nothing
    /// was mutated.
    #[error("structural error: {0}")]
    Structural(String),

    /// Persisted state may be inconsistent. The chain has halted.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("chain is shutting down")]
    ShuttingDown,

    #[error("chain halted after a fatal error")]
    Halted,

    #[error("ledger error: {0}")]
    Ledger(#[from] dagchain_ledger::LedgerError),

    #[error("consensus error: {0}")]
    Consensus(#[from] dagchain_consensus::ConsensusError),

    #[error("store error: {0}")]
    Store(#[from] dagchain_store::StoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChainError {
    pub(crate) fn rule(kind: RuleErrorKind, message: impl Into<String>) -> Self {
        ChainError::Rule(RuleError::new(kind, message))
    }

    /// The rule kind, if this is a rule violation.
    pub fn rule_kind(&self) -> Option<RuleErrorKind> {
        match self {
            ChainError::Rule(e) => Some(e.kind),
            _ => None,
        }
    }
}
