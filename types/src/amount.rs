//! Coin-tagged amounts.
//!
//! Every output carries a value in atoms together with the identifier of the
//! coin it is denominated in. The primary coin pays block subsidies and fees;
//! other coins are created by token-mint transactions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the coin an amount is denominated in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct CoinId(pub u16);

impl CoinId {
    /// The native coin of the ledger.
    pub const PRIMARY: Self = Self(0);

    pub fn is_primary(&self) -> bool {
        *self == Self::PRIMARY
    }
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "coin#{}", self.0)
    }
}

/// A value in atoms of a specific coin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Amount {
    pub value: u64,
    pub coin: CoinId,
}

impl Amount {
    pub fn new(value: u64, coin: CoinId) -> Self {
        Self { value, coin }
    }

    /// An amount of the primary coin.
    pub fn primary(value: u64) -> Self {
        Self {
            value,
            coin: CoinId::PRIMARY,
        }
    }

    pub fn zero(coin: CoinId) -> Self {
        Self { value: 0, coin }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Adds two amounts of the same coin. Returns `None` on overflow or coin mismatch.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        if self.coin != other.coin {
            return None;
        }
        self.value.checked_add(other.value).map(|value| Self {
            value,
            coin: self.coin,
        })
    }

    /// Subtracts two amounts of the same coin. Returns `None` on underflow or coin mismatch.
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        if self.coin != other.coin {
            return None;
        }
        self.value.checked_sub(other.value).map(|value| Self {
            value,
            coin: self.coin,
        })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.coin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_add_rejects_mixed_coins() {
        let a = Amount::primary(10);
        let b = Amount::new(5, CoinId(7));
        assert!(a.checked_add(b).is_none());
        assert_eq!(a.checked_add(Amount::primary(5)), Some(Amount::primary(15)));
    }

    #[test]
    fn checked_sub_underflow() {
        assert!(Amount::primary(1).checked_sub(Amount::primary(2)).is_none());
    }
}
