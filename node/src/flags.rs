//! Per-call modifiers of block processing.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BehaviorFlags(u32);

impl BehaviorFlags {
    pub const NONE: Self = Self(0);
    /// Skip the expensive checks: checkpoints, context and connect
    /// validation. Used for trusted input such as block-batch imports.
    pub const FAST_ADD: Self = Self(1 << 0);
    /// The block came from a peer.
    pub const P2P_ADD: Self = Self(1 << 1);
    /// The block was submitted locally; its parents must still be tips.
    pub const RPC_ADD: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_fast_add(self) -> bool {
        self.contains(Self::FAST_ADD)
    }

    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for BehaviorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BehaviorFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for BehaviorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::FAST_ADD) {
            names.push("FAST_ADD");
        }
        if self.contains(Self::P2P_ADD) {
            names.push("P2P_ADD");
        }
        if self.contains(Self::RPC_ADD) {
            names.push("RPC_ADD");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "BehaviorFlags({})", names.join("|"))
    }
}
