//! Named parties.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A participant in a key distribution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    /// Sender.
    Alice,
    /// Receiver.
    Bob,
    /// Eavesdropper.
    Eve,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Alice => write!(f, "Alice"),
            Party::Bob => write!(f, "Bob"),
            Party::Eve => write!(f, "Eve"),
        }
    }
}
