//! Identifiers for operators and their ports.
//!
//! All three are drawn from one counter inside an `OperatorGraph`, so an id is
//! unique across kinds within a graph and every clone of it.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! graph_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

graph_id!(
    /// An operator node.
    OperatorId,
    "op"
);
graph_id!(
    /// An input port; owned by exactly one operator.
    InputId,
    "in"
);
graph_id!(
    /// An output port; owned by exactly one operator.
    OutputId,
    "out"
);
