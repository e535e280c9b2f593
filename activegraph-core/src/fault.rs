//! Error kinds (spec §7). A fault is a node's alternate resting state: when
//! present, the node's `value` is its declared type's default (§3 invariant
//! 1). The teacher hand-rolls small error enums rather than reaching for
//! `thiserror`; this follows suit.

use arcstr::ArcStr;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// An instance member was accessed through a null target.
    NullTarget { member: ArcStr },
    /// The input expression shape is not one of the node kinds the engine
    /// accepts (C1).
    NotSupportedExpression { reason: ArcStr },
    /// An operator or rendering helper was asked about an operator it does
    /// not know.
    ArgumentOutOfRange { operator: ArcStr },
    /// A caller-supplied accessor (getter, method, constructor) raised an
    /// error when invoked.
    Reflection { message: ArcStr },
    /// A user-supplied `Coalesce` conversion raised an error.
    Conversion { message: ArcStr },
    /// A checked arithmetic operator overflowed, divided by zero, or
    /// otherwise could not produce a result.
    Operator { message: ArcStr },
}

impl Fault {
    /// The bracket-format label C9 rendering uses for a faulted
    /// subexpression (`[ErrorKind: message]`, §6).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Fault::NullTarget { .. } => "NullTarget",
            Fault::NotSupportedExpression { .. } => "NotSupportedExpression",
            Fault::ArgumentOutOfRange { .. } => "ArgumentOutOfRange",
            Fault::Reflection { .. } => "Reflection",
            Fault::Conversion { .. } => "Conversion",
            Fault::Operator { .. } => "Operator",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::NullTarget { member } => write!(f, "null target for member {member}"),
            Fault::NotSupportedExpression { reason } => {
                write!(f, "expression shape not supported: {reason}")
            }
            Fault::ArgumentOutOfRange { operator } => {
                write!(f, "argument out of range for operator {operator}")
            }
            Fault::Reflection { message } => write!(f, "{message}"),
            Fault::Conversion { message } => write!(f, "conversion error: {message}"),
            Fault::Operator { message } => write!(f, "operator error: {message}"),
        }
    }
}

impl std::error::Error for Fault {}
