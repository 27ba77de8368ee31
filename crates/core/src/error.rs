//! Error taxonomy
//!
//! Interpreter errors are first-class values: an ERROR! cell points at a
//! heap node whose storage is an [`ErrorData`]. The taxonomy itself is a
//! plain enum so the core and runtime crates can construct and match on
//! errors without going through the heap.
//!
//! `where_` is the nearest-call-chain extract (action labels, innermost
//! first) and `near` is a short source snippet with a marker at the fault
//! point. Both are attached when an error is raised, not at construction.

use thiserror::Error;

/// Every error the core can raise, by taxonomy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // -- syntax ----------------------------------------------------------
    #[error("invalid {token} -- {text} (line {line})")]
    Syntax {
        /// Scanner token name, e.g. "integer" or "string".
        token: &'static str,
        /// Byte range of the offending token in the source fragment.
        start: usize,
        end: usize,
        line: usize,
        /// Full text of the line the error occurred on.
        text: String,
    },
    #[error("missing closing {close} (opened on line {line})")]
    MissingClose { close: char, line: usize },
    #[error("unexpected closing {close}")]
    ExtraClose { close: char },
    #[error("expected {open}...{expected}, found {found} (opened on line {line})")]
    MismatchedClose {
        open: char,
        expected: char,
        found: char,
        line: usize,
    },

    // -- binding ---------------------------------------------------------
    #[error("{word} has no value")]
    NoValue { word: String },
    #[error("{word} is not bound to a context")]
    NotBound { word: String },
    #[error("{word} does not look up to an action")]
    NotAnAction { word: String },

    // -- type ------------------------------------------------------------
    #[error("{action} does not allow {found} for its {param} argument")]
    ArgType {
        action: String,
        param: String,
        found: String,
    },
    #[error("{action} returned {found}, outside its return typeset")]
    ReturnType { action: String, found: String },
    #[error("{action} is missing its {param} argument")]
    NoArg { action: String, param: String },
    #[error("{target} needs a value")]
    NeedsValue { target: String },
    #[error("{action} has no refinement called {name}")]
    BadRefinement { action: String, name: String },
    #[error("cannot {op} a {kind} value")]
    CannotUse { op: &'static str, kind: &'static str },
    #[error("path picking not allowed on {kind}")]
    BadPathPick { kind: &'static str },

    // -- range -----------------------------------------------------------
    #[error("value out of range: {what}")]
    OutOfRange { what: String },
    #[error("series index out of range")]
    IndexOutOfRange,

    // -- read-only / access ----------------------------------------------
    #[error("series is protected from modification")]
    Protected,
    #[error("series is held for iteration; modification not allowed")]
    Held,
    #[error("series data is no longer accessible")]
    Inaccessible,

    // -- parse -----------------------------------------------------------
    #[error("PARSE: unrecognized rule: {rule}")]
    ParseRule { rule: String },
    #[error("PARSE: variable expected after {command}")]
    ParseVariable { command: String },
    #[error("PARSE: command expected, found {rule}")]
    ParseCommand { rule: String },
    #[error("PARSE: input must be a series")]
    ParseSeries,
    #[error("PARSE: {command} requires an array input")]
    ParseArrayRequired { command: &'static str },

    // -- math ------------------------------------------------------------
    #[error("math or number overflow")]
    Overflow,
    #[error("attempt to divide by zero")]
    DivideByZero,

    // -- out of resource -------------------------------------------------
    #[error("evaluation nested too deeply, stack overflow")]
    StackOverflow,
    #[error("out of memory for node pool")]
    NoMemory,

    // -- control escapes -------------------------------------------------
    #[error("no CATCH for THROW labeled {label}")]
    NoCatch { label: String },
    #[error("halted by request")]
    Halt,

    // -- user ------------------------------------------------------------
    #[error("{message}")]
    User { message: String },
}

impl ErrorKind {
    /// True for errors that should not be caught by ordinary traps
    /// (a halt unwinds to the host).
    pub fn is_halt(&self) -> bool {
        matches!(self, ErrorKind::Halt)
    }
}

/// The storage behind an ERROR! value.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorData {
    pub kind: ErrorKind,
    /// Call-chain labels at raise time, innermost first.
    pub where_: Vec<String>,
    /// Source snippet around the fault point.
    pub near: Option<String>,
}

impl ErrorData {
    pub fn new(kind: ErrorKind) -> Self {
        ErrorData {
            kind,
            where_: Vec::new(),
            near: None,
        }
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = ErrorKind::NoValue { word: "foo".into() };
        assert_eq!(e.to_string(), "foo has no value");
        let e = ErrorKind::DivideByZero;
        assert_eq!(e.to_string(), "attempt to divide by zero");
    }

    #[test]
    fn test_halt_is_special() {
        assert!(ErrorKind::Halt.is_halt());
        assert!(!ErrorKind::Overflow.is_halt());
    }
}
