//! Sigil Runtime: scanner, evaluator, PARSE and collector
//!
//! The interpreter proper, built on the `sigil-core` value model. An
//! [`Interp`] owns every piece of state the original implementation kept
//! in globals; hosts construct one, feed it source or variadic item
//! streams, and shut it down explicitly.
//!
//! ```ignore
//! let mut interp = Interp::new(InterpConfig::default());
//! let nine = interp.do_source("1 + 2 * 3")?;   // left to right: 9
//! interp.shutdown();
//! ```
//!
//! # Modules
//!
//! - `config`: interpreter tunables (pool sizes, level limit, ballast)
//! - `scanner`: UTF-8 source -> value cells, resumable across fragments
//! - `feed`: the "next values" abstraction over arrays and host items
//! - `frame`: evaluation levels and action call frames
//! - `eval`: the single-step expression engine (enfix, invisibles)
//! - `action`: paramlists, argument fulfillment, dispatch
//! - `path`: path traversal, picking and poking
//! - `natives`: the boot native set
//! - `parse`: the PARSE rule interpreter
//! - `gc`: mark-and-sweep collection
//! - `api`: variadic host entry, handles, buffers, rescue

pub mod action;
pub mod api;
pub mod config;
pub mod eval;
pub mod feed;
pub mod frame;
pub mod gc;
pub mod interp;
pub mod natives;
pub mod parse;
pub mod path;
pub mod scanner;

pub use api::ValueHandle;
pub use config::InterpConfig;
pub use feed::VaItem;
pub use interp::{Interp, InterpStats, Signals};
pub use scanner::scan_header;

// Core value model, re-exported for hosts.
pub use sigil_core::{
    Cell, CellFlags, ErrorData, ErrorKind, Heap, HeapStats, Kind, NodeId, SymbolId,
};
