//! Tagged Value Cells
//!
//! A `Cell` is the fixed-width tagged record every Sigil value lives in.
//! The layout is deliberately compact and `Copy`:
//!
//! ```text
//! ┌────────┬────────┬──────────┬───────────────┬──────────────────────┐
//! │  kind  │ quotes │  flags   │    binding    │       payload        │
//! │ (1 B)  │ (1 B)  │  (2 B)   │ Option<NodeId>│  inline bits or up   │
//! │        │        │          │               │  to two node ids     │
//! └────────┴────────┴──────────┴───────────────┴──────────────────────┘
//! ```
//!
//! Quoted values share the kind byte of their unquoted payload; the quote
//! depth lives in its own byte so peeling a quote level never allocates.
//!
//! The binding is a weak reference: a node id naming the context the value
//! resolves in. Nothing owns anything through a binding; the collector
//! resolves ids at mark time.

use crate::node::NodeId;
use crate::symbol::SymbolId;
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Index into the runtime's flat dispatcher table.
///
/// The table itself lives in the runtime crate; the core only carries the
/// id inside ACTION! payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchId(pub u16);

/// The kind byte. One entry per datatype the core knows how to carry.
///
/// Values stay below 64 so a typeset is a single `u64` bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Kind {
    /// First-class absence. Never legal inside a user-visible array.
    Nulled = 0,
    Void,
    Blank,
    Bar,
    LitBar,
    Logic,
    Integer,
    Decimal,
    Percent,
    Money,
    Char,
    Pair,
    Tuple,
    Time,
    Date,
    Word,
    SetWord,
    GetWord,
    LitWord,
    Refinement,
    Issue,
    Text,
    File,
    Email,
    Url,
    Tag,
    Binary,
    Bitset,
    Block,
    Group,
    GetGroup,
    SetGroup,
    Path,
    SetPath,
    GetPath,
    LitPath,
    Datatype,
    Typeset,
    Action,
    Context,
    Frame,
    Error,
    Handle,
    /// Internal: a parameter description cell inside an action paramlist.
    Param,
    /// "No value here": array terminator signaling and stale outputs.
    /// Distinct from `Nulled`.
    End,
}

/// Number of kinds (exclusive upper bound of the kind byte).
pub const KIND_MAX: u8 = Kind::End as u8 + 1;

const _: () = assert!(KIND_MAX <= 64, "typesets are u64 bitmasks");

impl Kind {
    /// Bit for this kind inside a typeset mask.
    #[inline]
    pub const fn bit(self) -> u64 {
        1 << (self as u8)
    }

    /// Kinds the evaluator copies to the output unchanged.
    pub fn is_inert(self) -> bool {
        matches!(
            self,
            Kind::Blank
                | Kind::Bar
                | Kind::LitBar
                | Kind::Logic
                | Kind::Integer
                | Kind::Decimal
                | Kind::Percent
                | Kind::Money
                | Kind::Char
                | Kind::Pair
                | Kind::Tuple
                | Kind::Time
                | Kind::Date
                | Kind::Issue
                | Kind::Text
                | Kind::File
                | Kind::Email
                | Kind::Url
                | Kind::Tag
                | Kind::Binary
                | Kind::Bitset
                | Kind::Block
                | Kind::Datatype
                | Kind::Typeset
                | Kind::Handle
                | Kind::Error
        )
    }

    /// WORD!-family kinds (carry a symbol and a binding).
    pub fn is_word(self) -> bool {
        matches!(
            self,
            Kind::Word | Kind::SetWord | Kind::GetWord | Kind::LitWord | Kind::Refinement
        )
    }

    /// Cell-array-backed kinds.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            Kind::Block
                | Kind::Group
                | Kind::GetGroup
                | Kind::SetGroup
                | Kind::Path
                | Kind::SetPath
                | Kind::GetPath
                | Kind::LitPath
        )
    }

    /// PATH!-family kinds.
    pub fn is_path(self) -> bool {
        matches!(
            self,
            Kind::Path | Kind::SetPath | Kind::GetPath | Kind::LitPath
        )
    }

    /// UTF-8-backed series kinds.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            Kind::Text | Kind::File | Kind::Email | Kind::Url | Kind::Tag | Kind::Issue
        )
    }

    /// Any series kind (positional, heap-backed).
    pub fn is_series(self) -> bool {
        self.is_array() || self.is_text() || self == Kind::Binary
    }

    /// Kinds whose binding slot is meaningful.
    pub fn is_bindable(self) -> bool {
        self.is_word() || self.is_array()
    }

    /// The canonical type name, e.g. `block!`.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Nulled => "null",
            Kind::Void => "void!",
            Kind::Blank => "blank!",
            Kind::Bar => "bar!",
            Kind::LitBar => "lit-bar!",
            Kind::Logic => "logic!",
            Kind::Integer => "integer!",
            Kind::Decimal => "decimal!",
            Kind::Percent => "percent!",
            Kind::Money => "money!",
            Kind::Char => "char!",
            Kind::Pair => "pair!",
            Kind::Tuple => "tuple!",
            Kind::Time => "time!",
            Kind::Date => "date!",
            Kind::Word => "word!",
            Kind::SetWord => "set-word!",
            Kind::GetWord => "get-word!",
            Kind::LitWord => "lit-word!",
            Kind::Refinement => "refinement!",
            Kind::Issue => "issue!",
            Kind::Text => "text!",
            Kind::File => "file!",
            Kind::Email => "email!",
            Kind::Url => "url!",
            Kind::Tag => "tag!",
            Kind::Binary => "binary!",
            Kind::Bitset => "bitset!",
            Kind::Block => "block!",
            Kind::Group => "group!",
            Kind::GetGroup => "get-group!",
            Kind::SetGroup => "set-group!",
            Kind::Path => "path!",
            Kind::SetPath => "set-path!",
            Kind::GetPath => "get-path!",
            Kind::LitPath => "lit-path!",
            Kind::Datatype => "datatype!",
            Kind::Typeset => "typeset!",
            Kind::Action => "action!",
            Kind::Context => "object!",
            Kind::Frame => "frame!",
            Kind::Error => "error!",
            Kind::Handle => "handle!",
            Kind::Param => "param!",
            Kind::End => "end!",
        }
    }
}

bitflags! {
    /// Per-cell flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellFlags: u16 {
        /// A line break preceded this value in source.
        const NEWLINE_BEFORE = 1 << 0;
        /// Host-spliced value that should be evaluator-active.
        const EVAL_FLIP = 1 << 1;
        /// The value reached its position without evaluation.
        const UNEVALUATED = 1 << 2;
        /// Output slot not yet written by the current step (invisibles
        /// leave this set).
        const STALE = 1 << 3;
        /// Mutation of this cell's variable slot is refused.
        const PROTECTED = 1 << 4;
        /// ACTION! cells: takes its first argument from the evaluated
        /// expression to the left.
        const ENFIX = 1 << 5;
        /// ACTION! cells: enfix that waits for the full left-hand
        /// expression before running (ELSE/THEN class).
        const DEFER = 1 << 6;
        /// ACTION! cells: evaluates without perturbing the output cell.
        const INVISIBLE = 1 << 7;
        /// ACTION! cells: paramlist carries a RETURN: slot.
        const HAS_RETURN = 1 << 8;
    }
}

/// Parameter conventions for action arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// One full evaluator step fills the argument.
    Normal,
    /// The next feed value is taken literally, no evaluation.
    HardQuote,
    /// Literal, except GROUP!/GET-WORD!/GET-PATH! escape and evaluate.
    SoftQuote,
    /// Refinement slot; fulfilled as LOGIC! plus trailing arguments.
    Refinement,
    /// Function-local; always starts NULLED.
    Local,
    /// RETURN: slot carrying the return typeset.
    Return,
}

/// Payload bits. Either inline immediate data or up to two node ids.
///
/// The collector asks a payload for its node references via
/// [`Cell::payload_nodes`] instead of header bits naming which slots are
/// nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    None,
    Logic(bool),
    Integer(i64),
    Decimal(f64),
    Char(char),
    Pair { x: f64, y: f64 },
    Tuple { len: u8, bytes: [u8; 8] },
    /// Nanoseconds since midnight.
    Time { nanos: i64 },
    Date { year: i16, month: u8, day: u8 },
    Word { symbol: SymbolId },
    /// Any series value: backing node plus a 0-based position.
    Series { node: NodeId, index: u32 },
    Datatype { kind: Kind },
    Typeset { bits: u64 },
    Action { paramlist: NodeId, dispatch: DispatchId },
    Context { varlist: NodeId },
    Error { node: NodeId },
    /// Opaque host handle bits (not a heap reference).
    Handle { code: u64, len: u64 },
    Param { symbol: SymbolId, class: ParamClass, types: u64 },
}

/// The fixed-width tagged value record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    kind: Kind,
    quotes: u8,
    pub flags: CellFlags,
    binding: Option<NodeId>,
    payload: Payload,
}

// Cells are copied constantly; keep the record at or under the 40-byte
// footprint the stack layout assumes.
const _: () = assert!(std::mem::size_of::<Cell>() <= 40, "Cell must stay within 40 bytes");

impl Cell {
    fn raw(kind: Kind, payload: Payload) -> Self {
        Cell {
            kind,
            quotes: 0,
            flags: CellFlags::empty(),
            binding: None,
            payload,
        }
    }

    // ----- constructors ---------------------------------------------------

    pub fn nulled() -> Self {
        Cell::raw(Kind::Nulled, Payload::None)
    }

    pub fn void() -> Self {
        Cell::raw(Kind::Void, Payload::None)
    }

    pub fn blank() -> Self {
        Cell::raw(Kind::Blank, Payload::None)
    }

    pub fn bar() -> Self {
        Cell::raw(Kind::Bar, Payload::None)
    }

    pub fn lit_bar() -> Self {
        Cell::raw(Kind::LitBar, Payload::None)
    }

    /// A stale END: "no value here". The STALE flag comes pre-set so a
    /// fresh output slot reads as untouched.
    pub fn end() -> Self {
        let mut c = Cell::raw(Kind::End, Payload::None);
        c.flags |= CellFlags::STALE;
        c
    }

    pub fn logic(b: bool) -> Self {
        Cell::raw(Kind::Logic, Payload::Logic(b))
    }

    pub fn integer(i: i64) -> Self {
        Cell::raw(Kind::Integer, Payload::Integer(i))
    }

    pub fn decimal(d: f64) -> Self {
        Cell::raw(Kind::Decimal, Payload::Decimal(d))
    }

    pub fn percent(d: f64) -> Self {
        Cell::raw(Kind::Percent, Payload::Decimal(d))
    }

    pub fn money(d: f64) -> Self {
        Cell::raw(Kind::Money, Payload::Decimal(d))
    }

    pub fn char(c: char) -> Self {
        Cell::raw(Kind::Char, Payload::Char(c))
    }

    pub fn pair(x: f64, y: f64) -> Self {
        Cell::raw(Kind::Pair, Payload::Pair { x, y })
    }

    pub fn tuple(parts: &[u8]) -> Self {
        let len = parts.len().min(8);
        let mut bytes = [0u8; 8];
        bytes[..len].copy_from_slice(&parts[..len]);
        Cell::raw(Kind::Tuple, Payload::Tuple { len: len as u8, bytes })
    }

    pub fn time(nanos: i64) -> Self {
        Cell::raw(Kind::Time, Payload::Time { nanos })
    }

    pub fn date(year: i16, month: u8, day: u8) -> Self {
        Cell::raw(Kind::Date, Payload::Date { year, month, day })
    }

    pub fn word_kind(kind: Kind, symbol: SymbolId) -> Self {
        debug_assert!(kind.is_word());
        Cell::raw(kind, Payload::Word { symbol })
    }

    pub fn word(symbol: SymbolId) -> Self {
        Cell::word_kind(Kind::Word, symbol)
    }

    pub fn set_word(symbol: SymbolId) -> Self {
        Cell::word_kind(Kind::SetWord, symbol)
    }

    pub fn get_word(symbol: SymbolId) -> Self {
        Cell::word_kind(Kind::GetWord, symbol)
    }

    pub fn lit_word(symbol: SymbolId) -> Self {
        Cell::word_kind(Kind::LitWord, symbol)
    }

    pub fn refinement(symbol: SymbolId) -> Self {
        Cell::word_kind(Kind::Refinement, symbol)
    }

    pub fn series(kind: Kind, node: NodeId, index: usize) -> Self {
        debug_assert!(kind.is_series() || kind == Kind::Bitset);
        Cell::raw(kind, Payload::Series { node, index: index as u32 })
    }

    pub fn block(node: NodeId) -> Self {
        Cell::series(Kind::Block, node, 0)
    }

    pub fn group(node: NodeId) -> Self {
        Cell::series(Kind::Group, node, 0)
    }

    pub fn text(node: NodeId) -> Self {
        Cell::series(Kind::Text, node, 0)
    }

    pub fn binary(node: NodeId) -> Self {
        Cell::series(Kind::Binary, node, 0)
    }

    pub fn datatype(kind: Kind) -> Self {
        Cell::raw(Kind::Datatype, Payload::Datatype { kind })
    }

    pub fn typeset(bits: u64) -> Self {
        Cell::raw(Kind::Typeset, Payload::Typeset { bits })
    }

    pub fn action(paramlist: NodeId, dispatch: DispatchId) -> Self {
        Cell::raw(Kind::Action, Payload::Action { paramlist, dispatch })
    }

    pub fn context(varlist: NodeId) -> Self {
        Cell::raw(Kind::Context, Payload::Context { varlist })
    }

    pub fn frame(varlist: NodeId) -> Self {
        Cell::raw(Kind::Frame, Payload::Context { varlist })
    }

    pub fn error(node: NodeId) -> Self {
        Cell::raw(Kind::Error, Payload::Error { node })
    }

    pub fn handle(code: u64, len: u64) -> Self {
        Cell::raw(Kind::Handle, Payload::Handle { code, len })
    }

    pub fn param(symbol: SymbolId, class: ParamClass, types: u64) -> Self {
        Cell::raw(Kind::Param, Payload::Param { symbol, class, types })
    }

    // ----- inspection -----------------------------------------------------

    /// The unquoted ("heart") kind. Quote depth does not change this.
    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Quote depth (0 = not quoted).
    #[inline]
    pub fn quotes(&self) -> u8 {
        self.quotes
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.kind == Kind::End
    }

    #[inline]
    pub fn is_nulled(&self) -> bool {
        self.kind == Kind::Nulled && self.quotes == 0
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        self.kind == Kind::Void && self.quotes == 0
    }

    #[inline]
    pub fn is_stale(&self) -> bool {
        self.flags.contains(CellFlags::STALE)
    }

    /// Conditional truth: everything but LOGIC! false, NULLED and BLANK!.
    pub fn is_truthy(&self) -> bool {
        if self.quotes > 0 {
            return true;
        }
        match self.kind {
            Kind::Nulled | Kind::Blank => false,
            Kind::Logic => matches!(self.payload, Payload::Logic(true)),
            _ => true,
        }
    }

    /// The binding (weak context reference), if any.
    #[inline]
    pub fn binding(&self) -> Option<NodeId> {
        self.binding
    }

    pub fn set_binding(&mut self, binding: Option<NodeId>) {
        debug_assert!(binding.is_none() || self.kind.is_bindable());
        self.binding = binding;
    }

    pub fn with_binding(mut self, binding: Option<NodeId>) -> Self {
        self.set_binding(binding);
        self
    }

    // ----- quoting --------------------------------------------------------

    /// Add `n` quote levels. The payload is untouched.
    pub fn quoted(mut self, n: u8) -> Self {
        self.quotes = self.quotes.saturating_add(n);
        self
    }

    /// Remove one quote level, if present.
    pub fn unquoted(mut self) -> Self {
        self.quotes = self.quotes.saturating_sub(1);
        self
    }

    /// View with all quote levels stripped.
    pub fn unescaped(mut self) -> Self {
        self.quotes = 0;
        self
    }

    // ----- typed accessors ------------------------------------------------

    pub fn as_integer(&self) -> Option<i64> {
        match self.payload {
            Payload::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self.payload {
            Payload::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_logic(&self) -> Option<bool> {
        match self.payload {
            Payload::Logic(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self.payload {
            Payload::Char(c) => Some(c),
            _ => None,
        }
    }

    /// Symbol of a WORD!-family or PARAM cell.
    pub fn symbol(&self) -> Option<SymbolId> {
        match self.payload {
            Payload::Word { symbol } => Some(symbol),
            Payload::Param { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    /// Backing node of a series-positioned value.
    pub fn series_node(&self) -> Option<NodeId> {
        match self.payload {
            Payload::Series { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Position of a series value.
    pub fn series_index(&self) -> Option<usize> {
        match self.payload {
            Payload::Series { index, .. } => Some(index as usize),
            _ => None,
        }
    }

    /// Reposition a series value (same backing node).
    pub fn at_index(mut self, index: usize) -> Self {
        if let Payload::Series { node, .. } = self.payload {
            self.payload = Payload::Series { node, index: index as u32 };
        } else {
            debug_assert!(false, "at_index on non-series cell");
        }
        self
    }

    pub fn action_parts(&self) -> Option<(NodeId, DispatchId)> {
        match self.payload {
            Payload::Action { paramlist, dispatch } => Some((paramlist, dispatch)),
            _ => None,
        }
    }

    pub fn context_varlist(&self) -> Option<NodeId> {
        match self.payload {
            Payload::Context { varlist } => Some(varlist),
            _ => None,
        }
    }

    pub fn error_node(&self) -> Option<NodeId> {
        match self.payload {
            Payload::Error { node } => Some(node),
            _ => None,
        }
    }

    pub fn param_parts(&self) -> Option<(SymbolId, ParamClass, u64)> {
        match self.payload {
            Payload::Param { symbol, class, types } => Some((symbol, class, types)),
            _ => None,
        }
    }

    pub fn datatype_kind(&self) -> Option<Kind> {
        match self.payload {
            Payload::Datatype { kind } => Some(kind),
            _ => None,
        }
    }

    pub fn typeset_bits(&self) -> Option<u64> {
        match self.payload {
            Payload::Typeset { bits } => Some(bits),
            _ => None,
        }
    }

    /// Node references owned through this payload, for the mark phase.
    /// The binding is reported separately by [`Cell::binding`].
    pub fn payload_nodes(&self) -> (Option<NodeId>, Option<NodeId>) {
        match self.payload {
            Payload::Series { node, .. } => (Some(node), None),
            Payload::Action { paramlist, .. } => (Some(paramlist), None),
            Payload::Context { varlist } => (Some(varlist), None),
            Payload::Error { node } => (Some(node), None),
            _ => (None, None),
        }
    }
}

/// Typeset masks for common parameter contracts.
pub mod typesets {
    use super::Kind;

    /// Every kind a variable can hold (excludes END and internals).
    pub const ANY_VALUE: u64 = {
        let mut bits = 0u64;
        let mut k = 0u8;
        while k < super::KIND_MAX {
            if k != Kind::End as u8 && k != Kind::Param as u8 && k != Kind::Nulled as u8 {
                bits |= 1 << k;
            }
            k += 1;
        }
        bits
    };

    /// ANY_VALUE plus NULLED (an <opt> parameter).
    pub const OPT_ANY_VALUE: u64 = ANY_VALUE | Kind::Nulled.bit();

    pub const ANY_WORD: u64 = Kind::Word.bit()
        | Kind::SetWord.bit()
        | Kind::GetWord.bit()
        | Kind::LitWord.bit()
        | Kind::Refinement.bit();

    pub const ANY_ARRAY: u64 = Kind::Block.bit()
        | Kind::Group.bit()
        | Kind::GetGroup.bit()
        | Kind::SetGroup.bit()
        | Kind::Path.bit()
        | Kind::SetPath.bit()
        | Kind::GetPath.bit()
        | Kind::LitPath.bit();

    pub const ANY_STRING: u64 = Kind::Text.bit()
        | Kind::File.bit()
        | Kind::Email.bit()
        | Kind::Url.bit()
        | Kind::Tag.bit()
        | Kind::Issue.bit();

    pub const ANY_SERIES: u64 = ANY_ARRAY | ANY_STRING | Kind::Binary.bit();

    pub const ANY_NUMBER: u64 = Kind::Integer.bit() | Kind::Decimal.bit() | Kind::Percent.bit();

    pub const LOGIC: u64 = Kind::Logic.bit();
    pub const BLOCK: u64 = Kind::Block.bit();
    pub const INTEGER: u64 = Kind::Integer.bit();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_depth_shares_kind() {
        let v = Cell::integer(7).quoted(2);
        assert_eq!(v.kind(), Kind::Integer);
        assert_eq!(v.quotes(), 2);
        let once = v.unquoted();
        assert_eq!(once.quotes(), 1);
        assert_eq!(once.as_integer(), Some(7));
        assert_eq!(v.unescaped().quotes(), 0);
    }

    #[test]
    fn test_end_is_distinct_from_nulled() {
        assert!(Cell::end().is_end());
        assert!(!Cell::end().is_nulled());
        assert!(Cell::nulled().is_nulled());
        assert!(Cell::end().is_stale());
    }

    #[test]
    fn test_truthiness() {
        assert!(Cell::integer(0).is_truthy());
        assert!(!Cell::logic(false).is_truthy());
        assert!(!Cell::blank().is_truthy());
        assert!(!Cell::nulled().is_truthy());
        // A quoted false is a value, hence truthy.
        assert!(Cell::logic(false).quoted(1).is_truthy());
    }

    #[test]
    fn test_typeset_masks() {
        assert!(typesets::ANY_VALUE & Kind::Nulled.bit() == 0);
        assert!(typesets::OPT_ANY_VALUE & Kind::Nulled.bit() != 0);
        assert!(typesets::ANY_SERIES & Kind::Block.bit() != 0);
        assert!(typesets::ANY_SERIES & Kind::Integer.bit() == 0);
    }
}
