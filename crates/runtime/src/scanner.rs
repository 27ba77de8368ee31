//! Lexical Scanner
//!
//! Turns UTF-8 source into value cells. Values are materialized onto the
//! data stack as they complete; closing brackets pop the accumulated span
//! into a new array. A [`ScanSession`] keeps the open-bracket state, so a
//! variadic host feed can interleave text fragments with spliced cells
//! and still open a block in one fragment and close it in another.
//!
//! Tokenizing is table-driven: a 256-entry class table maps each byte to
//! WORD, NUMBER, DELIMIT or SPECIAL (hex digit values ride in the low
//! bits of the digit entries). A prescan walks to the next delimiter
//! accumulating a fingerprint bitmask of the SPECIAL subclasses seen
//! after the first character; the fingerprint plus the first character's
//! class decide the token kind without a second pass in the common case.
//!
//! Paths are discovered retroactively: when the byte after a finished
//! token is `/`, that token is stolen as the path's head. A GET-WORD!,
//! SET-WORD! or LIT-WORD! head promotes the whole path to GET-PATH!,
//! SET-PATH! or LIT-PATH!, with the head demoted to a plain WORD!.

use crate::interp::{Abort, Interp, Outcome};
use sigil_core::{
    Cell, CellFlags, ErrorKind, Kind, NodeId, SeriesData, SeriesFlags, month_number,
};
use tracing::debug;

// ---------------------------------------------------------------------------
// Lexical classes
// ---------------------------------------------------------------------------

/// Class bits (high two bits of a table entry).
const CLASS_ILLEGAL: u8 = 0x00;
const CLASS_WORD: u8 = 0x40;
const CLASS_NUMBER: u8 = 0x80;
const CLASS_DELIMIT: u8 = 0xC0;
const CLASS_MASK: u8 = 0xC0;
/// SPECIAL is a WORD-class refinement: the low bits carry a fingerprint
/// subclass instead of a hex value.
const FLAG_SPECIAL: u8 = 0x20;

// Delimiter subclasses.
const DELIM_SPACE: u8 = 0;
const DELIM_LINEFEED: u8 = 1;
const DELIM_RETURN: u8 = 2;
const DELIM_LEFT_PAREN: u8 = 3;
const DELIM_RIGHT_PAREN: u8 = 4;
const DELIM_LEFT_BRACKET: u8 = 5;
const DELIM_RIGHT_BRACKET: u8 = 6;
const DELIM_LEFT_BRACE: u8 = 7;
const DELIM_RIGHT_BRACE: u8 = 8;
const DELIM_DOUBLE_QUOTE: u8 = 9;
const DELIM_SEMICOLON: u8 = 10;
const DELIM_SLASH: u8 = 11;

// Special subclasses; fingerprint bits are `1 << subclass`.
const SPECIAL_AT: u8 = 0;
const SPECIAL_PERCENT: u8 = 1;
const SPECIAL_COLON: u8 = 2;
const SPECIAL_APOSTROPHE: u8 = 3;
const SPECIAL_COMMA: u8 = 4;
const SPECIAL_DOLLAR: u8 = 5;
const SPECIAL_GREATER: u8 = 6;
const SPECIAL_LESSER: u8 = 7;
const SPECIAL_PLUS: u8 = 8;
const SPECIAL_MINUS: u8 = 9;
const SPECIAL_PERIOD: u8 = 10;
const SPECIAL_POUND: u8 = 11;
const SPECIAL_BAR: u8 = 12;
const SPECIAL_BACKSLASH: u8 = 13;

const fn special(sub: u8) -> u8 {
    CLASS_WORD | FLAG_SPECIAL | sub
}

/// Build the 256-entry class table.
const fn build_lex_map() -> [u8; 256] {
    let mut map = [CLASS_ILLEGAL; 256];
    let mut b = 0usize;
    while b < 256 {
        let byte = b as u8;
        map[b] = match byte {
            b' ' | b'\t' => CLASS_DELIMIT | DELIM_SPACE,
            b'\n' => CLASS_DELIMIT | DELIM_LINEFEED,
            b'\r' => CLASS_DELIMIT | DELIM_RETURN,
            b'(' => CLASS_DELIMIT | DELIM_LEFT_PAREN,
            b')' => CLASS_DELIMIT | DELIM_RIGHT_PAREN,
            b'[' => CLASS_DELIMIT | DELIM_LEFT_BRACKET,
            b']' => CLASS_DELIMIT | DELIM_RIGHT_BRACKET,
            b'{' => CLASS_DELIMIT | DELIM_LEFT_BRACE,
            b'}' => CLASS_DELIMIT | DELIM_RIGHT_BRACE,
            b'"' => CLASS_DELIMIT | DELIM_DOUBLE_QUOTE,
            b';' => CLASS_DELIMIT | DELIM_SEMICOLON,
            b'/' => CLASS_DELIMIT | DELIM_SLASH,
            b'@' => special(SPECIAL_AT),
            b'%' => special(SPECIAL_PERCENT),
            b':' => special(SPECIAL_COLON),
            b'\'' => special(SPECIAL_APOSTROPHE),
            b',' => special(SPECIAL_COMMA),
            b'$' => special(SPECIAL_DOLLAR),
            b'>' => special(SPECIAL_GREATER),
            b'<' => special(SPECIAL_LESSER),
            b'+' => special(SPECIAL_PLUS),
            b'-' => special(SPECIAL_MINUS),
            b'.' => special(SPECIAL_PERIOD),
            b'#' => special(SPECIAL_POUND),
            b'|' => special(SPECIAL_BAR),
            b'\\' => special(SPECIAL_BACKSLASH),
            b'0'..=b'9' => CLASS_NUMBER | (byte - b'0'),
            b'A'..=b'F' => CLASS_WORD | (byte - b'A' + 10),
            b'a'..=b'f' => CLASS_WORD | (byte - b'a' + 10),
            b'G'..=b'Z' | b'g'..=b'z' => CLASS_WORD,
            b'_' | b'=' | b'?' | b'!' | b'*' | b'&' | b'^' | b'~' | b'`' => CLASS_WORD,
            // UTF-8 lead and continuation bytes scan as word characters;
            // the input is already validated UTF-8.
            0x80..=0xFF => CLASS_WORD,
            _ => CLASS_ILLEGAL,
        };
        b += 1;
    }
    map
}

static LEX_MAP: [u8; 256] = build_lex_map();

#[inline]
fn lex_class(byte: u8) -> u8 {
    LEX_MAP[byte as usize] & CLASS_MASK
}

#[inline]
fn is_delimiter(byte: u8) -> bool {
    lex_class(byte) == CLASS_DELIMIT
}

/// Hex digit value from the class table's low bits.
fn hex_value(byte: u8) -> Option<u8> {
    let entry = LEX_MAP[byte as usize];
    match entry & CLASS_MASK {
        CLASS_NUMBER => Some(entry & 0x0F),
        CLASS_WORD if entry & FLAG_SPECIAL == 0 && (entry & 0x1F) >= 10 => Some(entry & 0x0F),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Sessions and state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenKind {
    Block,
    Group,
    GetGroup,
    Construct,
}

/// One open bracket awaiting its closer.
#[derive(Debug)]
struct OpenMode {
    kind: OpenKind,
    /// Data stack mark; the span above it becomes the array contents.
    dsp: usize,
    /// Line the opener appeared on (reported if never closed).
    line: usize,
    /// Quote levels from an apostrophe prefix on the opener.
    quotes: u8,
    /// NEWLINE_BEFORE pending for the finished array value.
    newline_before: bool,
}

impl OpenKind {
    fn opener(&self) -> char {
        match self {
            OpenKind::Block => '[',
            OpenKind::Group | OpenKind::GetGroup => '(',
            OpenKind::Construct => '[',
        }
    }

    fn closer(&self) -> char {
        match self {
            OpenKind::Block | OpenKind::Construct => ']',
            OpenKind::Group | OpenKind::GetGroup => ')',
        }
    }
}

/// Resumable scan state: everything that must survive a fragment
/// boundary in a variadic feed.
#[derive(Debug)]
pub struct ScanSession {
    /// Data stack mark; completed top-level values accumulate above it.
    pub dsp_base: usize,
    modes: Vec<OpenMode>,
    /// Running line number across fragments (1-based).
    pub line: usize,
    /// Emit ERROR! values instead of aborting the scan.
    pub relax: bool,
    /// A line break was seen since the last value.
    pending_newline: bool,
}

impl ScanSession {
    pub fn new(dsp_base: usize, relax: bool) -> Self {
        ScanSession {
            dsp_base,
            modes: Vec::new(),
            line: 1,
            relax,
            pending_newline: false,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.modes.is_empty()
    }
}

/// Per-fragment cursor.
struct ScanState<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Byte offset where the current line starts.
    line_start: usize,
}

impl<'a> ScanState<'a> {
    fn new(src: &'a str) -> Self {
        ScanState {
            bytes: src.as_bytes(),
            pos: 0,
            line_start: 0,
        }
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    #[inline]
    fn byte(&self) -> u8 {
        self.bytes[self.pos]
    }

    #[inline]
    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        // Slicing is on ASCII boundaries only; the source is valid UTF-8.
        std::str::from_utf8(&self.bytes[start..end]).unwrap_or("")
    }

    /// Text of the line containing `at`.
    fn line_text(&self, at: usize) -> String {
        let start = self.line_start.min(self.bytes.len());
        let end = self.bytes[at.min(self.bytes.len())..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| at + i)
            .unwrap_or(self.bytes.len());
        self.slice(start, end).to_string()
    }
}

// ---------------------------------------------------------------------------
// Scanner proper
// ---------------------------------------------------------------------------

impl Interp {
    /// Scan a complete source string into a new (managed) array node.
    pub(crate) fn scan_source(&mut self, src: &str) -> Outcome<NodeId> {
        let mut session = ScanSession::new(self.ds.dsp(), self.config.relaxed_scan);
        if let Err(abort) = self.scan_fragment(&mut session, src) {
            self.ds.drop_to(session.dsp_base);
            return Err(abort);
        }
        if let Some(mode) = session.modes.last() {
            let abort = self.raise(ErrorKind::MissingClose {
                close: mode.kind.closer(),
                line: mode.line,
            });
            self.ds.drop_to(session.dsp_base);
            return Err(abort);
        }
        Ok(self.finish_session(&mut session))
    }

    /// Pop a session's accumulated top-level values into an array node.
    pub(crate) fn finish_session(&mut self, session: &mut ScanSession) -> NodeId {
        debug_assert!(!session.is_open(), "finishing a session with open arrays");
        let cells = self.ds.take_above(session.dsp_base);
        self.heap.alloc_managed(SeriesData::Array { cells })
    }

    /// Splice a pre-built cell into the scan stream at the current
    /// nesting position.
    pub(crate) fn splice_cell(&mut self, session: &mut ScanSession, cell: Cell) {
        let mut c = cell;
        if session.pending_newline {
            c.flags |= CellFlags::NEWLINE_BEFORE;
            session.pending_newline = false;
        }
        self.ds.push(c);
    }

    /// Values completed at the session's top level (empty while brackets
    /// are open). Consumes them.
    pub(crate) fn take_completed(&mut self, session: &ScanSession) -> Vec<Cell> {
        if session.is_open() {
            return Vec::new();
        }
        self.ds.take_above(session.dsp_base)
    }

    /// Scan one source fragment, continuing the session.
    pub(crate) fn scan_fragment(&mut self, session: &mut ScanSession, src: &str) -> Outcome<()> {
        let mut state = ScanState::new(src);
        loop {
            self.skip_blanks(session, &mut state);
            if state.at_end() {
                return Ok(());
            }
            match self.scan_step(session, &mut state) {
                Ok(()) => {}
                Err(abort) if session.relax => {
                    // Keep what scanned, emit the error, resume after the
                    // failing token.
                    let cell = match abort {
                        Abort::Fail(node) => Cell::error(node),
                        Abort::Throw => return Err(abort),
                    };
                    debug!(line = session.line, "relaxed scan captured an error");
                    self.emit(session, cell);
                    while !state.at_end() && !state.byte().is_ascii_whitespace() {
                        state.pos += 1;
                    }
                }
                Err(abort) => return Err(abort),
            }
        }
    }

    fn skip_blanks(&mut self, session: &mut ScanSession, state: &mut ScanState) {
        while !state.at_end() {
            match state.byte() {
                b' ' | b'\t' | b'\r' => state.pos += 1,
                b'\n' => {
                    state.pos += 1;
                    session.line += 1;
                    state.line_start = state.pos;
                    session.pending_newline = true;
                }
                b';' => {
                    while !state.at_end() && state.byte() != b'\n' {
                        state.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    /// Push a finished value, tagging it with a pending line break.
    fn emit(&mut self, session: &mut ScanSession, cell: Cell) {
        self.splice_cell(session, cell);
    }

    fn syntax(&mut self, session: &ScanSession, state: &ScanState, token: &'static str, start: usize) -> Abort {
        self.raise(ErrorKind::Syntax {
            token,
            start,
            end: state.pos,
            line: session.line,
            text: state.line_text(start),
        })
    }

    /// Scan one value (or open/close one bracket) starting at a
    /// non-blank byte.
    fn scan_step(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<()> {
        let b = state.byte();
        match b {
            b'[' => {
                self.open_mode(session, state, OpenKind::Block, 0);
                Ok(())
            }
            b'(' => {
                self.open_mode(session, state, OpenKind::Group, 0);
                Ok(())
            }
            b']' | b')' => self.close_mode(session, state),
            b'{' => {
                let text = self.scan_braced_string(session, state)?;
                let cell = self.make_text(Kind::Text, &text);
                self.emit(session, cell);
                Ok(())
            }
            b'"' => {
                let text = self.scan_quoted_string(session, state)?;
                let cell = self.make_text(Kind::Text, &text);
                self.emit(session, cell);
                Ok(())
            }
            b'}' => Err({
                state.pos += 1;
                let abort = self.raise(ErrorKind::ExtraClose { close: '}' });
                abort
            }),
            b'\'' => self.scan_lit(session, state),
            b':' => self.scan_get(session, state),
            b'#' => self.scan_pound(session, state),
            b'%' => self.scan_file(session, state),
            b'$' => self.scan_number_like(session, state),
            b'<' => self.scan_angle(session, state),
            b'|' => {
                // BAR! only when it stands alone.
                if state.peek(1).map(is_delimiter).unwrap_or(true) {
                    state.pos += 1;
                    self.emit(session, Cell::bar());
                    Ok(())
                } else {
                    self.scan_wordlike(session, state, 0)
                }
            }
            b'/' => {
                state.pos += 1;
                let start = state.pos;
                if state.at_end() || is_delimiter(state.byte()) {
                    return Err(self.syntax(session, state, "refinement", start - 1));
                }
                let (slice, trailing_colon) = self.prescan(state);
                if trailing_colon {
                    return Err(self.syntax(session, state, "refinement", start - 1));
                }
                let sym = self.syms.intern(slice);
                self.emit(session, Cell::refinement(sym));
                Ok(())
            }
            b',' | b'\\' | b'@' => {
                let start = state.pos;
                state.pos += 1;
                Err(self.syntax(session, state, "word", start))
            }
            _ if lex_class(b) == CLASS_NUMBER => self.scan_number_like(session, state),
            _ if lex_class(b) == CLASS_WORD => {
                // Signs and dots lead numbers when a digit follows.
                if matches!(b, b'+' | b'-' | b'.') && self.leads_number(state) {
                    self.scan_number_like(session, state)
                } else {
                    self.scan_wordlike(session, state, 0)
                }
            }
            _ => {
                let start = state.pos;
                state.pos += 1;
                Err(self.syntax(session, state, "char", start))
            }
        }
    }

    fn leads_number(&self, state: &ScanState) -> bool {
        match state.byte() {
            b'+' | b'-' => match state.peek(1) {
                Some(d) if d.is_ascii_digit() => true,
                Some(b'.') => state.peek(2).map(|d| d.is_ascii_digit()).unwrap_or(false),
                Some(b'$') => true,
                _ => false,
            },
            b'.' => state.peek(1).map(|d| d.is_ascii_digit()).unwrap_or(false),
            _ => true,
        }
    }

    // ----- brackets -------------------------------------------------------

    fn open_mode(&mut self, session: &mut ScanSession, state: &mut ScanState, kind: OpenKind, quotes: u8) {
        state.pos += 1;
        session.modes.push(OpenMode {
            kind,
            dsp: self.ds.dsp(),
            line: session.line,
            quotes,
            newline_before: std::mem::take(&mut session.pending_newline),
        });
    }

    fn close_mode(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<()> {
        let found = state.byte() as char;
        state.pos += 1;
        let mode = match session.modes.pop() {
            Some(m) => m,
            None => return Err(self.raise(ErrorKind::ExtraClose { close: found })),
        };
        if mode.kind.closer() != found {
            return Err(self.raise(ErrorKind::MismatchedClose {
                open: mode.kind.opener(),
                expected: mode.kind.closer(),
                found,
                line: mode.line,
            }));
        }
        let newline_at_tail = std::mem::take(&mut session.pending_newline);
        let cells = self.ds.take_above(mode.dsp);
        let mut cell = match mode.kind {
            OpenKind::Construct => self.build_construct(session, state, cells)?,
            kind => {
                let node = self.heap.alloc_managed(SeriesData::Array { cells });
                {
                    let series = self.heap.series_mut(node);
                    series.line = mode.line as u32;
                    if newline_at_tail {
                        series.flags |= SeriesFlags::NEWLINE_AT_TAIL;
                    }
                }
                match kind {
                    OpenKind::Block => Cell::block(node),
                    OpenKind::Group => Cell::group(node),
                    OpenKind::GetGroup => Cell::series(Kind::GetGroup, node, 0),
                    OpenKind::Construct => unreachable!(),
                }
            }
        };
        // A group closer followed by `:` is a SET-GROUP!.
        if !state.at_end()
            && state.byte() == b':'
            && cell.kind() == Kind::Group
            && state.peek(1).map(is_delimiter).unwrap_or(true)
        {
            state.pos += 1;
            if let Some(node) = cell.series_node() {
                cell = Cell::series(Kind::SetGroup, node, 0);
            }
        }
        cell = cell.quoted(mode.quotes);
        if mode.newline_before {
            cell.flags |= CellFlags::NEWLINE_BEFORE;
        }
        self.ds.push(cell);
        Ok(())
    }

    /// `#[...]` constructor: length-1 bare literals, length-2 type
    /// dispatch.
    fn build_construct(
        &mut self,
        session: &ScanSession,
        state: &ScanState,
        cells: Vec<Cell>,
    ) -> Outcome<Cell> {
        let bad = |me: &mut Self| {
            let abort = me.raise(ErrorKind::Syntax {
                token: "construct",
                start: 0,
                end: 0,
                line: session.line,
                text: state.line_text(state.pos.saturating_sub(1)),
            });
            Err(abort)
        };
        match cells.len() {
            1 => {
                let word = cells[0];
                let Some(sym) = word.symbol() else { return bad(self) };
                let spelling = self.syms.text(sym).to_lowercase();
                match spelling.as_str() {
                    "true" => Ok(Cell::logic(true)),
                    "false" => Ok(Cell::logic(false)),
                    "void" => Ok(Cell::void()),
                    "none" => Ok(Cell::blank()),
                    _ => bad(self),
                }
            }
            2 => {
                let head = cells[0];
                let Some(sym) = head.symbol() else { return bad(self) };
                let spelling = self.syms.text(sym).to_lowercase();
                match spelling.as_str() {
                    "datatype!" => {
                        let Some(name_sym) = cells[1].symbol() else { return bad(self) };
                        let name = self.syms.text(name_sym).to_string();
                        match kind_from_name(&name) {
                            Some(kind) => Ok(Cell::datatype(kind)),
                            None => bad(self),
                        }
                    }
                    "typeset!" => {
                        let Some(node) = cells[1].series_node() else { return bad(self) };
                        if cells[1].kind() != Kind::Block {
                            return bad(self);
                        }
                        let mut bits = 0u64;
                        let len = self.heap.array_len(node);
                        for i in 0..len {
                            let item = self.heap.cell_at(node, i);
                            let Some(s) = item.symbol() else { return bad(self) };
                            let name = self.syms.text(s).to_string();
                            match kind_from_name(&name) {
                                Some(kind) => bits |= kind.bit(),
                                None => return bad(self),
                            }
                        }
                        Ok(Cell::typeset(bits))
                    }
                    _ => bad(self),
                }
            }
            _ => bad(self),
        }
    }

    // ----- prefixed forms -------------------------------------------------

    /// Apostrophe prefixes: LIT-WORD!, LIT-PATH!, LIT-BAR!, or quote
    /// levels on any other value.
    fn scan_lit(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<()> {
        let start = state.pos;
        let mut quotes: u8 = 0;
        while !state.at_end() && state.byte() == b'\'' {
            quotes += 1;
            state.pos += 1;
        }
        if state.at_end() || is_delimiter(state.byte()) {
            match state.byte_or_space() {
                b'[' => {
                    self.open_mode(session, state, OpenKind::Block, quotes);
                    return Ok(());
                }
                b'(' => {
                    self.open_mode(session, state, OpenKind::Group, quotes);
                    return Ok(());
                }
                b'{' => {
                    let text = self.scan_braced_string(session, state)?;
                    let cell = self.make_text(Kind::Text, &text).quoted(quotes);
                    self.emit(session, cell);
                    return Ok(());
                }
                b'"' => {
                    let text = self.scan_quoted_string(session, state)?;
                    let cell = self.make_text(Kind::Text, &text).quoted(quotes);
                    self.emit(session, cell);
                    return Ok(());
                }
                _ => return Err(self.syntax(session, state, "word", start)),
            }
        }
        let b = state.byte();
        if b == b'|' && state.peek(1).map(is_delimiter).unwrap_or(true) {
            state.pos += 1;
            self.emit(session, Cell::lit_bar().quoted(quotes - 1));
            return Ok(());
        }
        if lex_class(b) == CLASS_NUMBER || (matches!(b, b'+' | b'-' | b'.') && self.leads_number(state)) {
            return self.scan_number_quoted(session, state, quotes);
        }
        // LIT-WORD! (or LIT-PATH! after promotion); extra apostrophes add
        // quote levels on top.
        self.scan_wordlike_lit(session, state, quotes)
    }

    fn scan_number_quoted(
        &mut self,
        session: &mut ScanSession,
        state: &mut ScanState,
        quotes: u8,
    ) -> Outcome<()> {
        self.scan_number_like(session, state)?;
        let top = self.ds.top_mut();
        *top = top.quoted(quotes);
        Ok(())
    }

    /// `:word`, `:path/...`, or `:(...)`.
    fn scan_get(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<()> {
        let start = state.pos;
        state.pos += 1;
        if !state.at_end() && state.byte() == b'(' {
            self.open_mode(session, state, OpenKind::GetGroup, 0);
            return Ok(());
        }
        if state.at_end() || is_delimiter(state.byte()) {
            return Err(self.syntax(session, state, "get-word", start));
        }
        let (slice, trailing_colon) = self.prescan(state);
        if trailing_colon {
            return Err(self.syntax(session, state, "get-word", start));
        }
        let sym = self.syms.intern(slice);
        let head = Cell::get_word(sym);
        self.finish_possible_path(session, state, head)
    }

    /// `#issue`, `#"c"`, `#{hex}`, `#[construct]`.
    fn scan_pound(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<()> {
        let start = state.pos;
        state.pos += 1;
        match state.byte_or_space() {
            b'"' => {
                let ch = self.scan_char_literal(session, state, start)?;
                self.emit(session, Cell::char(ch));
                Ok(())
            }
            b'{' => {
                let bytes = self.scan_binary(session, state, start)?;
                let node = self.heap.alloc_managed(SeriesData::Binary { bytes, bias: 0 });
                self.emit(session, Cell::binary(node));
                Ok(())
            }
            b'[' => {
                self.open_mode(session, state, OpenKind::Construct, 0);
                Ok(())
            }
            b => {
                if is_delimiter(b) {
                    return Err(self.syntax(session, state, "issue", start));
                }
                let (slice, trailing_colon) = self.prescan(state);
                if trailing_colon {
                    return Err(self.syntax(session, state, "issue", start));
                }
                let cell = self.make_text(Kind::Issue, slice);
                self.emit(session, cell);
                Ok(())
            }
        }
    }

    /// `%file`, `%"file name"`. `%xx` hex pairs decode; the decoding is
    /// lossy by design.
    fn scan_file(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<()> {
        let start = state.pos;
        state.pos += 1;
        if state.byte_or_space() == b'"' {
            let text = self.scan_quoted_string(session, state)?;
            let cell = self.make_text(Kind::File, &text);
            self.emit(session, cell);
            return Ok(());
        }
        // Files keep slashes; stop on whitespace and structural bytes.
        let mut text = String::new();
        while !state.at_end() {
            let b = state.byte();
            if b.is_ascii_whitespace()
                || matches!(b, b'[' | b']' | b'(' | b')' | b'{' | b'}' | b'"' | b';')
            {
                break;
            }
            if b == b'%' {
                let hi = state.peek(1).and_then(hex_value);
                let lo = state.peek(2).and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        text.push((hi << 4 | lo) as char);
                        state.pos += 3;
                        continue;
                    }
                    _ => {
                        state.pos += 1;
                        return Err(self.syntax(session, state, "file", start));
                    }
                }
            }
            text.push(self.next_char(state));
        }
        if text.is_empty() {
            return Err(self.syntax(session, state, "file", start));
        }
        let cell = self.make_text(Kind::File, &text);
        self.emit(session, cell);
        Ok(())
    }

    /// `<tag>` or a word made of angle characters (`<`, `<=`, `<>`).
    fn scan_angle(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<()> {
        let start = state.pos;
        match state.peek(1) {
            Some(b'<') | Some(b'=') | Some(b'>') | None => {
                return self.scan_wordlike(session, state, 0);
            }
            // `</a>` is a tag; any other delimiter means a bare `<` word.
            Some(b) if is_delimiter(b) && b != b'/' => {
                return self.scan_wordlike(session, state, 0);
            }
            _ => {}
        }
        state.pos += 1; // consume '<'
        let text_start = state.pos;
        while !state.at_end() && state.byte() != b'>' {
            if state.byte() == b'\n' {
                return Err(self.syntax(session, state, "tag", start));
            }
            state.pos += 1;
        }
        if state.at_end() {
            return Err(self.raise(ErrorKind::MissingClose { close: '>', line: session.line }));
        }
        let text = state.slice(text_start, state.pos).to_string();
        state.pos += 1; // consume '>'
        let cell = self.make_text(Kind::Tag, &text);
        self.emit(session, cell);
        Ok(())
    }

    // ----- words, paths, urls, emails -------------------------------------

    /// Prescan: advance to the next delimiter, accumulating the special
    /// fingerprint. Returns the token slice (with any trailing `:` split
    /// off) and whether a trailing colon was present.
    fn prescan<'a>(&self, state: &mut ScanState<'a>) -> (&'a str, bool) {
        let start = state.pos;
        let mut fingerprint: u32 = 0;
        let mut first = true;
        while !state.at_end() {
            let entry = LEX_MAP[state.byte() as usize];
            if entry & CLASS_MASK == CLASS_DELIMIT || entry == CLASS_ILLEGAL {
                break;
            }
            if !first && entry & CLASS_MASK == CLASS_WORD && entry & FLAG_SPECIAL != 0 {
                fingerprint |= 1 << (entry & 0x1F);
            }
            first = false;
            state.pos += 1;
        }
        let mut end = state.pos;
        let mut trailing_colon = false;
        if end > start && state.bytes[end - 1] == b':' && fingerprint & (1 << SPECIAL_COLON) != 0 {
            // Only a *final* colon makes a set-word; interior colons stay
            // (urls, times).
            let interior = state
                .slice(start, end - 1)
                .as_bytes()
                .contains(&b':');
            if !interior {
                end -= 1;
                trailing_colon = true;
            }
        }
        let slice = state.slice(start, end);
        (slice, trailing_colon)
    }

    fn scan_wordlike(
        &mut self,
        session: &mut ScanSession,
        state: &mut ScanState,
        extra_quotes: u8,
    ) -> Outcome<()> {
        let start = state.pos;
        let (slice, trailing_colon) = self.prescan(state);
        let fingerprint = fingerprint_of(slice);

        // Email: exactly one @, not at the edge of the token.
        if fingerprint & (1 << SPECIAL_AT) != 0 {
            if slice.matches('@').count() == 1 && !slice.starts_with('@') && !slice.ends_with('@') {
                if trailing_colon {
                    return Err(self.syntax(session, state, "email", start));
                }
                let cell = self.make_text(Kind::Email, slice).quoted(extra_quotes);
                self.emit(session, cell);
                return Ok(());
            }
            return Err(self.syntax(session, state, "word", start));
        }

        // URL: scheme:rest (interior colon), possibly extending across
        // slashes that prescan stopped at.
        if fingerprint & (1 << SPECIAL_COLON) != 0 || (trailing_colon && self.url_continues(state)) {
            return self.scan_url(session, state, start, extra_quotes);
        }

        if fingerprint
            & ((1 << SPECIAL_COMMA)
                | (1 << SPECIAL_DOLLAR)
                | (1 << SPECIAL_POUND)
                | (1 << SPECIAL_BACKSLASH)
                | (1 << SPECIAL_PERCENT))
            != 0
        {
            return Err(self.syntax(session, state, "word", start));
        }

        if slice.is_empty() {
            return Err(self.syntax(session, state, "word", start));
        }

        // `_` alone is BLANK!.
        if slice == "_" {
            let mut cell = Cell::blank().quoted(extra_quotes);
            if trailing_colon {
                return Err(self.syntax(session, state, "word", start));
            }
            if std::mem::take(&mut session.pending_newline) {
                cell.flags |= CellFlags::NEWLINE_BEFORE;
            }
            self.ds.push(cell);
            return Ok(());
        }

        let sym = self.syms.intern(slice);
        if trailing_colon {
            let cell = Cell::set_word(sym).quoted(extra_quotes);
            self.emit(session, cell);
            return Ok(());
        }
        let head = Cell::word(sym).quoted(extra_quotes);
        self.finish_possible_path(session, state, head)
    }

    fn scan_wordlike_lit(
        &mut self,
        session: &mut ScanSession,
        state: &mut ScanState,
        quotes: u8,
    ) -> Outcome<()> {
        let start = state.pos;
        let (slice, trailing_colon) = self.prescan(state);
        if trailing_colon || slice.is_empty() {
            return Err(self.syntax(session, state, "lit-word", start));
        }
        let fingerprint = fingerprint_of(slice);
        if fingerprint
            & ((1 << SPECIAL_AT)
                | (1 << SPECIAL_COMMA)
                | (1 << SPECIAL_DOLLAR)
                | (1 << SPECIAL_POUND)
                | (1 << SPECIAL_COLON)
                | (1 << SPECIAL_BACKSLASH))
            != 0
        {
            return Err(self.syntax(session, state, "lit-word", start));
        }
        let sym = self.syms.intern(slice);
        let head = Cell::lit_word(sym).quoted(quotes - 1);
        self.finish_possible_path(session, state, head)
    }

    fn url_continues(&self, state: &ScanState) -> bool {
        match state.bytes.get(state.pos) {
            Some(b'/') => true,
            _ => false,
        }
    }

    /// Consume an URL from `start`, including slashes, until whitespace
    /// or structural punctuation.
    fn scan_url(
        &mut self,
        session: &mut ScanSession,
        state: &mut ScanState,
        start: usize,
        extra_quotes: u8,
    ) -> Outcome<()> {
        while !state.at_end() {
            let b = state.byte();
            if b.is_ascii_whitespace()
                || matches!(b, b'[' | b']' | b'(' | b')' | b'{' | b'}' | b'"' | b';')
            {
                break;
            }
            state.pos += 1;
        }
        let slice = state.slice(start, state.pos);
        if slice.ends_with(':') {
            return Err(self.syntax(session, state, "url", start));
        }
        let cell = self.make_text(Kind::Url, slice).quoted(extra_quotes);
        self.emit(session, cell);
        Ok(())
    }

    /// After a path-capable token, a `/` steals it as the head of a path
    /// scan. The head's decoration (GET/LIT) promotes the finished path;
    /// a trailing colon on the last segment makes a SET-PATH!.
    fn finish_possible_path(
        &mut self,
        session: &mut ScanSession,
        state: &mut ScanState,
        head: Cell,
    ) -> Outcome<()> {
        if state.at_end() || state.byte() != b'/' {
            self.emit(session, head);
            return Ok(());
        }
        let start = state.pos;
        let head_quotes = head.quotes();
        let head_kind = head.kind();
        // The head joins the path as a plain word.
        let mut parts: Vec<Cell> = vec![demote_path_head(head)];
        let mut path_kind = match head_kind {
            Kind::GetWord => Kind::GetPath,
            Kind::LitWord => Kind::LitPath,
            _ => Kind::Path,
        };
        loop {
            state.pos += 1; // consume '/'
            if state.at_end() || is_delimiter(state.byte()) {
                return Err(self.syntax(session, state, "path", start));
            }
            let b = state.byte();
            if lex_class(b) == CLASS_NUMBER {
                let (slice, trailing_colon) = self.prescan(state);
                if trailing_colon {
                    return Err(self.syntax(session, state, "path", start));
                }
                match slice.parse::<i64>() {
                    Ok(i) => parts.push(Cell::integer(i)),
                    Err(_) => return Err(self.syntax(session, state, "path", start)),
                }
            } else {
                let (slice, trailing_colon) = self.prescan(state);
                if slice.is_empty() {
                    return Err(self.syntax(session, state, "path", start));
                }
                let fingerprint = fingerprint_of(slice);
                if fingerprint
                    & ((1 << SPECIAL_AT)
                        | (1 << SPECIAL_COMMA)
                        | (1 << SPECIAL_DOLLAR)
                        | (1 << SPECIAL_POUND)
                        | (1 << SPECIAL_COLON)
                        | (1 << SPECIAL_BACKSLASH))
                    != 0
                {
                    return Err(self.syntax(session, state, "path", start));
                }
                let sym = self.syms.intern(slice);
                parts.push(Cell::word(sym));
                if trailing_colon {
                    if path_kind != Kind::Path {
                        return Err(self.syntax(session, state, "path", start));
                    }
                    path_kind = Kind::SetPath;
                    break;
                }
            }
            if state.at_end() || state.byte() != b'/' {
                break;
            }
        }
        let node = self.heap.alloc_managed(SeriesData::Array { cells: parts });
        let cell = Cell::series(path_kind, node, 0).quoted(head_quotes);
        self.emit(session, cell);
        Ok(())
    }

    // ----- numbers and kin ------------------------------------------------

    /// Anything led by a digit (or signed/dotted digit, or `$`): INTEGER!,
    /// DECIMAL!, PERCENT!, MONEY!, TIME!, DATE!, PAIR!, TUPLE!.
    fn scan_number_like(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<()> {
        let start = state.pos;
        let (slice, trailing_colon) = self.prescan(state);
        if trailing_colon {
            return Err(self.syntax(session, state, "integer", start));
        }
        let cell = match self.classify_number(slice) {
            Some(cell) => cell,
            None => return Err(self.syntax(session, state, "integer", start)),
        };
        // An integer followed by `/` heads a path.
        if cell.kind() == Kind::Integer && !state.at_end() && state.byte() == b'/' {
            return self.finish_possible_path(session, state, cell);
        }
        self.emit(session, cell);
        Ok(())
    }

    fn classify_number(&self, slice: &str) -> Option<Cell> {
        let s = slice;
        if s.is_empty() {
            return None;
        }

        // MONEY!: optional sign, then `$amount`.
        if let Some(dollar) = s.find('$') {
            let (sign, rest) = s.split_at(dollar);
            let amount: f64 = rest[1..].replace(',', ".").parse().ok()?;
            return match sign {
                "" | "+" => Some(Cell::money(amount)),
                "-" => Some(Cell::money(-amount)),
                _ => None,
            };
        }

        // PERCENT!: number with a trailing `%`.
        if let Some(body) = s.strip_suffix('%') {
            let value: f64 = body.replace(',', ".").parse().ok()?;
            return Some(Cell::percent(value));
        }

        // TIME!: `h:m`, `h:m:s`, `h:m:s.f`.
        if s.contains(':') {
            return scan_time(s);
        }

        // PAIR!: `XxY`.
        if let Some(xpos) = s[1..].find(['x', 'X']).map(|i| i + 1) {
            let (xs, ys) = (&s[..xpos], &s[xpos + 1..]);
            let x: f64 = xs.parse().ok()?;
            let y: f64 = ys.parse().ok()?;
            return Some(Cell::pair(x, y));
        }

        // Exponent decimals before date splitting (1e-5 has a minus).
        let has_exp = s[1..].contains(['e', 'E']);
        if has_exp {
            if let Ok(d) = s.replace(',', ".").parse::<f64>() {
                return Some(Cell::decimal(d));
            }
        }

        // DATE!: `d-mon-y` (month by name or number).
        if s[1..].contains('-') {
            return scan_date(s);
        }

        // TUPLE!: three or more dot-separated bytes.
        if s.matches('.').count() >= 2 {
            let mut parts = Vec::new();
            for p in s.split('.') {
                parts.push(p.parse::<u8>().ok()?);
            }
            if parts.len() > 8 {
                return None;
            }
            return Some(Cell::tuple(&parts));
        }

        // DECIMAL! (dot or comma radix point).
        if s.contains('.') || s.contains(',') {
            return s.replace(',', ".").parse::<f64>().ok().map(Cell::decimal);
        }

        // INTEGER!.
        s.parse::<i64>().ok().map(Cell::integer)
    }

    // ----- strings, chars, binaries ---------------------------------------

    /// `"..."`: line breaks are illegal; `^` escapes decode.
    fn scan_quoted_string(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<String> {
        let start = state.pos;
        state.pos += 1; // consume opening quote
        let mut text = String::new();
        loop {
            if state.at_end() {
                return Err(self.raise(ErrorKind::MissingClose { close: '"', line: session.line }));
            }
            match state.byte() {
                b'"' => {
                    state.pos += 1;
                    return Ok(text);
                }
                b'\n' => {
                    return Err(self.syntax(session, state, "string", start));
                }
                b'^' => {
                    state.pos += 1;
                    let ch = self.scan_escape(session, state, start)?;
                    text.push(ch);
                }
                _ => {
                    let ch = self.next_char(state);
                    text.push(ch);
                }
            }
        }
    }

    /// `{...}`: braces nest, line breaks are legal, CRLF normalizes to LF.
    fn scan_braced_string(&mut self, session: &mut ScanSession, state: &mut ScanState) -> Outcome<String> {
        let start = state.pos;
        let open_line = session.line;
        state.pos += 1; // consume opening brace
        let mut depth = 1usize;
        let mut text = String::new();
        loop {
            if state.at_end() {
                return Err(self.raise(ErrorKind::MissingClose { close: '}', line: open_line }));
            }
            match state.byte() {
                b'{' => {
                    depth += 1;
                    text.push('{');
                    state.pos += 1;
                }
                b'}' => {
                    depth -= 1;
                    state.pos += 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push('}');
                }
                b'\r' => {
                    // CRLF (or lone CR) normalizes to LF.
                    state.pos += 1;
                    if !state.at_end() && state.byte() == b'\n' {
                        state.pos += 1;
                    }
                    session.line += 1;
                    state.line_start = state.pos;
                    text.push('\n');
                }
                b'\n' => {
                    state.pos += 1;
                    session.line += 1;
                    state.line_start = state.pos;
                    text.push('\n');
                }
                b'^' => {
                    state.pos += 1;
                    let ch = self.scan_escape(session, state, start)?;
                    text.push(ch);
                }
                _ => {
                    let ch = self.next_char(state);
                    text.push(ch);
                }
            }
        }
    }

    /// Decode one `^` escape (the caret is already consumed).
    fn scan_escape(&mut self, session: &ScanSession, state: &mut ScanState, start: usize) -> Outcome<char> {
        if state.at_end() {
            return Err(self.syntax(session, state, "string", start));
        }
        let b = state.byte();
        state.pos += 1;
        let ch = match b {
            b'/' => '\n',
            b'-' => '\t',
            b'!' => '\u{1E}',
            b'~' => '\u{7F}',
            b'^' => '^',
            b'"' => '"',
            b'{' => '{',
            b'}' => '}',
            b'(' => return self.scan_paren_escape(session, state, start),
            b'@'..=b'_' => char::from(b - b'@'),
            b'a'..=b'z' => char::from(b - b'a' + 1),
            other => other as char,
        };
        Ok(ch)
    }

    /// `^(HEX)` up to four hex digits, or `^(NAME)` from the fixed table.
    fn scan_paren_escape(
        &mut self,
        session: &ScanSession,
        state: &mut ScanState,
        start: usize,
    ) -> Outcome<char> {
        let body_start = state.pos;
        while !state.at_end() && state.byte() != b')' {
            state.pos += 1;
        }
        if state.at_end() {
            return Err(self.syntax(session, state, "string", start));
        }
        let body = state.slice(body_start, state.pos);
        state.pos += 1; // consume ')'
        if !body.is_empty() && body.len() <= 4 && body.bytes().all(|b| hex_value(b).is_some()) {
            let mut code: u32 = 0;
            for b in body.bytes() {
                code = code << 4 | u32::from(hex_value(b).unwrap_or(0));
            }
            return match char::from_u32(code) {
                Some(c) => Ok(c),
                None => Err(self.syntax(session, state, "string", start)),
            };
        }
        let ch = match body.to_lowercase().as_str() {
            "null" => '\0',
            "line" => '\n',
            "tab" => '\t',
            "page" => '\u{0C}',
            "esc" | "escape" => '\u{1B}',
            "back" => '\u{08}',
            "del" => '\u{7F}',
            _ => return Err(self.syntax(session, state, "string", start)),
        };
        Ok(ch)
    }

    /// `#"c"` with the same escapes as strings.
    fn scan_char_literal(
        &mut self,
        session: &ScanSession,
        state: &mut ScanState,
        start: usize,
    ) -> Outcome<char> {
        state.pos += 1; // consume opening quote
        if state.at_end() {
            return Err(self.syntax(session, state, "char", start));
        }
        let ch = match state.byte() {
            b'^' => {
                state.pos += 1;
                self.scan_escape(session, state, start)?
            }
            b'"' => return Err(self.syntax(session, state, "char", start)),
            _ => self.next_char(state),
        };
        if state.at_end() || state.byte() != b'"' {
            return Err(self.syntax(session, state, "char", start));
        }
        state.pos += 1;
        Ok(ch)
    }

    /// `#{...}`: hex pairs, whitespace tolerated.
    fn scan_binary(
        &mut self,
        session: &mut ScanSession,
        state: &mut ScanState,
        start: usize,
    ) -> Outcome<Vec<u8>> {
        let open_line = session.line;
        state.pos += 1; // consume '{'
        let mut bytes = Vec::new();
        let mut pending: Option<u8> = None;
        loop {
            if state.at_end() {
                return Err(self.raise(ErrorKind::MissingClose { close: '}', line: open_line }));
            }
            let b = state.byte();
            match b {
                b'}' => {
                    state.pos += 1;
                    if pending.is_some() {
                        return Err(self.syntax(session, state, "binary", start));
                    }
                    return Ok(bytes);
                }
                b'\n' => {
                    state.pos += 1;
                    session.line += 1;
                    state.line_start = state.pos;
                }
                b' ' | b'\t' | b'\r' => state.pos += 1,
                _ => match hex_value(b) {
                    Some(v) => {
                        state.pos += 1;
                        match pending.take() {
                            Some(hi) => bytes.push(hi << 4 | v),
                            None => pending = Some(v),
                        }
                    }
                    None => {
                        state.pos += 1;
                        return Err(self.syntax(session, state, "binary", start));
                    }
                },
            }
        }
    }

    // ----- small helpers --------------------------------------------------

    fn next_char(&self, state: &mut ScanState) -> char {
        let s = state.slice(state.pos, state.bytes.len());
        let ch = s.chars().next().unwrap_or('\u{FFFD}');
        state.pos += ch.len_utf8();
        ch
    }

    pub(crate) fn make_text(&mut self, kind: Kind, text: &str) -> Cell {
        let chars = text.chars().count();
        let node = self.heap.alloc_managed(SeriesData::Text {
            string: text.to_string(),
            chars,
        });
        Cell::series(kind, node, 0)
    }
}

impl<'a> ScanState<'a> {
    /// Current byte, or a space at end-of-input (delimiter for decisions).
    fn byte_or_space(&self) -> u8 {
        if self.at_end() { b' ' } else { self.byte() }
    }
}

fn fingerprint_of(slice: &str) -> u32 {
    let mut fingerprint = 0u32;
    for &b in slice.as_bytes().iter().skip(1) {
        let entry = LEX_MAP[b as usize];
        if entry & CLASS_MASK == CLASS_WORD && entry & FLAG_SPECIAL != 0 {
            fingerprint |= 1 << (entry & 0x1F);
        }
    }
    fingerprint
}

fn demote_path_head(head: Cell) -> Cell {
    match head.symbol() {
        Some(sym) => Cell::word(sym),
        None => head,
    }
}

fn scan_time(s: &str) -> Option<Cell> {
    let (neg, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let parts: Vec<&str> = body.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let hours: i64 = parts[0].parse().ok()?;
    let minutes: i64 = parts[1].parse().ok()?;
    let mut nanos = (hours * 3600 + minutes * 60) * 1_000_000_000;
    if parts.len() == 3 {
        let secs: f64 = parts[2].parse().ok()?;
        nanos += (secs * 1e9) as i64;
    }
    Some(Cell::time(if neg { -nanos } else { nanos }))
}

fn scan_date(s: &str) -> Option<Cell> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    let day: u8 = parts[0].parse().ok()?;
    let month: u8 = match parts[1].parse::<u8>() {
        Ok(m) => m,
        Err(_) => month_number(parts[1])?,
    };
    let year: i16 = parts[2].parse().ok()?;
    if day == 0 || day > 31 || month == 0 || month > 12 {
        return None;
    }
    Some(Cell::date(year, month, day))
}

/// Name -> kind byte (construct syntax and MAKE).
pub(crate) fn kind_from_name(name: &str) -> Option<Kind> {
    let folded = name.to_lowercase();
    for k in 0..sigil_core::cell::KIND_MAX {
        if let Ok(kind) = Kind::try_from(k) {
            if kind.name() == folded {
                return Some(kind);
            }
        }
    }
    None
}

/// Probe for a leading `REBOL [` header, tolerating `;` comments and a
/// leading `[`. Returns 0 for none, 1 for a plain header, -1 for a
/// header embedded in an outer block.
pub fn scan_header(src: &str) -> i32 {
    let bytes = src.as_bytes();
    let mut pos = 0usize;
    let mut embedded = false;
    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos < bytes.len() && bytes[pos] == b';' {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        if pos < bytes.len() && bytes[pos] == b'[' && !embedded {
            embedded = true;
            pos += 1;
            continue;
        }
        break;
    }
    let rest = &src[pos.min(src.len())..];
    if rest.len() >= 5 && rest[..5].eq_ignore_ascii_case("REBOL") {
        let after = rest[5..].trim_start();
        if after.starts_with('[') {
            return if embedded { -1 } else { 1 };
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_classes() {
        assert_eq!(lex_class(b'a'), CLASS_WORD);
        assert_eq!(lex_class(b'5'), CLASS_NUMBER);
        assert_eq!(lex_class(b'['), CLASS_DELIMIT);
        assert_eq!(lex_class(b'/'), CLASS_DELIMIT);
        assert_eq!(lex_class(b':'), CLASS_WORD);
        assert!(LEX_MAP[b':' as usize] & FLAG_SPECIAL != 0);
        // UTF-8 lead/continuation bytes continue words.
        assert_eq!(lex_class(0xC3), CLASS_WORD);
        assert_eq!(lex_class(0x9F), CLASS_WORD);
        // Control characters are illegal outside strings.
        assert_eq!(LEX_MAP[0x01], CLASS_ILLEGAL);
    }

    #[test]
    fn test_hex_values_ride_in_low_bits() {
        assert_eq!(hex_value(b'0'), Some(0));
        assert_eq!(hex_value(b'9'), Some(9));
        assert_eq!(hex_value(b'A'), Some(10));
        assert_eq!(hex_value(b'f'), Some(15));
        assert_eq!(hex_value(b'g'), None);
        assert_eq!(hex_value(b':'), None);
    }

    #[test]
    fn test_fingerprint_skips_first_char() {
        assert_eq!(fingerprint_of("@home") & (1 << SPECIAL_AT), 0);
        assert!(fingerprint_of("me@home") & (1 << SPECIAL_AT) != 0);
        assert!(fingerprint_of("a:b") & (1 << SPECIAL_COLON) != 0);
    }

    #[test]
    fn test_time_scanning() {
        let t = scan_time("1:30").unwrap();
        assert_eq!(t.kind(), Kind::Time);
        let t = scan_time("-0:00:01.5").unwrap();
        if let sigil_core::Payload::Time { nanos } = *t.payload() {
            assert_eq!(nanos, -1_500_000_000);
        } else {
            panic!("expected a time payload");
        }
        assert!(scan_time("1:2:3:4").is_none());
    }

    #[test]
    fn test_date_scanning() {
        let d = scan_date("31-Dec-1999").unwrap();
        assert_eq!(d.kind(), Kind::Date);
        let d = scan_date("1-1-2000").unwrap();
        assert_eq!(d.kind(), Kind::Date);
        assert!(scan_date("32-Jan-2000").is_none());
        assert!(scan_date("1-Foo-2000").is_none());
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(kind_from_name("integer!"), Some(Kind::Integer));
        assert_eq!(kind_from_name("SET-WORD!"), Some(Kind::SetWord));
        assert_eq!(kind_from_name("whatever!"), None);
    }
}
