//! The raw parse-tree contract the Source Loader hands to the Preprocessor.
//!
//! Everything in this module is produced by an external collaborator (a
//! surface-syntax parser such as `elfhex-syntax`); `elfhex-core` only
//! defines the shape, never constructs a [`RawFile`] from text itself.

use crate::error::Span;

/// One parsed `.eh` file, before includes are resolved.
#[derive(Clone, Debug)]
pub struct RawFile {
    /// The program declaration, present only on files that open with one.
    pub program: Option<RawProgramDecl>,
    /// `include` statements, in source order.
    pub includes: Vec<RawInclude>,
    /// `segment` declarations, in source order.
    pub segments: Vec<RawSegmentDecl>,
    /// `fragment` declarations, in source order.
    pub fragments: Vec<RawFragmentDecl>,
}

/// A `program <machine> <"<"|">"> <alignment>` declaration.
#[derive(Clone, Copy, Debug)]
pub struct RawProgramDecl {
    /// The target's ELF `e_machine` number.
    pub machine: u16,
    /// The program's byte order.
    pub endianness: crate::elf32::Endianness,
    /// The default segment alignment, in bytes.
    pub alignment: u32,
}

/// An `include "path"` or `include fragments "path"` statement.
#[derive(Clone, Debug)]
pub struct RawInclude {
    /// The path as written in source, relative to the search path.
    pub path: String,
    /// `true` for `include fragments "..."`: segments contributed by the
    /// included file (and its own fragments-only includes) are suppressed.
    pub fragments_only: bool,
    /// Location of the `include` statement.
    pub span: Span,
}

/// A `segment name(flags: .. size: .. alignment: ..) { .. }` declaration.
#[derive(Clone, Debug)]
pub struct RawSegmentDecl {
    /// The segment's name.
    pub name: String,
    /// Parsed `r`/`rw`/`rx`/`rwx` flags, if given.
    pub flags: Option<crate::elf32::SegmentFlags>,
    /// The declared minimum size in bytes, if given.
    pub size: Option<u32>,
    /// The declared alignment in bytes, if given.
    pub alignment: Option<u32>,
    /// The segment body.
    pub body: Vec<RawElement>,
    /// The trailing `[[n1:w1 n2:w2 ..]]` auto-label list.
    pub auto_labels: Vec<(String, u32)>,
}

/// A `fragment name(p1, p2) { .. }` declaration.
#[derive(Clone, Debug)]
pub struct RawFragmentDecl {
    /// The fragment's name.
    pub name: String,
    /// Formal parameter names, in declaration order.
    pub params: Vec<String>,
    /// The fragment body.
    pub body: Vec<RawElement>,
}

/// One element of a raw (pre-expansion) fragment or segment body.
#[derive(Clone, Debug)]
pub enum RawElement {
    /// Raw hex-pair bytes (`[0-9a-f]{2}` runs); already fully literal.
    HexBytes(Vec<u8>),
    /// A padded numeric literal (`(=|+|-)<digits>(b|d|h)(<width>)?`),
    /// deferred until the program's endianness is known.
    PaddedLiteral {
        /// The literal's sign character.
        sign: Sign,
        /// The digit string, in `base`.
        digits: String,
        /// The base the digits are written in.
        base: NumBase,
        /// The declared width in bytes (default 1).
        width: u32,
        /// Location of the literal, for `LiteralOutOfRange` diagnostics.
        span: Span,
    },
    /// A `"…"` string literal, deferred for ASCII validation.
    StringLiteral {
        /// The literal's text content.
        text: String,
        /// Location of the literal, for `UnprintableCharInString` diagnostics.
        span: Span,
    },
    /// A `[name]` label.
    Label(String),
    /// A `<name>` / `<seg:name>` relative reference, or a `<<…>>` absolute
    /// one, both using the same inner grammar.
    Reference {
        /// `true` for a relative (`<…>`) reference, `false` for an absolute
        /// (`<<…>>`) one.
        relative: bool,
        /// The segment qualifier, if one was given.
        segment: Option<String>,
        /// The target label name.
        label: String,
        /// The `+ offset` constant, if one was given.
        offset: Option<i64>,
        /// The `:width` qualifier, if one was given.
        width: Option<u32>,
        /// Location of the reference, for out-of-range diagnostics.
        span: Span,
    },
    /// An `@name(args)` fragment reference, optionally `(alias)`ed and/or
    /// `@!`-flagged for once-only expansion.
    FragmentRef {
        /// The referenced fragment's name.
        name: String,
        /// Argument element sequences, in declaration order.
        args: Vec<Vec<RawElement>>,
        /// The `(alias)` hygiene key, if one was given.
        alias: Option<String>,
        /// `true` if this reference was written `@!`.
        once: bool,
        /// Location of the reference.
        span: Span,
    },
    /// A `$name` parameter reference; only meaningful inside a fragment
    /// body.
    ParamRef(String),
    /// A `:name { .. }` or `::name { .. }` extension invocation.
    ExtensionInvocation {
        /// The extension's dotted name.
        name: String,
        /// `true` for `:name`, `false` for `::name`.
        builtin_namespace: bool,
        /// The invocation's raw inner text.
        text: String,
        /// Location of the invocation.
        span: Span,
    },
}

/// The sign character of a padded numeric literal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sign {
    /// `+`: interpret the digits as a non-negative value within the full
    /// signed range of the declared width.
    Plus,
    /// `-`: negate the digits, within the full signed range of the
    /// declared width.
    Minus,
    /// `=`: interpret the digits as an unsigned value that must fit in the
    /// declared width.
    Equals,
}

/// The base a padded numeric literal's digits are written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumBase {
    /// `b`: binary.
    Binary,
    /// `d`: decimal.
    Decimal,
    /// `h`: hexadecimal.
    Hex,
}

impl NumBase {
    /// The radix this base parses digits in.
    pub fn radix(self) -> u32 {
        match self {
            Self::Binary => 2,
            Self::Decimal => 10,
            Self::Hex => 16,
        }
    }
}
