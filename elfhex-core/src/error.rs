//! The unified error taxonomy for the ELFHex pipeline.

use core::fmt;
use std::sync::Arc;

use crate::elf32::Endianness;

/// A location in a source file, attached to errors raised while a span is
/// still available (parsing and preprocessing). Dropped once the expanded
/// program exists, since later stages never need to re-report against
/// original source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Span {
    /// The canonical path of the file the span is in.
    pub file: Arc<str>,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Every fatal error the ELFHex pipeline can raise.
///
/// All errors are fatal to the compilation; there is no recovery, retry, or
/// partial output.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The surface grammar rejected the source text.
    #[error("{span}: {message}")]
    Parse {
        /// Description of what was expected versus found.
        message: String,
        /// Where in the source the failure occurred.
        span: Span,
    },

    /// No entry on the search path resolved the requested include.
    #[error("could not find {include_path:?} on the include search path")]
    FileNotFound {
        /// The include path as written in source.
        include_path: String,
    },

    /// A filesystem operation failed for a reason other than "not found".
    #[error("I/O error reading {path:?}: {source}")]
    Io {
        /// The path being read.
        path: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// An included file's program declaration does not match the entry
    /// file's machine or endianness.
    #[error(
        "included file {file} declares machine {found_machine:#06x}/{found_endianness:?}, \
         program declares {expected_machine:#06x}/{expected_endianness:?}"
    )]
    IncompatibleProgram {
        /// File whose declaration conflicts.
        file: String,
        /// Machine number already established for the program.
        expected_machine: u16,
        /// Endianness already established for the program.
        expected_endianness: Endianness,
        /// Machine number the conflicting file declares.
        found_machine: u16,
        /// Endianness the conflicting file declares.
        found_endianness: Endianness,
    },

    /// Two occurrences of the same segment declare incompatible flags.
    #[error("segment {segment:?} declares conflicting flags across files")]
    MetadataConflict {
        /// The segment name.
        segment: String,
    },

    /// A fragment name was declared more than once across the merged files.
    #[error("fragment {name:?} is defined more than once")]
    FragmentRedefinition {
        /// The fragment name.
        name: String,
    },

    /// A fragment reference names a fragment that was never declared.
    #[error("reference to unknown fragment {name:?}")]
    UnknownFragment {
        /// The fragment name referenced.
        name: String,
    },

    /// A fragment reference supplied the wrong number of arguments.
    #[error("fragment {name:?} expects {expected} argument(s), found {found}")]
    ArityError {
        /// The fragment name.
        name: String,
        /// The fragment's declared parameter count.
        expected: usize,
        /// The number of arguments supplied at the call site.
        found: usize,
    },

    /// A `$parameter` reference survived expansion (used outside a fragment
    /// body, or the parameter name is not one of the fragment's formals).
    #[error("parameter reference {name:?} did not resolve during expansion")]
    UnresolvedParameter {
        /// The parameter name.
        name: String,
    },

    /// The longest chain of nested fragment expansions exceeded the
    /// configured limit.
    #[error("fragment expansion exceeded the maximum depth of {max}")]
    ExpansionTooDeep {
        /// The configured maximum depth.
        max: u32,
    },

    /// Two labels (or auto-labels) in the same segment share a name after
    /// expansion, so a reference to that name would be ambiguous.
    #[error("label {label:?} is defined more than once in segment {segment:?}")]
    AmbiguousLabel {
        /// The segment the conflict occurred in.
        segment: String,
        /// The duplicated label name.
        label: String,
    },

    /// A reference named a label that does not exist in the target segment.
    #[error("reference to unknown label {label:?} in segment {segment:?}")]
    UnknownLabel {
        /// The segment the reference was resolved against.
        segment: String,
        /// The label name that could not be found.
        label: String,
    },

    /// A relative or absolute reference's computed value does not fit in
    /// its declared width.
    #[error("reference to {label:?} in segment {segment:?} does not fit in {width} byte(s)")]
    ReferenceOutOfRange {
        /// The segment the reference lives in.
        segment: String,
        /// The label referenced.
        label: String,
        /// The reference's declared width.
        width: u32,
    },

    /// A padded numeric literal's value does not fit in its declared width.
    #[error("numeric literal does not fit in {width} byte(s)")]
    LiteralOutOfRange {
        /// The literal's declared width.
        width: u32,
    },

    /// A string literal contains a byte outside the printable ASCII range.
    #[error("string literal contains unprintable byte {byte:#04x}")]
    UnprintableCharInString {
        /// The offending byte.
        byte: u8,
    },

    /// The designated entry label does not exist in any segment.
    #[error("entry label {label:?} was not found in any segment")]
    EntryNotFound {
        /// The entry label name.
        label: String,
    },

    /// The designated entry label exists in more than one segment.
    #[error("entry label {label:?} was found in more than one segment")]
    EntryAmbiguous {
        /// The entry label name.
        label: String,
    },

    /// An extension invocation named an extension that could not be
    /// resolved.
    #[error("unknown extension {name:?}")]
    UnknownExtension {
        /// The extension's dotted name.
        name: String,
    },

    /// An extension's `parse` call rejected its invocation text.
    #[error("extension {name:?} failed to parse its invocation: {message}")]
    ExtensionParseError {
        /// The extension's dotted name.
        name: String,
        /// The extension-supplied diagnostic.
        message: String,
    },

    /// An extension's `render` output did not match the size it reported
    /// during layout.
    #[error("extension {name:?} reported size {expected} but rendered {found} byte(s)")]
    ExtensionSizeMismatch {
        /// The extension's dotted name.
        name: String,
        /// The size reported by `size()`.
        expected: usize,
        /// The length of the buffer `render()` actually produced.
        found: usize,
    },
}
