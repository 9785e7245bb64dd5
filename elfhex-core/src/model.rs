//! The program model: the merged (pre-expansion) and expanded (post-
//! expansion) representations that flow between the Preprocessor,
//! Transformer, and Renderer.

use std::collections::HashMap;

use crate::elf32::{Endianness, SegmentFlags};
use crate::syntax::RawElement;

/// A program's machine, endianness, and default alignment, as agreed by
/// every included file.
#[derive(Clone, Copy, Debug)]
pub struct ProgramDecl {
    /// The target's ELF `e_machine` number.
    pub machine: u16,
    /// The program's byte order.
    pub endianness: Endianness,
    /// The default segment alignment, in bytes; segments that don't
    /// declare their own alignment use this one.
    pub alignment: u32,
}

/// A fragment: a named, parameterised, reusable element sequence.
///
/// The raw declaration is already exactly the shape the Transformer needs —
/// a name, formal parameters, and an unexpanded body — so it doubles as the
/// fragment-table entry.
pub type Fragment = crate::syntax::RawFragmentDecl;

/// A segment as merged by the Preprocessor: one file's worth of metadata
/// (first occurrence wins) plus every contributing file's body elements and
/// auto-labels, concatenated in contribution order.
#[derive(Clone, Debug)]
pub struct MergedSegment {
    /// The segment's name.
    pub name: String,
    /// Load permissions; defaults to read-only if no file declared any.
    pub flags: SegmentFlags,
    /// The declared minimum size in bytes.
    pub declared_size: u32,
    /// The declared alignment in bytes.
    pub alignment: u32,
    /// The concatenated, unexpanded body.
    pub body: Vec<RawElement>,
    /// The concatenated auto-label list.
    pub auto_labels: Vec<(String, u32)>,
}

/// The Preprocessor's output: one merged declaration, a segment table keyed
/// by name but ordered by first appearance, and a fragment table keyed by
/// name.
#[derive(Clone, Debug)]
pub struct MergedProgram {
    /// The program's declaration.
    pub decl: ProgramDecl,
    /// Segments, in first-appearance order during the include traversal.
    pub segments: Vec<MergedSegment>,
    /// Maps a segment name to its index in `segments`.
    pub segment_index: HashMap<String, usize>,
    /// The fragment table, keyed by name.
    pub fragments: HashMap<String, Fragment>,
}

impl MergedProgram {
    /// Looks up a merged segment by name.
    pub fn segment(&self, name: &str) -> Option<&MergedSegment> {
        self.segment_index.get(name).map(|&i| &self.segments[i])
    }

    /// Looks up a merged segment by name, mutably.
    pub fn segment_mut(&mut self, name: &str) -> Option<&mut MergedSegment> {
        let i = *self.segment_index.get(name)?;
        Some(&mut self.segments[i])
    }
}

/// A single element of a fully-expanded segment body: the only shapes that
/// survive fragment expansion.
#[derive(Clone, Debug)]
pub enum Element {
    /// A literal sequence of bytes, copied verbatim at render time.
    ByteLiteral(Vec<u8>),
    /// A label marking a position.
    Label {
        /// The (possibly mangled) label name.
        name: String,
        /// Whether the *original* name began with `__`.
        local: bool,
    },
    /// A relative or absolute reference, with width already defaulted.
    Reference(Reference),
    /// An extension invocation, resolved against the configured
    /// [`crate::extension::ExtensionResolver`].
    ExtensionInvocation {
        /// The extension's dotted name.
        name: String,
        /// `true` if resolution should start from the built-in namespace.
        builtin_namespace: bool,
        /// The invocation's raw inner text.
        text: String,
    },
}

/// A resolved (post-expansion, pre-address) reference.
#[derive(Clone, Debug)]
pub struct Reference {
    /// `true` for a relative reference, `false` for an absolute one.
    pub relative: bool,
    /// The segment to resolve `label` in; `None` means "this segment".
    pub segment: Option<String>,
    /// The (possibly mangled) target label name.
    pub label: String,
    /// The constant offset added to the target address.
    pub offset: i64,
    /// The field width in bytes (always 4 for absolute references).
    pub width: u32,
}

/// A segment after fragment expansion: metadata plus a flat element vector
/// and its trailing auto-label list.
#[derive(Clone, Debug)]
pub struct Segment {
    /// The segment's name.
    pub name: String,
    /// Load permissions.
    pub flags: SegmentFlags,
    /// The declared minimum size in bytes.
    pub declared_size: u32,
    /// The declared alignment in bytes.
    pub alignment: u32,
    /// The expanded body.
    pub elements: Vec<Element>,
    /// The auto-label list: BSS-like regions with no file representation.
    pub auto_labels: Vec<AutoLabel>,
}

/// One entry of a segment's trailing auto-label list.
#[derive(Clone, Debug)]
pub struct AutoLabel {
    /// The auto-label's name.
    pub name: String,
    /// Its width in bytes.
    pub width: u32,
}

/// The Transformer's output: a program whose segments contain only
/// literal, label, reference, and extension-invocation elements.
#[derive(Clone, Debug)]
pub struct ExpandedProgram {
    /// The program's declaration.
    pub decl: ProgramDecl,
    /// Segments, in first-appearance order.
    pub segments: Vec<Segment>,
}
