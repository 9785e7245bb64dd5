//! The preprocessing, fragment-expansion, and ELF32-rendering core of the
//! ELFHex assembler.
//!
//! This crate contains no concrete file I/O, no surface-grammar parser, and
//! no extension implementations: those are supplied by a caller through the
//! [`loader::FileSystem`], [`loader::SyntaxParser`], and
//! [`extension::ExtensionResolver`] traits. `elfhex-core` owns only the
//! pipeline between them:
//!
//! 1. [`loader`] locates and parses every file reachable from the entry
//!    point (Component A).
//! 2. [`preprocess`] merges their segments and fragments into one program
//!    (Component B).
//! 3. [`transform`] expands fragment references hygienically and resolves
//!    numeric and string literals (Component C).
//! 4. [`render`] lays out segments and emits the final ELF32 image
//!    (Component D), consulting [`extension`] (Component E) for anything
//!    outside the built-in element shapes.

pub mod elf32;
pub mod error;
pub mod extension;
pub mod loader;
pub mod model;
pub mod preprocess;
pub mod render;
pub mod syntax;
pub mod transform;

use std::path::PathBuf;

pub use error::CoreError;
pub use extension::{ExtensionHandle, ExtensionResolver, RenderContext};
pub use loader::{FileSystem, SyntaxParser};
pub use render::RenderConfig;

/// The tunable limits and target parameters a full compilation needs beyond
/// what the source files themselves declare.
pub struct CompileOptions {
    /// Directories searched, in order, to resolve `include` statements.
    pub search_path: Vec<PathBuf>,
    /// The maximum depth of the include graph.
    pub max_include_depth: u32,
    /// The maximum depth of nested fragment expansion.
    pub max_fragment_depth: u32,
    /// The virtual address the first segment is laid out at.
    pub memory_start: u32,
    /// The label naming the program's entry point.
    pub entry_label: String,
    /// If `true`, no ELF header or program-header table is emitted.
    pub suppress_header: bool,
    /// If given, overrides the `e_machine` value declared by the sources.
    pub machine_override: Option<u16>,
}

/// Runs the complete pipeline — load, preprocess, transform, render — and
/// returns the finished ELF32 image.
///
/// # Errors
///
/// Propagates any [`CoreError`] raised by loading, preprocessing,
/// transforming, or rendering.
pub fn compile(
    entry: &std::path::Path,
    fs: &dyn FileSystem,
    parser: &dyn SyntaxParser,
    resolver: &dyn ExtensionResolver,
    options: &CompileOptions,
) -> Result<Vec<u8>, CoreError> {
    let mut merged = preprocess::run(
        fs,
        parser,
        entry,
        options.search_path.clone(),
        options.max_include_depth,
    )?;
    if let Some(machine) = options.machine_override {
        merged.decl.machine = machine;
    }
    let expanded = transform::run(merged, options.max_fragment_depth)?;
    render::run(
        &expanded,
        resolver,
        &RenderConfig {
            memory_start: options.memory_start,
            entry_label: options.entry_label.clone(),
            suppress_header: options.suppress_header,
        },
    )
}
