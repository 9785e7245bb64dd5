//! Component B: depth-first include resolution, program-declaration
//! compatibility checking, and segment/fragment merging.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::elf32::SegmentFlags;
use crate::error::{CoreError, Span};
use crate::loader::{FileSystem, LoadResult, Loader, SyntaxParser};
use crate::model::{MergedProgram, MergedSegment, ProgramDecl};
use crate::syntax::RawSegmentDecl;

/// Runs the Preprocessor: resolves every include transitively reachable
/// from `entry`, producing one merged program.
///
/// # Errors
///
/// Returns [`CoreError::IncompatibleProgram`], [`CoreError::FileNotFound`],
/// [`CoreError::Parse`], [`CoreError::FragmentRedefinition`],
/// [`CoreError::MetadataConflict`], or [`CoreError::ExpansionTooDeep`] (used
/// here for include-recursion depth, since the taxonomy defines no separate
/// name for that case).
pub fn run(
    fs: &dyn FileSystem,
    parser: &dyn SyntaxParser,
    entry: &Path,
    search_path: Vec<PathBuf>,
    max_include_depth: u32,
) -> Result<MergedProgram, CoreError> {
    let mut loader = Loader::new(fs, parser, search_path);
    let mut accum = Accum {
        segments: Vec::new(),
        segment_index: HashMap::new(),
        fragments: HashMap::new(),
    };
    let mut decl: Option<ProgramDecl> = None;

    process(
        &mut loader,
        Edge::Entry(entry),
        &mut accum,
        &mut decl,
        0,
        max_include_depth,
        false,
    )?;

    let decl = decl.ok_or_else(|| CoreError::Parse {
        message: "entry file does not open with a program declaration".to_owned(),
        span: Span {
            file: Arc::from(entry.to_string_lossy().as_ref()),
            line: 1,
            column: 1,
        },
    })?;

    Ok(MergedProgram {
        decl,
        segments: accum.segments,
        segment_index: accum.segment_index,
        fragments: accum.fragments,
    })
}

/// The segment/fragment tables being accumulated across the traversal.
struct Accum {
    segments: Vec<MergedSegment>,
    segment_index: HashMap<String, usize>,
    fragments: HashMap<String, crate::model::Fragment>,
}

/// How a file is being reached: directly (the entry file) or via an
/// `include` statement.
enum Edge<'a> {
    Entry(&'a Path),
    Include(&'a str),
}

#[allow(clippy::too_many_arguments)]
fn process(
    loader: &mut Loader<'_>,
    edge: Edge<'_>,
    accum: &mut Accum,
    decl: &mut Option<ProgramDecl>,
    depth: u32,
    max_depth: u32,
    suppress_segments: bool,
) -> Result<(), CoreError> {
    if depth > max_depth {
        return Err(CoreError::ExpansionTooDeep { max: max_depth });
    }

    let load_result = match edge {
        Edge::Entry(path) => loader.load_entry(path)?,
        Edge::Include(path) => loader.load_include(path)?,
    };
    let raw = match load_result {
        LoadResult::AlreadyLoaded => return Ok(()),
        LoadResult::Fresh(raw) => raw,
    };

    if let Some(program) = raw.program {
        match decl {
            None => {
                *decl = Some(ProgramDecl {
                    machine: program.machine,
                    endianness: program.endianness,
                    alignment: program.alignment,
                });
            }
            Some(existing) => {
                if existing.machine != program.machine || existing.endianness != program.endianness {
                    return Err(CoreError::IncompatibleProgram {
                        file: file_label(&edge),
                        expected_machine: existing.machine,
                        expected_endianness: existing.endianness,
                        found_machine: program.machine,
                        found_endianness: program.endianness,
                    });
                }
                existing.alignment = existing.alignment.max(program.alignment);
            }
        }
    }

    for include in &raw.includes {
        let child_suppress = suppress_segments || include.fragments_only;
        process(
            loader,
            Edge::Include(&include.path),
            accum,
            decl,
            depth + 1,
            max_depth,
            child_suppress,
        )?;
    }

    if !suppress_segments {
        let default_alignment = decl.as_ref().map_or(1, |d| d.alignment);
        for segment in &raw.segments {
            merge_segment(accum, segment, default_alignment)?;
        }
    }

    for fragment in &raw.fragments {
        if accum.fragments.contains_key(&fragment.name) {
            return Err(CoreError::FragmentRedefinition {
                name: fragment.name.clone(),
            });
        }
        accum.fragments.insert(fragment.name.clone(), fragment.clone());
    }

    Ok(())
}

fn file_label(edge: &Edge<'_>) -> String {
    match edge {
        Edge::Entry(path) => path.to_string_lossy().into_owned(),
        Edge::Include(path) => (*path).to_owned(),
    }
}

fn merge_segment(accum: &mut Accum, raw: &RawSegmentDecl, default_alignment: u32) -> Result<(), CoreError> {
    if let Some(&index) = accum.segment_index.get(&raw.name) {
        let existing = &mut accum.segments[index];
        if let Some(flags) = raw.flags {
            if flags.0 != existing.flags.0 {
                return Err(CoreError::MetadataConflict {
                    segment: raw.name.clone(),
                });
            }
        }
        existing.body.extend(raw.body.iter().cloned());
        existing.auto_labels.extend(raw.auto_labels.iter().cloned());
        return Ok(());
    }

    let segment = MergedSegment {
        name: raw.name.clone(),
        flags: raw.flags.unwrap_or(SegmentFlags::READ),
        declared_size: raw.size.unwrap_or(0),
        alignment: raw.alignment.unwrap_or(default_alignment),
        body: raw.body.clone(),
        auto_labels: raw.auto_labels.clone(),
    };
    accum.segment_index.insert(segment.name.clone(), accum.segments.len());
    accum.segments.push(segment);
    Ok(())
}
