//! Component D: two-pass layout and emission.
//!
//! Pass 1 walks every segment once to assign addresses (to labels,
//! auto-labels, and extension invocations) without emitting a single byte.
//! Pass 2 walks the same segments again, now that every address is fixed,
//! to resolve references and produce the final image.

use std::collections::HashMap;

use crate::elf32;
use crate::error::CoreError;
use crate::extension::{ExtensionHandle, ExtensionResolver, RenderContext};
use crate::model::{Element, ExpandedProgram};

/// The inputs to rendering that are not already carried by the expanded
/// program itself.
pub struct RenderConfig {
    /// The virtual address the first segment is laid out at.
    pub memory_start: u32,
    /// The label naming the program's entry point.
    pub entry_label: String,
    /// If `true`, no ELF header or program-header table is emitted;
    /// segments are laid out starting at file offset 0.
    pub suppress_header: bool,
}

/// Renders an expanded program to a complete ELF32 executable image, or (if
/// [`RenderConfig::suppress_header`] is set) to the bare concatenation of
/// segment images.
///
/// # Errors
///
/// Returns [`CoreError::UnknownExtension`], [`CoreError::ExtensionParseError`],
/// [`CoreError::ExtensionSizeMismatch`], [`CoreError::UnknownLabel`],
/// [`CoreError::ReferenceOutOfRange`], [`CoreError::EntryNotFound`], or
/// [`CoreError::EntryAmbiguous`].
pub fn run(
    program: &ExpandedProgram,
    resolver: &dyn ExtensionResolver,
    config: &RenderConfig,
) -> Result<Vec<u8>, CoreError> {
    let phnum = u16::try_from(program.segments.len()).unwrap_or(u16::MAX);
    let header_size = if config.suppress_header {
        0
    } else {
        elf32::EHDR_SIZE + u32::from(phnum) * elf32::PHDR_SIZE
    };

    let mut handles = instantiate_handles(program, resolver)?;
    let (layouts, labels) = layout(program, config.memory_start, header_size, &mut handles)?;

    let mut out = if config.suppress_header {
        Vec::new()
    } else {
        let entry_addr = resolve_entry(program, &labels, &config.entry_label)?;
        let mut header = elf32::write_header(program.decl.machine, program.decl.endianness, entry_addr, phnum);
        for (segment, layout) in program.segments.iter().zip(&layouts) {
            header.extend(elf32::write_program_header(
                layout.file_start,
                layout.mem_start,
                layout.file_size,
                layout.mem_size,
                segment.flags,
                segment.alignment,
                program.decl.endianness,
            ));
        }
        debug_assert_eq!(header.len(), header_size as usize);
        header
    };

    emit(program, &layouts, &labels, &mut handles, &mut out)?;

    Ok(out)
}

/// One segment's fixed position and per-element sizes, computed in pass 1
/// and reused verbatim in pass 2.
struct SegmentLayout {
    mem_start: u32,
    file_start: u32,
    file_size: u32,
    mem_size: u32,
    element_sizes: Vec<u32>,
}

/// A resolved label's absolute memory address, keyed by segment and name.
type LabelTable = HashMap<(String, String), u32>;

fn instantiate_handles(
    program: &ExpandedProgram,
    resolver: &dyn ExtensionResolver,
) -> Result<Vec<Vec<Option<Box<dyn ExtensionHandle>>>>, CoreError> {
    program
        .segments
        .iter()
        .map(|segment| {
            segment
                .elements
                .iter()
                .map(|element| match element {
                    Element::ExtensionInvocation {
                        name,
                        builtin_namespace,
                        text,
                    } => resolver.resolve(name, *builtin_namespace, text).map(Some),
                    _ => Ok(None),
                })
                .collect()
        })
        .collect()
}

fn layout(
    program: &ExpandedProgram,
    memory_start: u32,
    header_size: u32,
    handles: &mut [Vec<Option<Box<dyn ExtensionHandle>>>],
) -> Result<(Vec<SegmentLayout>, LabelTable), CoreError> {
    let mut layouts = Vec::with_capacity(program.segments.len());
    let mut labels = LabelTable::new();

    let mut mem_cursor = memory_start;
    let mut file_cursor = header_size;

    for (seg_idx, segment) in program.segments.iter().enumerate() {
        mem_cursor = align_up(mem_cursor, segment.alignment);
        file_cursor = align_up(file_cursor, segment.alignment);
        let mem_start = mem_cursor;
        let file_start = file_cursor;

        let mut local_offset = 0u32;
        let mut element_sizes = Vec::with_capacity(segment.elements.len());
        for (elem_idx, element) in segment.elements.iter().enumerate() {
            let address = mem_start + local_offset;
            let size = match element {
                Element::ByteLiteral(bytes) => bytes.len() as u32,
                Element::Label { name, .. } => {
                    labels.insert((segment.name.clone(), name.clone()), address);
                    0
                }
                Element::Reference(reference) => reference.width,
                Element::ExtensionInvocation { .. } => {
                    let ctx = Ctx {
                        endianness: program.decl.endianness,
                        address,
                        segment_alignment: segment.alignment,
                    };
                    let handle = handles[seg_idx][elem_idx]
                        .as_mut()
                        .expect("extension handle instantiated for every invocation element");
                    u32::try_from(handle.size(&ctx)?).unwrap_or(u32::MAX)
                }
            };
            element_sizes.push(size);
            local_offset += size;
        }

        let file_size = local_offset;
        let mut auto_offset = file_size;
        for auto_label in &segment.auto_labels {
            labels.insert((segment.name.clone(), auto_label.name.clone()), mem_start + auto_offset);
            auto_offset += auto_label.width;
        }
        let mem_size = segment.declared_size.max(auto_offset);

        mem_cursor = mem_start + mem_size;
        file_cursor = file_start + file_size;

        layouts.push(SegmentLayout {
            mem_start,
            file_start,
            file_size,
            mem_size,
            element_sizes,
        });
    }

    Ok((layouts, labels))
}

fn resolve_entry(program: &ExpandedProgram, labels: &LabelTable, entry_label: &str) -> Result<u32, CoreError> {
    let mut found = None;
    for segment in &program.segments {
        if let Some(&address) = labels.get(&(segment.name.clone(), entry_label.to_owned())) {
            if found.is_some() {
                return Err(CoreError::EntryAmbiguous {
                    label: entry_label.to_owned(),
                });
            }
            found = Some(address);
        }
    }
    found.ok_or_else(|| CoreError::EntryNotFound {
        label: entry_label.to_owned(),
    })
}

fn emit(
    program: &ExpandedProgram,
    layouts: &[SegmentLayout],
    labels: &LabelTable,
    handles: &mut [Vec<Option<Box<dyn ExtensionHandle>>>],
    out: &mut Vec<u8>,
) -> Result<(), CoreError> {
    for (seg_idx, (segment, layout)) in program.segments.iter().zip(layouts).enumerate() {
        if out.len() < layout.file_start as usize {
            out.resize(layout.file_start as usize, 0);
        }

        let mut local_offset = 0u32;
        for (elem_idx, element) in segment.elements.iter().enumerate() {
            let address = layout.mem_start + local_offset;
            match element {
                Element::ByteLiteral(bytes) => out.extend_from_slice(bytes),
                Element::Label { .. } => {}
                Element::Reference(reference) => {
                    let target_segment = reference.segment.as_deref().unwrap_or(&segment.name);
                    let target = *labels
                        .get(&(target_segment.to_owned(), reference.label.clone()))
                        .ok_or_else(|| CoreError::UnknownLabel {
                            segment: target_segment.to_owned(),
                            label: reference.label.clone(),
                        })?;

                    let encoded = if reference.relative {
                        let value = i128::from(target) - i128::from(address + reference.width)
                            + i128::from(reference.offset);
                        elf32::encode_signed(value, reference.width, program.decl.endianness)
                    } else {
                        let value = i128::from(target) + i128::from(reference.offset);
                        elf32::encode_unsigned(value, reference.width, program.decl.endianness)
                    };
                    out.extend(encoded.map_err(|_| CoreError::ReferenceOutOfRange {
                        segment: segment.name.clone(),
                        label: reference.label.clone(),
                        width: reference.width,
                    })?);
                }
                Element::ExtensionInvocation { name, .. } => {
                    let ctx = Ctx {
                        endianness: program.decl.endianness,
                        address,
                        segment_alignment: segment.alignment,
                    };
                    let handle = handles[seg_idx][elem_idx]
                        .as_mut()
                        .expect("extension handle instantiated for every invocation element");
                    let bytes = handle.render(&ctx)?;
                    let expected = layout.element_sizes[elem_idx] as usize;
                    if bytes.len() != expected {
                        return Err(CoreError::ExtensionSizeMismatch {
                            name: name.clone(),
                            expected,
                            found: bytes.len(),
                        });
                    }
                    out.extend(bytes);
                }
            }
            local_offset += layout.element_sizes[elem_idx];
        }
    }

    Ok(())
}

fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

struct Ctx {
    endianness: elf32::Endianness,
    address: u32,
    segment_alignment: u32,
}

impl RenderContext for Ctx {
    fn endianness(&self) -> elf32::Endianness {
        self.endianness
    }

    fn address(&self) -> u32 {
        self.address
    }

    fn segment_alignment(&self) -> u32 {
        self.segment_alignment
    }
}
