//! End-to-end pipeline tests, driven entirely in memory: a tiny
//! [`FileSystem`] over a `HashMap`, the real `elfhex-syntax` parser, and no
//! extensions (none of these scenarios need one).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use elfhex_core::error::CoreError;
use elfhex_core::extension::{ExtensionHandle, ExtensionResolver, RenderContext};
use elfhex_core::loader::FileSystem;
use elfhex_core::{compile, CompileOptions};

/// An in-memory source tree, keyed by the path written in `include`
/// statements.
struct MemFs(HashMap<&'static str, &'static str>);

impl FileSystem for MemFs {
    fn resolve(&self, include_path: &str, search_path: &[PathBuf]) -> Result<PathBuf, CoreError> {
        if self.0.contains_key(include_path) {
            return Ok(PathBuf::from(include_path));
        }
        for dir in search_path {
            let candidate = dir.join(include_path);
            if self.0.contains_key(candidate.to_str().unwrap_or_default()) {
                return Ok(candidate);
            }
        }
        Err(CoreError::FileNotFound {
            include_path: include_path.to_owned(),
        })
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, CoreError> {
        Ok(path.to_path_buf())
    }

    fn read_to_string(&self, path: &Path) -> Result<String, CoreError> {
        self.0
            .get(path.to_str().unwrap_or_default())
            .map(|text| (*text).to_owned())
            .ok_or_else(|| CoreError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not in MemFs"),
            })
    }
}

/// No scenario here invokes an extension; resolving one is a test bug.
struct NoExtensions;

impl ExtensionResolver for NoExtensions {
    fn resolve(
        &self,
        name: &str,
        _builtin_namespace: bool,
        _text: &str,
    ) -> Result<Box<dyn ExtensionHandle>, CoreError> {
        Err(CoreError::UnknownExtension {
            name: name.to_owned(),
        })
    }
}

/// Where a single `rx` segment's body lands when the program declares
/// 4096-byte alignment: the 84-byte header (1 PT_LOAD entry) rounds up to
/// the next 4096-byte boundary.
const ONE_SEGMENT_BODY_START: usize = 4096;

fn options() -> CompileOptions {
    CompileOptions {
        search_path: Vec::new(),
        max_include_depth: 64,
        max_fragment_depth: 64,
        memory_start: 0x0800_0000,
        entry_label: "_start".to_owned(),
        suppress_header: false,
        machine_override: None,
    }
}

fn assemble(files: &[(&'static str, &'static str)]) -> Result<Vec<u8>, CoreError> {
    let fs = MemFs(files.iter().copied().collect());
    let parser = elfhex_syntax::Parser::new();
    let resolver = NoExtensions;
    compile(Path::new("main.eh"), &fs, &parser, &resolver, &options())
}

fn assemble_with(files: &[(&'static str, &'static str)], opts: CompileOptions) -> Result<Vec<u8>, CoreError> {
    let fs = MemFs(files.iter().copied().collect());
    let parser = elfhex_syntax::Parser::new();
    let resolver = NoExtensions;
    compile(Path::new("main.eh"), &fs, &parser, &resolver, &opts)
}

/// S1 — minimal hello: entry equals `_start`'s address, and the 4 bytes
/// following `b8` decode as unsigned 1 little-endian.
#[test]
fn minimal_hello() {
    let source = "program 3 < 4096\nsegment text(flags: rx) { [_start] b8 =1d4 cd 80 }\n";
    let image = assemble(&[("main.eh", source)]).expect("compiles");

    let entry = u32::from_le_bytes(image[24..28].try_into().unwrap());
    assert_eq!(entry, 0x0800_0000);

    // One PT_LOAD entry (84-byte header) aligned up to the program's
    // declared 4096-byte alignment puts the segment body at file offset
    // 4096.
    let literal = &image[ONE_SEGMENT_BODY_START + 1..][..4];
    assert_eq!(u32::from_le_bytes(literal.try_into().unwrap()), 1);
}

/// S2 — cross-segment absolute reference resolves to the target segment's
/// base address, little-endian, regardless of declaration order.
#[test]
fn cross_segment_absolute_reference() {
    let source = r#"program 3 < 4096
segment strings(alignment: 4096) { [hello] "Hi" }
segment text(flags: rx alignment: 4096) { [_start] <<strings:hello>> }
"#;
    let image = assemble(&[("main.eh", source)]).expect("compiles");

    // Both segments declare 4096-byte alignment; the header (52 + 2*32 =
    // 116 bytes) pushes `strings` to file offset 4096, and its 2-byte body
    // pushes `text` to the next 4096 boundary after that.
    let strings_file_start = 4096usize;
    let text_file_start = 8192usize;
    let strings_vaddr = 0x0800_0000u32; // already 4096-aligned

    let bytes = &image[text_file_start..text_file_start + 4];
    assert_eq!(u32::from_le_bytes(bytes.try_into().unwrap()), strings_vaddr);
    assert!(image.len() > strings_file_start); // strings segment landed where expected
}

/// S3 — a relative reference one byte wide, pointing at the label it
/// follows, truncates to the expected signed byte.
#[test]
fn relative_reference_backward() {
    let source = "program 3 < 4096\nsegment text(flags: rx) { [_start] [a] 90 90 72 <a> }\n";
    let image = assemble(&[("main.eh", source)]).expect("compiles");

    let body_off = ONE_SEGMENT_BODY_START;
    // [a] marks offset 0 (no bytes of its own); then 90, 90, 72, <a>.
    assert_eq!(image[body_off + 2], 0x72);
    assert_eq!(image[body_off + 3], 0xFC);
}

/// S4 — two instances of a fragment using a `__`-prefixed local label don't
/// collide; both one-byte self-relative jumps still resolve.
#[test]
fn fragment_hygiene_distinguishes_instances() {
    let source = "fragment f() { [__x] eb <__x> }\nsegment text(flags: rx) { [_start] @f() @f() }\n";
    let image = assemble(&[("main.eh", source)]).expect("compiles");

    let body_off = ONE_SEGMENT_BODY_START;
    assert_eq!(image[body_off], 0xeb);
    assert_eq!(image[body_off + 1], 0xFE);
    assert_eq!(image[body_off + 2], 0xeb);
    assert_eq!(image[body_off + 3], 0xFE);
}

/// An aliased call site rewrites its fragment's `__`-local label under the
/// alias rather than an opaque per-instance prefix, so a reference written
/// outside the fragment as `<alias.name>` reaches it.
#[test]
fn aliased_fragment_local_label_is_reachable_as_alias_dot_name() {
    let source = "fragment f() { [__x] eb <__x> }\nsegment text(flags: rx) { [_start] @f()(myalias) <myalias.x> }\n";
    let image = assemble(&[("main.eh", source)]).expect("compiles");

    let body_off = ONE_SEGMENT_BODY_START;
    assert_eq!(image[body_off], 0xeb);
    assert_eq!(image[body_off + 1], 0xFE); // the fragment's own backward jump to [__x]
    assert_eq!(image[body_off + 2], 0xFD); // the outer <myalias.x> reference, two bytes further back
}

/// `@!` call sites to the same fragment still share one once-only slot
/// regardless of whether they carry different aliases or none at all.
#[test]
fn once_only_dedup_ignores_alias_end_to_end() {
    let source =
        "fragment g() { cd 80 }\nsegment text(flags: rx) { [_start] @!g()(a) @!g()(b) @!g() }\n";
    let image = assemble(&[("main.eh", source)]).expect("compiles");

    let body_off = ONE_SEGMENT_BODY_START;
    assert_eq!(&image[body_off..body_off + 2], &[0xcd, 0x80]);
    assert_eq!(image.len(), body_off + 2);
}

/// S5 — `@!` suppresses every reference after the first.
#[test]
fn once_only_fragment_emits_single_copy() {
    let source =
        "fragment g() { cd 80 }\nsegment text(flags: rx) { [_start] @!g() @!g() @!g() }\n";
    let image = assemble(&[("main.eh", source)]).expect("compiles");

    let body_off = ONE_SEGMENT_BODY_START;
    assert_eq!(&image[body_off..body_off + 2], &[0xcd, 0x80]);
    assert_eq!(image.len(), body_off + 2);
}

/// S6 — an unsigned literal too large for its declared width is fatal.
#[test]
fn padded_literal_overflow_is_rejected() {
    let source = "program 3 < 4096\nsegment text(flags: rx) { [_start] =300d1 }\n";
    let err = assemble(&[("main.eh", source)]).unwrap_err();
    assert!(matches!(err, CoreError::LiteralOutOfRange { width: 1 }));
}

/// `include fragments` contributes fragments but not the included file's
/// own segments, even transitively.
#[test]
fn fragments_only_include_suppresses_segments() {
    let lib = "segment hidden(flags: rw) { 00 00 }\nfragment marker() { 90 }\n";
    let main = "program 3 < 4096\ninclude fragments \"lib.eh\"\nsegment text(flags: rx) { [_start] @marker() }\n";
    let image = assemble(&[("main.eh", main), ("lib.eh", lib)]).expect("compiles");

    let body_off = ONE_SEGMENT_BODY_START;
    // Only one PT_LOAD entry: `hidden` must not appear.
    let phnum = u16::from_le_bytes(image[44..46].try_into().unwrap());
    assert_eq!(phnum, 1);
    assert_eq!(image[body_off], 0x90);
}

/// `--no-header` drops the ELF header and program-header table; the image
/// is the bare concatenation of segment contents.
#[test]
fn no_header_suppresses_elf_framing() {
    let source = "program 3 < 4096\nsegment text(flags: rx) { [_start] 90 90 }\n";
    let mut opts = options();
    opts.suppress_header = true;
    let image = assemble_with(&[("main.eh", source)], opts).expect("compiles");
    assert_eq!(image, vec![0x90, 0x90]);
}

/// `--machine-override` wins over the source's own `program` declaration.
#[test]
fn machine_override_wins() {
    let source = "program 3 < 4096\nsegment text(flags: rx) { [_start] 90 }\n";
    let mut opts = options();
    opts.machine_override = Some(0x28);
    let image = assemble_with(&[("main.eh", source)], opts).expect("compiles");
    let machine = u16::from_le_bytes(image[18..20].try_into().unwrap());
    assert_eq!(machine, 0x28);
}

/// An entry label that doesn't exist anywhere is fatal.
#[test]
fn unknown_entry_label_is_rejected() {
    let source = "program 3 < 4096\nsegment text(flags: rx) { 90 }\n";
    let err = assemble(&[("main.eh", source)]).unwrap_err();
    assert!(matches!(err, CoreError::EntryNotFound { .. }));
}

/// Two labels with the same name in the same segment are ambiguous.
#[test]
fn duplicate_label_is_rejected() {
    let source = "program 3 < 4096\nsegment text(flags: rx) { [_start] 90 [_start] 90 }\n";
    let err = assemble(&[("main.eh", source)]).unwrap_err();
    assert!(matches!(err, CoreError::AmbiguousLabel { .. }));
}

/// A fragment call with the wrong argument count is fatal.
#[test]
fn fragment_arity_mismatch_is_rejected() {
    let source =
        "fragment f(a) { $a }\nsegment text(flags: rx) { [_start] @f(90, 90) }\n";
    let err = assemble(&[("main.eh", source)]).unwrap_err();
    assert!(matches!(err, CoreError::ArityError { .. }));
}
