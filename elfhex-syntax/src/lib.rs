//! The concrete surface grammar for `.eh` source files.
//!
//! `elfhex-core` is deliberately ignorant of this grammar; it only consumes
//! the [`elfhex_core::syntax::RawFile`] tree this crate produces. Keeping
//! the two separate is what lets the core be tested against hand-built
//! trees without ever invoking a parser.

mod lexer;
mod parser;

use std::sync::Arc;

use elfhex_core::error::{CoreError, Span};
use elfhex_core::loader::SyntaxParser;
use elfhex_core::syntax::RawFile;

/// A surface-syntax error, with the source location it occurred at.
#[derive(Debug, thiserror::Error)]
#[error("{span}: {message}")]
pub struct ParseError {
    /// Description of what was expected versus found.
    pub message: String,
    /// Where in the source the failure occurred.
    pub span: Span,
}

/// Parses `source` (the contents of `file_name`) into a raw syntax tree.
///
/// # Errors
///
/// Returns [`ParseError`] if `source` is not well-formed `.eh` syntax.
pub fn parse(source: &str, file_name: Arc<str>) -> Result<RawFile, ParseError> {
    parser::parse_file(source, file_name)
}

/// Adapts [`parse`] to `elfhex-core`'s [`SyntaxParser`] collaborator trait.
#[derive(Default)]
pub struct Parser;

impl Parser {
    /// Creates a new parser. Parsing is stateless, so every call produces
    /// an equivalent instance.
    pub fn new() -> Self {
        Self
    }
}

impl SyntaxParser for Parser {
    fn parse(&self, source: &str, file_name: Arc<str>) -> Result<RawFile, CoreError> {
        parse(source, file_name).map_err(|err| CoreError::Parse {
            message: err.message,
            span: err.span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elfhex_core::syntax::{NumBase, RawElement, Sign};

    fn file(name: &str) -> Arc<str> {
        Arc::from(name)
    }

    #[test]
    fn parses_minimal_hello_program() {
        let source = "program 3 < 4096\nsegment text(flags: rx) { [_start] b8 =1d4 cd 80 }\n";
        let parsed = parse(source, file("hello.eh")).expect("parses");

        let program = parsed.program.expect("program declaration");
        assert_eq!(program.machine, 3);
        assert_eq!(program.alignment, 4096);

        assert_eq!(parsed.segments.len(), 1);
        let segment = &parsed.segments[0];
        assert_eq!(segment.name, "text");
        assert_eq!(segment.body.len(), 4);
        assert!(matches!(&segment.body[0], RawElement::Label(name) if name == "_start"));
        assert!(matches!(&segment.body[1], RawElement::HexBytes(bytes) if bytes == &[0xb8]));
        assert!(matches!(
            &segment.body[2],
            RawElement::PaddedLiteral { sign: Sign::Equals, digits, base: NumBase::Decimal, width: 4, .. }
                if digits == "1"
        ));
    }

    #[test]
    fn parses_cross_segment_absolute_reference() {
        let source = r#"program 3 < 4096
segment strings(alignment: 4096) { [hello] "Hi" }
segment text(flags: rx alignment: 4096) { <<strings:hello>> }
"#;
        let parsed = parse(source, file("cross.eh")).expect("parses");
        let text = &parsed.segments[1];
        match &text.body[0] {
            RawElement::Reference {
                relative,
                segment,
                label,
                offset,
                width,
                ..
            } => {
                assert!(!relative);
                assert_eq!(segment.as_deref(), Some("strings"));
                assert_eq!(label, "hello");
                assert_eq!(*offset, None);
                assert_eq!(*width, None);
            }
            other => panic!("expected a reference, found {other:?}"),
        }
    }

    #[test]
    fn parses_fragment_with_params_and_alias() {
        let source = "fragment f(a) { eb $a }\nsegment text { @f(90)(x) @!g() }\nfragment g() { cd 80 }\n";
        let parsed = parse(source, file("frag.eh")).expect("parses");
        assert_eq!(parsed.fragments.len(), 2);
        let segment = &parsed.segments[0];
        match &segment.body[0] {
            RawElement::FragmentRef { name, args, alias, once, .. } => {
                assert_eq!(name, "f");
                assert_eq!(args.len(), 1);
                assert_eq!(alias.as_deref(), Some("x"));
                assert!(!once);
            }
            other => panic!("expected a fragment reference, found {other:?}"),
        }
        match &segment.body[1] {
            RawElement::FragmentRef { name, once, .. } => {
                assert_eq!(name, "g");
                assert!(once);
            }
            other => panic!("expected a fragment reference, found {other:?}"),
        }
    }

    #[test]
    fn parses_auto_label_list() {
        let source = "segment bss(flags: rw) { } [[buf:64 count:4]]\n";
        let parsed = parse(source, file("bss.eh")).expect("parses");
        assert_eq!(
            parsed.segments[0].auto_labels,
            vec![("buf".to_owned(), 64), ("count".to_owned(), 4)]
        );
    }

    #[test]
    fn parses_extension_invocation_with_nested_braces() {
        let source = r#"segment text { :pad { width: 4 note: "{nested}" } }"#;
        let parsed = parse(source, file("ext.eh")).expect("parses");
        match &parsed.segments[0].body[0] {
            RawElement::ExtensionInvocation { name, builtin_namespace, text, .. } => {
                assert_eq!(name, "pad");
                assert!(builtin_namespace);
                assert!(text.contains("{nested}"));
            }
            other => panic!("expected an extension invocation, found {other:?}"),
        }
    }

    #[test]
    fn rejects_odd_length_hex_run() {
        let source = "segment text { abc }";
        let err = parse(source, file("bad.eh")).unwrap_err();
        assert!(err.message.contains("odd"));
    }
}
