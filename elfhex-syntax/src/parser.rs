//! Recursive-descent grammar: turns source text into the raw syntax tree
//! [`elfhex_core::syntax`] defines.

use std::sync::Arc;

use elfhex_core::elf32::{Endianness, SegmentFlags};
use elfhex_core::syntax::{
    NumBase, RawElement, RawFile, RawFragmentDecl, RawInclude, RawProgramDecl, RawSegmentDecl, Sign,
};

use crate::lexer::Cursor;
use crate::ParseError;

pub fn parse_file(source: &str, file_name: Arc<str>) -> Result<RawFile, ParseError> {
    let mut cur = Cursor::new(source, file_name);
    let mut file = RawFile {
        program: None,
        includes: Vec::new(),
        segments: Vec::new(),
        fragments: Vec::new(),
    };

    cur.skip_trivia();
    if cur.peek_keyword("program") {
        file.program = Some(parse_program_decl(&mut cur)?);
    }

    loop {
        cur.skip_trivia();
        if cur.eof() {
            break;
        }
        if cur.peek_keyword("include") {
            file.includes.push(parse_include(&mut cur)?);
        } else if cur.peek_keyword("segment") {
            file.segments.push(parse_segment(&mut cur)?);
        } else if cur.peek_keyword("fragment") {
            file.fragments.push(parse_fragment(&mut cur)?);
        } else {
            return Err(cur.error("expected `include`, `segment`, or `fragment`"));
        }
    }

    Ok(file)
}

fn parse_program_decl(cur: &mut Cursor<'_>) -> Result<RawProgramDecl, ParseError> {
    cur.expect_keyword("program")?;
    cur.skip_trivia();
    let machine = cur.parse_decimal_u32()?;
    let machine = u16::try_from(machine).map_err(|_| cur.error("machine number does not fit in 16 bits"))?;
    cur.skip_trivia();
    let endianness = match cur.bump() {
        Some(b'<') => Endianness::Little,
        Some(b'>') => Endianness::Big,
        _ => return Err(cur.error("expected `<` or `>`")),
    };
    cur.skip_trivia();
    let alignment = cur.parse_decimal_u32()?;
    Ok(RawProgramDecl {
        machine,
        endianness,
        alignment,
    })
}

fn parse_include(cur: &mut Cursor<'_>) -> Result<RawInclude, ParseError> {
    let span = cur.span();
    cur.expect_keyword("include")?;
    cur.skip_trivia();
    let fragments_only = if cur.peek_keyword("fragments") {
        cur.expect_keyword("fragments")?;
        cur.skip_trivia();
        true
    } else {
        false
    };
    let path = cur.parse_quoted_string()?;
    Ok(RawInclude {
        path,
        fragments_only,
        span,
    })
}

fn parse_segment(cur: &mut Cursor<'_>) -> Result<RawSegmentDecl, ParseError> {
    cur.expect_keyword("segment")?;
    cur.skip_trivia();
    let name = cur.parse_ident()?;
    cur.skip_trivia();

    let mut flags = None;
    let mut size = None;
    let mut alignment = None;
    if cur.eat(b'(') {
        loop {
            cur.skip_trivia();
            if cur.eat(b')') {
                break;
            }
            let key = cur.parse_ident()?;
            cur.skip_trivia();
            cur.expect(b':')?;
            cur.skip_trivia();
            match key.as_str() {
                "flags" => {
                    let text = cur.parse_ident()?;
                    flags = Some(
                        SegmentFlags::parse(&text).ok_or_else(|| cur.error(format!("invalid flags {text:?}")))?,
                    );
                }
                "size" => size = Some(cur.parse_decimal_u32()?),
                "alignment" => alignment = Some(cur.parse_decimal_u32()?),
                other => return Err(cur.error(format!("unknown segment attribute {other:?}"))),
            }
            cur.skip_trivia();
        }
        cur.skip_trivia();
    }

    cur.expect(b'{')?;
    let body = parse_body(cur, &[b'}'])?;
    cur.expect(b'}')?;
    cur.skip_trivia();

    let auto_labels = if cur.peek() == Some(b'[') && cur.peek_at(1) == Some(b'[') {
        parse_auto_labels(cur)?
    } else {
        Vec::new()
    };

    Ok(RawSegmentDecl {
        name,
        flags,
        size,
        alignment,
        body,
        auto_labels,
    })
}

fn parse_fragment(cur: &mut Cursor<'_>) -> Result<RawFragmentDecl, ParseError> {
    cur.expect_keyword("fragment")?;
    cur.skip_trivia();
    let name = cur.parse_ident()?;
    cur.skip_trivia();
    cur.expect(b'(')?;
    let mut params = Vec::new();
    cur.skip_trivia();
    if !cur.eat(b')') {
        loop {
            cur.skip_trivia();
            params.push(cur.parse_ident()?);
            cur.skip_trivia();
            if cur.eat(b',') {
                continue;
            }
            cur.expect(b')')?;
            break;
        }
    }
    cur.skip_trivia();
    cur.expect(b'{')?;
    let body = parse_body(cur, &[b'}'])?;
    cur.expect(b'}')?;
    Ok(RawFragmentDecl { name, params, body })
}

fn parse_auto_labels(cur: &mut Cursor<'_>) -> Result<Vec<(String, u32)>, ParseError> {
    cur.expect(b'[')?;
    cur.expect(b'[')?;
    let mut list = Vec::new();
    loop {
        cur.skip_trivia();
        if cur.peek() == Some(b']') {
            break;
        }
        let name = cur.parse_ident()?;
        cur.skip_trivia();
        cur.expect(b':')?;
        cur.skip_trivia();
        let width = cur.parse_decimal_u32()?;
        list.push((name, width));
    }
    cur.expect(b']')?;
    cur.expect(b']')?;
    Ok(list)
}

/// Parses a sequence of element tokens until the next non-trivia byte is in
/// `terminators` (which is not consumed).
fn parse_body(cur: &mut Cursor<'_>, terminators: &[u8]) -> Result<Vec<RawElement>, ParseError> {
    let mut elements = Vec::new();
    loop {
        cur.skip_trivia();
        match cur.peek() {
            None => return Err(cur.error("unexpected end of input")),
            Some(byte) if terminators.contains(&byte) => break,
            _ => elements.push(parse_element(cur)?),
        }
    }
    Ok(elements)
}

fn parse_element(cur: &mut Cursor<'_>) -> Result<RawElement, ParseError> {
    let span = cur.span();
    match cur.peek() {
        Some(b'"') => {
            let text = cur.parse_quoted_string()?;
            Ok(RawElement::StringLiteral { text, span })
        }
        Some(b'[') => {
            cur.bump();
            let name = cur.parse_ident()?;
            cur.expect(b']')?;
            Ok(RawElement::Label(name))
        }
        Some(b'<') => parse_reference(cur, span),
        Some(b'@') => parse_fragment_ref(cur, span),
        Some(b'$') => {
            cur.bump();
            Ok(RawElement::ParamRef(cur.parse_ident()?))
        }
        Some(b':') => parse_extension_invocation(cur, span),
        Some(b'+' | b'-' | b'=') => parse_padded_literal(cur, span),
        Some(byte) if byte.is_ascii_hexdigit() => parse_hex_bytes(cur),
        Some(byte) => Err(cur.error(format!("unexpected character {:?}", byte as char))),
        None => Err(cur.error("unexpected end of input")),
    }
}

fn parse_hex_bytes(cur: &mut Cursor<'_>) -> Result<RawElement, ParseError> {
    let start_span = cur.span();
    let mut digits = String::new();
    while cur.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
        digits.push(cur.bump().unwrap() as char);
    }
    if digits.len() % 2 != 0 {
        return Err(ParseError {
            message: "hex byte run has an odd number of digits".to_owned(),
            span: start_span,
        });
    }
    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.as_bytes().chunks_exact(2) {
        let text = std::str::from_utf8(pair).unwrap();
        bytes.push(u8::from_str_radix(text, 16).unwrap());
    }
    Ok(RawElement::HexBytes(bytes))
}

/// Parses `(=|+|-)<digits>(b|d|h)(<width digits>)?`.
///
/// The base letter is identified as the leftmost character in `{b,d,h}`
/// whose remaining suffix is entirely decimal digits (the optional width);
/// everything before it is the literal's digit string. This resolves the
/// lexical ambiguity between hexadecimal digits and the base marker itself
/// (`b` and `d` are both valid hex digits) without backtracking.
fn parse_padded_literal(cur: &mut Cursor<'_>, span: elfhex_core::error::Span) -> Result<RawElement, ParseError> {
    let sign = match cur.bump() {
        Some(b'+') => Sign::Plus,
        Some(b'-') => Sign::Minus,
        Some(b'=') => Sign::Equals,
        _ => unreachable!("caller already matched a sign character"),
    };

    let mut token = String::new();
    while cur
        .peek()
        .is_some_and(|b| b.is_ascii_hexdigit() || matches!(b, b'b' | b'd' | b'h'))
    {
        token.push(cur.bump().unwrap() as char);
    }

    let chars: Vec<char> = token.chars().collect();
    let split = find_base_marker(&chars).ok_or_else(|| cur.error("malformed padded numeric literal"))?;
    let (digits_part, rest) = chars.split_at(split);
    let base_char = rest[0];
    let width_part: String = rest[1..].iter().collect();

    let base = match base_char {
        'b' => NumBase::Binary,
        'd' => NumBase::Decimal,
        'h' => NumBase::Hex,
        _ => unreachable!(),
    };
    let digits: String = digits_part.iter().collect();
    if digits.is_empty() {
        return Err(cur.error("padded literal has no digits"));
    }
    let width = if width_part.is_empty() {
        1
    } else {
        width_part
            .parse()
            .map_err(|_| cur.error("padded literal width out of range"))?
    };

    Ok(RawElement::PaddedLiteral {
        sign,
        digits,
        base,
        width,
        span,
    })
}

/// Finds the leftmost index of a base-marker character (`b`, `d`, or `h`)
/// whose suffix is entirely decimal digits.
fn find_base_marker(chars: &[char]) -> Option<usize> {
    chars.iter().enumerate().find_map(|(i, &c)| {
        if matches!(c, 'b' | 'd' | 'h') && chars[i + 1..].iter().all(char::is_ascii_digit) {
            Some(i)
        } else {
            None
        }
    })
}

fn parse_reference(cur: &mut Cursor<'_>, span: elfhex_core::error::Span) -> Result<RawElement, ParseError> {
    cur.bump(); // '<'
    let relative = !cur.eat(b'<');
    let mut inner = String::new();
    loop {
        match cur.peek() {
            None => return Err(cur.error("unterminated reference")),
            Some(b'>') => break,
            Some(_) => inner.push(cur.bump().unwrap() as char),
        }
    }
    cur.expect(b'>')?;
    if !relative {
        cur.expect(b'>')?;
    }

    let (segment, label, offset, width) = parse_reference_inner(&inner, cur)?;
    Ok(RawElement::Reference {
        relative,
        segment,
        label,
        offset,
        width,
        span,
    })
}

fn parse_reference_inner(
    inner: &str,
    cur: &Cursor<'_>,
) -> Result<(Option<String>, String, Option<i64>, Option<u32>), ParseError> {
    let compact: String = inner.chars().filter(|c| !c.is_whitespace()).collect();
    let chars: Vec<char> = compact.chars().collect();

    // Strip a trailing `:<digits>` width suffix, identified as the *last*
    // colon whose suffix is pure decimal digits.
    let width_colon = chars.iter().enumerate().rev().find_map(|(i, &c)| {
        if c == ':' && !chars[i + 1..].is_empty() && chars[i + 1..].iter().all(char::is_ascii_digit) {
            Some(i)
        } else {
            None
        }
    });
    let (remainder, width) = match width_colon {
        Some(i) => {
            let width: u32 = chars[i + 1..]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| cur.error("reference width out of range"))?;
            (&chars[..i], Some(width))
        }
        None => (&chars[..], None),
    };

    // Strip a trailing `+<digits>` / `-<digits>` offset.
    let sign_pos = remainder.iter().rposition(|&c| c == '+' || c == '-').filter(|&i| {
        i + 1 < remainder.len() && remainder[i + 1..].iter().all(char::is_ascii_digit)
    });
    let (remainder, offset) = match sign_pos {
        Some(i) => {
            let magnitude: i64 = remainder[i + 1..]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| cur.error("reference offset out of range"))?;
            let value = if remainder[i] == '-' { -magnitude } else { magnitude };
            (&remainder[..i], Some(value))
        }
        None => (remainder, None),
    };

    let remainder: String = remainder.iter().collect();
    let (segment, label) = match remainder.split_once(':') {
        Some((seg, lbl)) => (Some(seg.to_owned()), lbl.to_owned()),
        None => (None, remainder),
    };
    if label.is_empty() {
        return Err(cur.error("reference has no target label"));
    }

    Ok((segment, label, offset, width))
}

fn parse_fragment_ref(cur: &mut Cursor<'_>, span: elfhex_core::error::Span) -> Result<RawElement, ParseError> {
    cur.bump(); // '@'
    let once = cur.eat(b'!');
    let name = cur.parse_ident()?;
    cur.skip_trivia();
    cur.expect(b'(')?;

    let mut args = Vec::new();
    cur.skip_trivia();
    if !cur.eat(b')') {
        loop {
            let arg = parse_body(cur, &[b',', b')'])?;
            args.push(arg);
            cur.skip_trivia();
            if cur.eat(b',') {
                continue;
            }
            cur.expect(b')')?;
            break;
        }
    }

    cur.skip_trivia();
    let alias = if cur.eat(b'(') {
        let name = cur.parse_ident()?;
        cur.expect(b')')?;
        Some(name)
    } else {
        None
    };

    Ok(RawElement::FragmentRef {
        name,
        args,
        alias,
        once,
        span,
    })
}

fn parse_extension_invocation(cur: &mut Cursor<'_>, span: elfhex_core::error::Span) -> Result<RawElement, ParseError> {
    cur.bump(); // ':'
    let builtin_namespace = !cur.eat(b':');
    let name = cur.parse_dotted_ident()?;
    cur.skip_trivia();
    cur.expect(b'{')?;
    let text = cur.read_balanced_braces()?;
    Ok(RawElement::ExtensionInvocation {
        name,
        builtin_namespace,
        text,
        span,
    })
}
