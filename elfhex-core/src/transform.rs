//! Component C: hygienic fragment expansion, numeric literal resolution,
//! and reference default-filling.

use std::collections::{HashMap, HashSet};

use crate::elf32::{self, Endianness};
use crate::error::CoreError;
use crate::model::{AutoLabel, Element, ExpandedProgram, Fragment, MergedProgram, Reference, Segment};
use crate::syntax::{NumBase, RawElement, Sign};

/// Runs the Transformer over a merged program, producing one whose segments
/// contain only fully-resolved [`Element`]s.
///
/// # Errors
///
/// Returns any of the expansion-time [`CoreError`] variants: arity and
/// depth failures, unknown fragments, unresolved parameters, literal and
/// string-literal validation failures, or a post-expansion ambiguous label.
pub fn run(merged: MergedProgram, max_fragment_depth: u32) -> Result<ExpandedProgram, CoreError> {
    let mut counter: u64 = 0;
    let mut once_emitted: HashSet<String> = HashSet::new();

    let mut segments = Vec::with_capacity(merged.segments.len());
    for raw_segment in &merged.segments {
        let root = Instance {
            local_prefix: "__root".to_owned(),
            alias: None,
        };
        let mut elements = Vec::new();
        expand_elements(
            &raw_segment.body,
            &merged.fragments,
            &root,
            None,
            0,
            max_fragment_depth,
            merged.decl.endianness,
            &mut counter,
            &mut once_emitted,
            &mut elements,
        )?;

        let auto_labels = raw_segment
            .auto_labels
            .iter()
            .map(|(name, width)| AutoLabel {
                name: name.clone(),
                width: *width,
            })
            .collect();

        segments.push(Segment {
            name: raw_segment.name.clone(),
            flags: raw_segment.flags,
            declared_size: raw_segment.declared_size,
            alignment: raw_segment.alignment,
            elements,
            auto_labels,
        });
    }

    for segment in &segments {
        validate_unique_labels(segment)?;
    }

    Ok(ExpandedProgram {
        decl: merged.decl,
        segments,
    })
}

/// The hygiene identity of one fragment-expansion instance: the prefix
/// local (`__`-prefixed) names are mangled under, and the alias (if any)
/// non-local names are rewritten under.
#[derive(Clone)]
struct Instance {
    local_prefix: String,
    alias: Option<String>,
}

/// The formal/actual parameter bindings active while expanding one
/// fragment's body, plus enough of the call site's own context to expand
/// an argument in the *caller's* lexical scope when it is substituted.
#[derive(Clone)]
struct Frame {
    params: Vec<String>,
    args: Vec<Vec<RawElement>>,
    caller_instance: Instance,
    caller_frame: Option<Box<Frame>>,
    caller_depth: u32,
}

fn rewrite_name(name: &str, instance: &Instance) -> String {
    if let Some(local) = name.strip_prefix("__") {
        match &instance.alias {
            Some(alias) => format!("{alias}.{local}"),
            None => format!("{}.{local}", instance.local_prefix),
        }
    } else if let Some(alias) = &instance.alias {
        format!("{alias}.{name}")
    } else {
        name.to_owned()
    }
}

#[allow(clippy::too_many_arguments)]
fn expand_elements(
    elements: &[RawElement],
    fragments: &HashMap<String, Fragment>,
    instance: &Instance,
    frame: Option<&Frame>,
    depth: u32,
    max_depth: u32,
    endianness: Endianness,
    counter: &mut u64,
    once_emitted: &mut HashSet<String>,
    out: &mut Vec<Element>,
) -> Result<(), CoreError> {
    for element in elements {
        match element {
            RawElement::HexBytes(bytes) => out.push(Element::ByteLiteral(bytes.clone())),

            RawElement::PaddedLiteral {
                sign,
                digits,
                base,
                width,
                ..
            } => out.push(Element::ByteLiteral(resolve_literal(
                *sign, digits, *base, *width, endianness,
            )?)),

            RawElement::StringLiteral { text, .. } => {
                for byte in text.bytes() {
                    if !(0x20..=0x7e).contains(&byte) {
                        return Err(CoreError::UnprintableCharInString { byte });
                    }
                }
                out.push(Element::ByteLiteral(text.clone().into_bytes()));
            }

            RawElement::Label(name) => out.push(Element::Label {
                name: rewrite_name(name, instance),
                local: name.starts_with("__"),
            }),

            RawElement::Reference {
                relative,
                segment,
                label,
                offset,
                width,
                ..
            } => {
                let width = if *relative { width.unwrap_or(1) } else { 4 };
                out.push(Element::Reference(Reference {
                    relative: *relative,
                    segment: segment.clone(),
                    label: rewrite_name(label, instance),
                    offset: offset.unwrap_or(0),
                    width,
                }));
            }

            RawElement::ParamRef(name) => {
                let frame = frame.ok_or_else(|| CoreError::UnresolvedParameter { name: name.clone() })?;
                let index = frame
                    .params
                    .iter()
                    .position(|p| p == name)
                    .ok_or_else(|| CoreError::UnresolvedParameter { name: name.clone() })?;
                let arg_body = frame.args[index].clone();
                expand_elements(
                    &arg_body,
                    fragments,
                    &frame.caller_instance,
                    frame.caller_frame.as_deref(),
                    frame.caller_depth,
                    max_depth,
                    endianness,
                    counter,
                    once_emitted,
                    out,
                )?;
            }

            RawElement::FragmentRef {
                name,
                args,
                alias,
                once,
                ..
            } => {
                if *once && !once_emitted.insert(name.clone()) {
                    continue;
                }

                let fragment = fragments
                    .get(name)
                    .ok_or_else(|| CoreError::UnknownFragment { name: name.clone() })?;
                if fragment.params.len() != args.len() {
                    return Err(CoreError::ArityError {
                        name: name.clone(),
                        expected: fragment.params.len(),
                        found: args.len(),
                    });
                }
                if depth + 1 > max_depth {
                    return Err(CoreError::ExpansionTooDeep { max: max_depth });
                }

                *counter += 1;
                let callee_instance = Instance {
                    local_prefix: format!("__f{counter}"),
                    alias: alias.clone(),
                };
                let callee_frame = Frame {
                    params: fragment.params.clone(),
                    args: args.clone(),
                    caller_instance: instance.clone(),
                    caller_frame: frame.map(|f| Box::new(f.clone())),
                    caller_depth: depth,
                };

                expand_elements(
                    &fragment.body,
                    fragments,
                    &callee_instance,
                    Some(&callee_frame),
                    depth + 1,
                    max_depth,
                    endianness,
                    counter,
                    once_emitted,
                    out,
                )?;
            }

            RawElement::ExtensionInvocation {
                name,
                builtin_namespace,
                text,
                ..
            } => out.push(Element::ExtensionInvocation {
                name: name.clone(),
                builtin_namespace: *builtin_namespace,
                text: text.clone(),
            }),
        }
    }

    Ok(())
}

fn resolve_literal(
    sign: Sign,
    digits: &str,
    base: NumBase,
    width: u32,
    endianness: Endianness,
) -> Result<Vec<u8>, CoreError> {
    let magnitude =
        i128::from_str_radix(digits, base.radix()).map_err(|_| CoreError::LiteralOutOfRange { width })?;

    let encoded = match sign {
        Sign::Plus => elf32::encode_signed(magnitude, width, endianness),
        Sign::Minus => elf32::encode_signed(-magnitude, width, endianness),
        Sign::Equals => elf32::encode_unsigned(magnitude, width, endianness),
    };
    encoded.map_err(|_| CoreError::LiteralOutOfRange { width })
}

fn validate_unique_labels(segment: &Segment) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for element in &segment.elements {
        if let Element::Label { name, .. } = element {
            if !seen.insert(name.clone()) {
                return Err(CoreError::AmbiguousLabel {
                    segment: segment.name.clone(),
                    label: name.clone(),
                });
            }
        }
    }
    for auto_label in &segment.auto_labels {
        if !seen.insert(auto_label.name.clone()) {
            return Err(CoreError::AmbiguousLabel {
                segment: segment.name.clone(),
                label: auto_label.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf32::SegmentFlags;
    use crate::error::Span;
    use crate::model::{MergedSegment, ProgramDecl};

    fn span() -> Span {
        Span {
            file: std::sync::Arc::from("test.eh"),
            line: 1,
            column: 1,
        }
    }

    fn decl() -> ProgramDecl {
        ProgramDecl {
            machine: 3,
            endianness: Endianness::Little,
            alignment: 4096,
        }
    }

    fn merged(body: Vec<RawElement>, fragments: HashMap<String, Fragment>) -> MergedProgram {
        let segment = MergedSegment {
            name: "text".to_owned(),
            flags: SegmentFlags::READ | SegmentFlags::EXECUTE,
            declared_size: 0,
            alignment: 4096,
            body,
            auto_labels: Vec::new(),
        };
        MergedProgram {
            decl: decl(),
            segment_index: HashMap::from([("text".to_owned(), 0)]),
            segments: vec![segment],
            fragments,
        }
    }

    /// Two instances of a fragment using a `__`-local label get distinct
    /// mangled names, so neither instance's self-relative jump can resolve
    /// to the other's label.
    #[test]
    fn two_instances_of_a_fragment_get_distinct_local_prefixes() {
        let fragment = Fragment {
            name: "f".to_owned(),
            params: Vec::new(),
            body: vec![RawElement::Label("__x".to_owned())],
        };
        let fragments = HashMap::from([("f".to_owned(), fragment)]);
        let body = vec![
            RawElement::FragmentRef {
                name: "f".to_owned(),
                args: Vec::new(),
                alias: None,
                once: false,
                span: span(),
            },
            RawElement::FragmentRef {
                name: "f".to_owned(),
                args: Vec::new(),
                alias: None,
                once: false,
                span: span(),
            },
        ];

        let expanded = run(merged(body, fragments), 64).expect("expands");
        let labels: Vec<&str> = expanded.segments[0]
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Label { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(labels.len(), 2);
        assert_ne!(labels[0], labels[1]);
    }

    /// An aliased call site rewrites its fragment's local labels under the
    /// alias, not the instance's hygiene-only `local_prefix` — this is the
    /// escape hatch that lets external code address an aliased fragment's
    /// internals as `alias.name`.
    #[test]
    fn aliased_call_site_rewrites_local_label_under_the_alias() {
        let fragment = Fragment {
            name: "f".to_owned(),
            params: Vec::new(),
            body: vec![RawElement::Label("__x".to_owned())],
        };
        let fragments = HashMap::from([("f".to_owned(), fragment)]);
        let body = vec![RawElement::FragmentRef {
            name: "f".to_owned(),
            args: Vec::new(),
            alias: Some("myalias".to_owned()),
            once: false,
            span: span(),
        }];

        let expanded = run(merged(body, fragments), 64).expect("expands");
        let label = expanded.segments[0]
            .elements
            .iter()
            .find_map(|e| match e {
                Element::Label { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .expect("one label");
        assert_eq!(label, "myalias.x");
    }

    /// `@!` suppresses every invocation after the first with the same key.
    #[test]
    fn once_only_fragment_ref_expands_a_single_time() {
        let fragment = Fragment {
            name: "g".to_owned(),
            params: Vec::new(),
            body: vec![RawElement::HexBytes(vec![0x90])],
        };
        let fragments = HashMap::from([("g".to_owned(), fragment)]);
        let body = vec![
            RawElement::FragmentRef {
                name: "g".to_owned(),
                args: Vec::new(),
                alias: None,
                once: true,
                span: span(),
            },
            RawElement::FragmentRef {
                name: "g".to_owned(),
                args: Vec::new(),
                alias: None,
                once: true,
                span: span(),
            },
        ];

        let expanded = run(merged(body, fragments), 64).expect("expands");
        assert_eq!(expanded.segments[0].elements.len(), 1);
    }

    /// The once-only key tracks fragment name alone: differently-aliased
    /// (or unaliased) `@!` call sites to the same fragment still share one
    /// slot, so the fragment is inlined at most once overall.
    #[test]
    fn once_only_dedup_ignores_alias() {
        let fragment = Fragment {
            name: "g".to_owned(),
            params: Vec::new(),
            body: vec![RawElement::HexBytes(vec![0x90])],
        };
        let fragments = HashMap::from([("g".to_owned(), fragment)]);
        let body = vec![
            RawElement::FragmentRef {
                name: "g".to_owned(),
                args: Vec::new(),
                alias: Some("a".to_owned()),
                once: true,
                span: span(),
            },
            RawElement::FragmentRef {
                name: "g".to_owned(),
                args: Vec::new(),
                alias: Some("b".to_owned()),
                once: true,
                span: span(),
            },
            RawElement::FragmentRef {
                name: "g".to_owned(),
                args: Vec::new(),
                alias: None,
                once: true,
                span: span(),
            },
        ];

        let expanded = run(merged(body, fragments), 64).expect("expands");
        assert_eq!(expanded.segments[0].elements.len(), 1);
    }

    #[test]
    fn literal_round_trips_through_every_sign() {
        assert_eq!(
            resolve_literal(Sign::Equals, "1", NumBase::Decimal, 4, Endianness::Little).unwrap(),
            vec![1, 0, 0, 0]
        );
        assert_eq!(
            resolve_literal(Sign::Minus, "1", NumBase::Decimal, 1, Endianness::Little).unwrap(),
            vec![0xff]
        );
        assert_eq!(
            resolve_literal(Sign::Plus, "7f", NumBase::Hex, 1, Endianness::Little).unwrap(),
            vec![0x7f]
        );
    }

    #[test]
    fn oversized_literal_is_rejected() {
        let err = resolve_literal(Sign::Equals, "300", NumBase::Decimal, 1, Endianness::Little)
            .unwrap_err();
        assert!(matches!(err, CoreError::LiteralOutOfRange { width: 1 }));
    }
}
