//! The built-in `pad`, `align`, and `ascii` extensions.
//!
//! These are the only extensions resolved in the builtin (`:name`) namespace.
//! The plugin (`::name`) namespace has no loading mechanism in this binary,
//! so any such invocation is rejected with [`CoreError::UnknownExtension`].

use elfhex_core::error::CoreError;
use elfhex_core::extension::{ExtensionHandle, ExtensionResolver, RenderContext};

/// Resolves invocations against the three built-in extensions.
#[derive(Default)]
pub struct BuiltinResolver;

impl ExtensionResolver for BuiltinResolver {
    fn resolve(
        &self,
        name: &str,
        builtin_namespace: bool,
        text: &str,
    ) -> Result<Box<dyn ExtensionHandle>, CoreError> {
        if !builtin_namespace {
            return Err(CoreError::UnknownExtension {
                name: name.to_owned(),
            });
        }
        match name {
            "pad" => Ok(Box::new(Pad::parse(text)?)),
            "align" => Ok(Box::new(Align::parse(text)?)),
            "ascii" => Ok(Box::new(Ascii::parse(text)?)),
            other => Err(CoreError::UnknownExtension {
                name: other.to_owned(),
            }),
        }
    }
}

fn parse_decimal(name: &str, text: &str) -> Result<u32, CoreError> {
    text.trim()
        .parse()
        .map_err(|_| CoreError::ExtensionParseError {
            name: name.to_owned(),
            message: format!("expected a decimal integer, found {text:?}"),
        })
}

/// `:pad { N }` — emits `N` zero bytes.
struct Pad {
    count: u32,
}

impl Pad {
    fn parse(text: &str) -> Result<Self, CoreError> {
        Ok(Self {
            count: parse_decimal("pad", text)?,
        })
    }
}

impl ExtensionHandle for Pad {
    fn size(&mut self, _ctx: &dyn RenderContext) -> Result<usize, CoreError> {
        Ok(self.count as usize)
    }

    fn render(&mut self, _ctx: &dyn RenderContext) -> Result<Vec<u8>, CoreError> {
        Ok(vec![0u8; self.count as usize])
    }
}

/// `:align { N }` — emits zero bytes up to the next multiple of `N` at this
/// invocation's address. `N` must be a power of two. The padding length is
/// computed once, at `size()` time, and reused at `render()` time so the two
/// calls always agree even if called at different moments.
struct Align {
    alignment: u32,
    computed: Option<u32>,
}

impl Align {
    fn parse(text: &str) -> Result<Self, CoreError> {
        let alignment = parse_decimal("align", text)?;
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(CoreError::ExtensionParseError {
                name: "align".to_owned(),
                message: format!("alignment {alignment} is not a power of two"),
            });
        }
        Ok(Self {
            alignment,
            computed: None,
        })
    }
}

impl ExtensionHandle for Align {
    fn size(&mut self, ctx: &dyn RenderContext) -> Result<usize, CoreError> {
        let remainder = ctx.address() % self.alignment;
        let pad = if remainder == 0 { 0 } else { self.alignment - remainder };
        self.computed = Some(pad);
        Ok(pad as usize)
    }

    fn render(&mut self, ctx: &dyn RenderContext) -> Result<Vec<u8>, CoreError> {
        let pad = match self.computed {
            Some(pad) => pad,
            None => {
                let remainder = ctx.address() % self.alignment;
                if remainder == 0 { 0 } else { self.alignment - remainder }
            }
        };
        Ok(vec![0u8; pad as usize])
    }
}

/// `:ascii { text }` — emits `text` verbatim as printable-ASCII bytes,
/// letting a fragment reach a string-literal-shaped element through argument
/// substitution (a literal `"..."` element can't itself be a `$param`).
struct Ascii {
    bytes: Vec<u8>,
}

impl Ascii {
    fn parse(text: &str) -> Result<Self, CoreError> {
        for byte in text.bytes() {
            if !(0x20..=0x7e).contains(&byte) {
                return Err(CoreError::ExtensionParseError {
                    name: "ascii".to_owned(),
                    message: format!("unprintable byte {byte:#04x} in extension body"),
                });
            }
        }
        Ok(Self {
            bytes: text.as_bytes().to_vec(),
        })
    }
}

impl ExtensionHandle for Ascii {
    fn size(&mut self, _ctx: &dyn RenderContext) -> Result<usize, CoreError> {
        Ok(self.bytes.len())
    }

    fn render(&mut self, _ctx: &dyn RenderContext) -> Result<Vec<u8>, CoreError> {
        Ok(self.bytes.clone())
    }
}
