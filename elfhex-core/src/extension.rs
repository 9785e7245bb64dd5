//! Component E: the extension boundary.
//!
//! `elfhex-core` never bundles a concrete extension; it only defines the
//! contract an [`ExtensionResolver`] and the [`ExtensionHandle`]s it
//! produces must satisfy. The built-in `pad`/`align`/`ascii` extensions and
//! the CLI's plugin-namespace resolution live in the `elfhex` binary crate.

use crate::elf32::Endianness;
use crate::error::CoreError;

/// What an extension handle can observe about the position it was invoked
/// at, without being able to see the rest of the program.
pub trait RenderContext {
    /// The program's byte order.
    fn endianness(&self) -> Endianness;
    /// The memory address the invocation occupies (valid in both passes:
    /// in layout, the address computed so far; in emission, the final
    /// address).
    fn address(&self) -> u32;
    /// The alignment of the segment the invocation occurs in.
    fn segment_alignment(&self) -> u32;
}

/// A resolved extension invocation, instantiated once per invocation site
/// and reused across the layout and emission passes.
pub trait ExtensionHandle {
    /// Reports how many bytes this invocation will occupy in the file.
    /// Called during layout, before any address in the program is final.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ExtensionParseError`] if the invocation's
    /// arguments cannot be evaluated yet.
    fn size(&mut self, ctx: &dyn RenderContext) -> Result<usize, CoreError>;

    /// Produces the invocation's final bytes. Called during emission, once
    /// every address in the program is fixed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ExtensionParseError`] if rendering fails. The
    /// caller separately validates that the returned length matches the
    /// `size()` reported earlier, raising
    /// [`CoreError::ExtensionSizeMismatch`] if it does not.
    fn render(&mut self, ctx: &dyn RenderContext) -> Result<Vec<u8>, CoreError>;
}

/// Resolves a `:name { text }` / `::name { text }` invocation to a handle.
pub trait ExtensionResolver {
    /// Looks up `name` (in the built-in namespace if `builtin_namespace` is
    /// `true`, otherwise in the plugin namespace) and constructs a handle
    /// for this invocation's `text`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownExtension`] if no extension registers
    /// that name in the requested namespace, or
    /// [`CoreError::ExtensionParseError`] if `text` is malformed for it.
    fn resolve(
        &self,
        name: &str,
        builtin_namespace: bool,
        text: &str,
    ) -> Result<Box<dyn ExtensionHandle>, CoreError>;
}
