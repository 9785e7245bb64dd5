//! Component A: locating and parsing source files, with include-cycle
//! protection by canonical path.
//!
//! The actual disk access and text parsing are external collaborators,
//! injected as the [`FileSystem`] and [`SyntaxParser`] traits; this module
//! only owns the search-path resolution algorithm and the load cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CoreError;
use crate::syntax::RawFile;

/// File-system access the loader needs, kept as a trait so preprocessing
/// logic can be tested against an in-memory implementation.
pub trait FileSystem {
    /// Finds the first entry on `search_path` under which `include_path`
    /// exists, returning its (unresolved) path.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileNotFound`] if no search-path entry matches.
    fn resolve(&self, include_path: &str, search_path: &[PathBuf]) -> Result<PathBuf, CoreError>;

    /// Canonicalizes `path`, so that two include paths naming the same file
    /// compare equal.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, CoreError>;

    /// Reads the entire contents of `path` as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> Result<String, CoreError>;
}

/// Surface-syntax parsing the loader needs, kept as a trait so
/// `elfhex-core` never depends on a concrete grammar.
pub trait SyntaxParser {
    /// Parses `source` (the contents of `file_name`) into a [`RawFile`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Parse`] if `source` is not well-formed.
    fn parse(&self, source: &str, file_name: Arc<str>) -> Result<RawFile, CoreError>;
}

/// The result of requesting that a file be loaded.
pub enum LoadResult {
    /// The file had not been loaded before; here is its parsed tree.
    Fresh(Arc<RawFile>),
    /// The file (by canonical path) was already loaded; its contents are
    /// already present in whatever is accumulating them.
    AlreadyLoaded,
}

/// Resolves include paths, parses files, and caches by canonical path.
pub struct Loader<'a> {
    fs: &'a dyn FileSystem,
    parser: &'a dyn SyntaxParser,
    search_path: Vec<PathBuf>,
    loaded: std::collections::HashSet<PathBuf>,
}

impl<'a> Loader<'a> {
    /// Creates a loader that resolves includes against `search_path`.
    pub fn new(fs: &'a dyn FileSystem, parser: &'a dyn SyntaxParser, search_path: Vec<PathBuf>) -> Self {
        Self {
            fs,
            parser,
            search_path,
            loaded: std::collections::HashSet::new(),
        }
    }

    /// Loads the entry file directly, without search-path resolution.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError::Io`] or [`CoreError::Parse`].
    pub fn load_entry(&mut self, path: &Path) -> Result<LoadResult, CoreError> {
        self.load_resolved(path.to_path_buf())
    }

    /// Loads a file named by an `include` statement, resolving it against
    /// the configured search path.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError::FileNotFound`], [`CoreError::Io`], or
    /// [`CoreError::Parse`].
    pub fn load_include(&mut self, include_path: &str) -> Result<LoadResult, CoreError> {
        let resolved = self.fs.resolve(include_path, &self.search_path)?;
        self.load_resolved(resolved)
    }

    fn load_resolved(&mut self, resolved: PathBuf) -> Result<LoadResult, CoreError> {
        let canonical = self.fs.canonicalize(&resolved)?;
        if self.loaded.contains(&canonical) {
            return Ok(LoadResult::AlreadyLoaded);
        }

        let text = self.fs.read_to_string(&resolved)?;
        let file_name: Arc<str> = Arc::from(canonical.to_string_lossy().as_ref());

        log::debug!("loaded {file_name}");
        let tree = self.parser.parse(&text, file_name)?;
        self.loaded.insert(canonical);

        Ok(LoadResult::Fresh(Arc::new(tree)))
    }
}
