//! Test corpus loading.
//!
//! A fixtures root looks like this:
//!
//! ```text
//! fixtures/
//!   mdtest.toml            optional suite configuration
//!   emphasis.md            base input
//!   emphasis.out           expected HTML
//!   extensions/
//!     tables.md            shared by every engine that lists it
//!     tables.out
//!     pandoc/
//!       footnotes.md       engine-only test
//!       footnotes.out
//!       tables.md          empty: inherit ../tables.md
//!       tables.out         overrides the expected output only
//! ```
//!
//! Engine files that are absent or empty are resolved against the file with
//! the same name one directory up, so an engine test can override only its
//! input, only its expected output, or neither.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::encoding::{EncodingError, TextEncoding};

/// Extension of markdown input files.
pub const INPUT_EXTENSION: &str = "md";

/// Extension of expected HTML files.
pub const OUTPUT_EXTENSION: &str = "out";

/// Directory under the fixtures root holding one subdirectory per engine.
pub const EXTENSIONS_DIR: &str = "extensions";

/// Errors that can occur when loading fixtures
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Fixture file not found
    #[error("Fixture not found: {path}")]
    NotFound { path: String },

    /// IO error reading fixture
    #[error("IO error reading {path}: {error}")]
    Io { path: String, error: String },

    /// Fixture bytes do not match the configured encoding
    #[error("Cannot decode fixture {path}: {error}")]
    Encoding {
        path: String,
        #[source]
        error: EncodingError,
    },
}

/// Result type for fixture operations
pub type FixtureResult<T> = Result<T, FixtureError>;

/// One fixture pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// File name without extension.
    pub id: String,
    /// Markdown input.
    pub input: String,
    /// Expected HTML.
    pub expected_output: String,
}

impl TestCase {
    /// Creates a test case.
    pub fn new(
        id: impl Into<String>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// Reads fixture pairs from a fixtures root.
#[derive(Debug, Clone)]
pub struct CorpusLoader {
    root: PathBuf,
    encoding: TextEncoding,
}

impl CorpusLoader {
    /// Creates a loader over `root`, reading UTF-8.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            encoding: TextEncoding::Utf8,
        }
    }

    /// Sets the encoding fixture files are decoded with.
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Returns the fixtures root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the encoding fixture files are decoded with.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Returns the directory holding the engine subdirectories.
    pub fn extensions_path(&self) -> PathBuf {
        self.root.join(EXTENSIONS_DIR)
    }

    /// Returns the directory of one engine's tests.
    pub fn engine_path(&self, engine_id: &str) -> PathBuf {
        self.extensions_path().join(engine_id)
    }

    /// Whether an engine has its own test directory.
    pub fn has_engine_dir(&self, engine_id: &str) -> bool {
        self.engine_path(engine_id).is_dir()
    }

    /// Loads the base corpus, sorted by file name.
    pub fn base_cases(&self) -> FixtureResult<Vec<TestCase>> {
        self.input_files(&self.root)?
            .into_iter()
            .map(|input_path| {
                let id = case_id(&input_path);
                let input = self.read(&input_path)?;
                let expected_output = self.read(&input_path.with_extension(OUTPUT_EXTENSION))?;
                Ok(TestCase {
                    id,
                    input,
                    expected_output,
                })
            })
            .collect()
    }

    /// Loads one engine's extension corpus, sorted by file name.
    ///
    /// An engine without a test directory has no extension cases.
    pub fn engine_cases(&self, engine_id: &str) -> FixtureResult<Vec<TestCase>> {
        let dir = self.engine_path(engine_id);
        if !dir.is_dir() {
            tracing::debug!(engine = engine_id, "No extension directory");
            return Ok(Vec::new());
        }

        self.input_files(&dir)?
            .into_iter()
            .map(|input_path| {
                let id = case_id(&input_path);
                let input = self.read_with_fallback(&input_path)?;
                let expected_output =
                    self.read_with_fallback(&input_path.with_extension(OUTPUT_EXTENSION))?;
                Ok(TestCase {
                    id,
                    input,
                    expected_output,
                })
            })
            .collect()
    }

    /// Returns the sorted names of the engine subdirectories.
    pub fn engine_ids(&self) -> FixtureResult<Vec<String>> {
        let dir = self.extensions_path();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<String> = read_dir_sorted(&dir)?
            .into_iter()
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn input_files(&self, dir: &Path) -> FixtureResult<Vec<PathBuf>> {
        Ok(read_dir_sorted(dir)?
            .into_iter()
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == INPUT_EXTENSION)
            })
            .collect())
    }

    /// Reads and decodes one fixture file.
    pub fn read(&self, path: &Path) -> FixtureResult<String> {
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(FixtureError::NotFound { path: path_str });
        }

        let bytes = fs::read(path).map_err(|e| FixtureError::Io {
            path: path_str.clone(),
            error: e.to_string(),
        })?;

        self.encoding
            .decode(&bytes)
            .map_err(|error| FixtureError::Encoding {
                path: path_str,
                error,
            })
    }

    fn read_with_fallback(&self, path: &Path) -> FixtureResult<String> {
        if path.exists() {
            let content = self.read(path)?;
            if !content.is_empty() {
                return Ok(content);
            }
        }

        let parent = same_basename_on_parent(path).ok_or_else(|| FixtureError::NotFound {
            path: path.display().to_string(),
        })?;
        tracing::trace!(
            from = %path.display(),
            to = %parent.display(),
            "Inheriting parent fixture"
        );
        self.read(&parent)
    }
}

/// Maps `a/b/c/name.ext` to `a/b/name.ext`.
pub fn same_basename_on_parent(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let grandparent = path.parent()?.parent()?;
    Some(grandparent.join(name))
}

fn case_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_dir_sorted(dir: &Path) -> FixtureResult<Vec<PathBuf>> {
    let io_error = |e: std::io::Error| FixtureError::Io {
        path: dir.display().to_string(),
        error: e.to_string(),
    };

    let mut paths = fs::read_dir(dir)
        .map_err(io_error)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error)?;
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}
