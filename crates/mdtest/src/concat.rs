//! Fixture concatenation, for reading or rendering the whole corpus at once.

use std::io::{self, Write};
use std::path::Path;

use thiserror::Error;
use walkdir::WalkDir;

use crate::corpus::{CorpusLoader, FixtureError, INPUT_EXTENSION};
use crate::encoding::EncodingError;

/// Default output file of [`concat_all`].
pub const ALL_OUTPUT_FILE: &str = "all.tmp.md";

/// Default output file of [`concat_inputs`].
pub const INPUTS_OUTPUT_FILE: &str = "inputs.tmp.md";

/// Errors while concatenating fixtures.
#[derive(Debug, Error)]
pub enum ConcatError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error("cannot walk {path}: {error}")]
    Walk { path: String, error: String },

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// Writes every base and engine test as
/// `# id`, the input, a `---` rule and the expected output.
///
/// Returns the number of tests written.
pub fn concat_all<W: Write>(loader: &CorpusLoader, out: &mut W) -> Result<usize, ConcatError> {
    let mut cases = loader.base_cases()?;
    for engine_id in loader.engine_ids()? {
        cases.extend(loader.engine_cases(&engine_id)?);
    }

    for case in &cases {
        let block = format!(
            "# {}\n\n{}\n\n---\n\n{}\n\n",
            case.id, case.input, case.expected_output
        );
        out.write_all(&loader.encoding().encode(&block)?)?;
    }
    out.flush()?;
    Ok(cases.len())
}

/// Writes every non-empty markdown file under the fixtures root as
/// `# relative/path` followed by its content.
///
/// Directories are walked in sorted order, a directory's own files before
/// its subdirectories. Returns the number of files written.
pub fn concat_inputs<W: Write>(loader: &CorpusLoader, out: &mut W) -> Result<usize, ConcatError> {
    let root = loader.root();
    let walker = WalkDir::new(root).sort_by(|a, b| {
        a.file_type()
            .is_dir()
            .cmp(&b.file_type().is_dir())
            .then_with(|| a.file_name().cmp(b.file_name()))
    });

    let mut written = 0;
    for entry in walker {
        let entry = entry.map_err(|e| ConcatError::Walk {
            path: root.display().to_string(),
            error: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().is_none_or(|ext| ext != INPUT_EXTENSION)
        {
            continue;
        }

        let content = loader.read(path)?;
        if content.is_empty() {
            continue;
        }

        let block = format!("# {}\n\n{}\n\n", heading(root, path), content);
        out.write_all(&loader.encoding().encode(&block)?)?;
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

/// Path relative to the root, without extension, `/`-separated.
fn heading(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_heading() {
        assert_eq!(
            heading(Path::new("fx"), Path::new("fx/extensions/pandoc/a.md")),
            "extensions/pandoc/a"
        );
        assert_eq!(heading(Path::new("fx"), Path::new("fx/b.md")), "b");
    }

    #[test]
    fn test_concat_inputs_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a_dir")).unwrap();
        fs::write(root.join("a_dir/x.md"), "X").unwrap();
        fs::write(root.join("z.md"), "Z").unwrap();
        fs::write(root.join("b.md"), "B").unwrap();
        fs::write(root.join("empty.md"), "").unwrap();
        fs::write(root.join("b.out"), "<p>B</p>").unwrap();

        let mut out = Vec::new();
        let written = concat_inputs(&CorpusLoader::new(root), &mut out).unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "# b\n\nB\n\n# z\n\nZ\n\n# a_dir/x\n\nX\n\n"
        );
    }
}
