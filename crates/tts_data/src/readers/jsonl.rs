use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use serde::de::DeserializeOwned;
use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

/// A line-by-line JSONL reader for manifests.
///
/// Files ending in `.gz` are decompressed on the fly, so a manifest such as
/// `emilia_cuts_EN.jsonl.gz` is streamed without ever being fully inflated in
/// memory. Blank lines are skipped.
///
/// # Example
/// ```ignore
/// let source = JsonlSource::new("data/fbank/emilia_cuts_EN.jsonl.gz");
/// for cut in source.stream::<Cut>()? {
///     let cut = cut?;
///     println!("{} {:.2}s", cut.id, cut.duration);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    /// Creates a new reader for a (possibly gzip-compressed) JSONL file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Streams lines deserialized as `T`.
    ///
    /// # Errors
    /// - Fails if the file cannot be opened.
    /// - Yields an error for any line that is not valid JSON for `T`; the
    ///   message carries the file name and line number.
    pub fn stream<T: DeserializeOwned>(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<T>> + Send>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open manifest {}", self.path.display()))?;

        let reader: Box<dyn Read + Send> = if self.is_gzip() {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let path = self.path.clone();
        let iter = BufReader::new(reader)
            .lines()
            .enumerate()
            .filter_map(move |(line_num, line)| {
                let line = match line {
                    Ok(l) if l.trim().is_empty() => return None,
                    Ok(l) => l,
                    Err(e) => {
                        return Some(Err(anyhow::Error::new(e).context(format!(
                            "Failed to read line {} of {}",
                            line_num + 1,
                            path.display()
                        ))))
                    }
                };
                Some(serde_json::from_str::<T>(&line).with_context(|| {
                    format!("Invalid JSON at line {} of {}", line_num + 1, path.display())
                }))
            });
        Ok(Box::new(iter))
    }

    fn is_gzip(&self) -> bool {
        self.path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false)
    }
}
