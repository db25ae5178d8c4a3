use crate::cut::Cut;
use crate::readers::JsonlSource;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A handle over a collection of cuts.
///
/// Two flavours share one type:
/// - Lazy: backed by a (gzip) JSONL manifest. Nothing is read when the handle
///   is created; the file is opened and streamed every time [`CutSet::iter`]
///   is called. A missing or corrupt manifest therefore fails at first
///   iteration, not when the handle is built.
/// - Eager: backed by an in-memory `Arc<[Cut]>`.
///
/// Cloning is an `Arc` bump. Handles are compared by identity with
/// [`CutSet::ptr_eq`], which is what the manifest accessors' memoization
/// guarantees.
#[derive(Debug, Clone)]
pub struct CutSet {
    inner: Arc<CutSource>,
}

#[derive(Debug)]
enum CutSource {
    Lazy(JsonlSource),
    Eager(Arc<[Cut]>),
}

/// Opens a manifest lazily. The file is not touched until iteration.
pub fn load_manifest_lazy(path: impl Into<PathBuf>) -> CutSet {
    CutSet {
        inner: Arc::new(CutSource::Lazy(JsonlSource::new(path))),
    }
}

impl CutSet {
    pub fn from_cuts(cuts: Vec<Cut>) -> Self {
        Self {
            inner: Arc::new(CutSource::Eager(cuts.into())),
        }
    }

    /// Streams the cuts in manifest order.
    pub fn iter(&self) -> Result<Box<dyn Iterator<Item = Result<Cut>> + Send>> {
        match self.inner.as_ref() {
            CutSource::Lazy(source) => source.stream::<Cut>(),
            CutSource::Eager(cuts) => {
                let cuts = cuts.clone();
                Ok(Box::new(
                    (0..cuts.len()).map(move |i| Ok(cuts[i].clone())),
                ))
            }
        }
    }

    /// Manifest path for lazy sets.
    pub fn path(&self) -> Option<&Path> {
        match self.inner.as_ref() {
            CutSource::Lazy(source) => Some(source.path()),
            CutSource::Eager(_) => None,
        }
    }

    /// Returns true when both handles refer to the same collection.
    pub fn ptr_eq(&self, other: &CutSet) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn eager_set_iterates_in_order() -> Result<()> {
        let cuts: Vec<Cut> = (0..4)
            .map(|i| Cut::new(format!("c{}", i), 0.0, 1.0 + i as f64))
            .collect();
        let set = CutSet::from_cuts(cuts.clone());

        let read: Vec<Cut> = set.iter()?.collect::<Result<_>>()?;
        assert_eq!(read, cuts);
        assert!(set.path().is_none());
        Ok(())
    }

    #[test]
    fn lazy_set_defers_file_access() {
        let set = load_manifest_lazy("/nonexistent/emilia_cuts_EN.jsonl.gz");
        assert!(set.path().is_some());
        assert!(set.iter().is_err());
    }

    #[test]
    fn lazy_set_rereads_manifest() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, r#"{{"id": "a", "duration": 1.5}}"#)?;
        writeln!(file, r#"{{"id": "b", "duration": 2.5}}"#)?;
        let set = load_manifest_lazy(file.path());

        for _ in 0..2 {
            let ids: Vec<String> = set.iter()?.map(|c| c.map(|c| c.id)).collect::<Result<_>>()?;
            assert_eq!(ids, vec!["a", "b"]);
        }
        Ok(())
    }

    #[test]
    fn identity_follows_clones_only() {
        let a = load_manifest_lazy("x.jsonl.gz");
        let b = load_manifest_lazy("x.jsonl.gz");
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }
}
