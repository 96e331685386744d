//! Input resolution: dataset catalog queries, a file-list cache and the
//! file limit.

use std::path::{Path, PathBuf};
use std::process::Command;

use sf_core::{Error, Result};

use crate::config::SkimConfig;

/// Lists the logical file names of a dataset.
pub trait DatasetCatalog: Send + Sync {
    /// Logical file names of `dataset`, in catalog order.
    fn list_files(&self, dataset: &str) -> Result<Vec<String>>;
}

/// Catalog backed by an external command (`dasgoclient` by default).
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    program: String,
}

impl Default for CommandCatalog {
    fn default() -> Self {
        Self::new("dasgoclient")
    }
}

impl CommandCatalog {
    /// Catalog running `program --query="file dataset=<dataset>"`.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl DatasetCatalog for CommandCatalog {
    fn list_files(&self, dataset: &str) -> Result<Vec<String>> {
        tracing::info!(program = %self.program, dataset, "querying dataset catalog");
        let out = Command::new(&self.program)
            .arg(format!("--query=file dataset={dataset}"))
            .output()
            .map_err(|e| Error::Validation(format!("failed to run {}: {e}", self.program)))?;
        if !out.status.success() {
            return Err(Error::Validation(format!(
                "{} failed ({}): {}",
                self.program,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(split_lines(&String::from_utf8_lossy(&out.stdout)))
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}

/// On-disk list of full locators for one dataset.
#[derive(Debug, Clone)]
pub struct FileListCache {
    dir: PathBuf,
    redirector: String,
}

impl FileListCache {
    /// Cache in `dir`, prefixing catalog names with `redirector`.
    pub fn new(dir: impl Into<PathBuf>, redirector: impl Into<String>) -> Self {
        Self { dir: dir.into(), redirector: redirector.into() }
    }

    /// `filelist_<dataset>.txt` with `/` replaced by `_` and the first character dropped.
    pub fn cache_file_name(dataset: &str) -> String {
        let safe = dataset.replace('/', "_");
        let mut chars = safe.chars();
        chars.next();
        format!("filelist_{}.txt", chars.as_str())
    }

    /// Cache file for `dataset`.
    pub fn path(&self, dataset: &str) -> PathBuf {
        self.dir.join(Self::cache_file_name(dataset))
    }

    /// Read the cached list, or query `catalog` and write the cache.
    pub fn load_or_fetch(&self, dataset: &str, catalog: &dyn DatasetCatalog) -> Result<Vec<String>> {
        let path = self.path(dataset);
        if path.exists() {
            tracing::info!(path = %path.display(), "loading cached file list");
            return Ok(split_lines(&std::fs::read_to_string(&path)?));
        }
        tracing::info!(path = %path.display(), "file list cache not found, fetching from catalog");
        let files: Vec<String> = catalog
            .list_files(dataset)?
            .into_iter()
            .map(|lfn| format!("{}{lfn}", self.redirector))
            .collect();
        write_lines(&path, &files)?;
        Ok(files)
    }
}

fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for l in lines {
        text.push_str(l);
        text.push('\n');
    }
    std::fs::write(path, text).map_err(|e| Error::io_write(path, e))
}

/// Keep the first `max_files` locators (`None` or 0 keeps all).
pub fn apply_file_limit(mut files: Vec<String>, max_files: Option<usize>) -> Vec<String> {
    match max_files {
        Some(n) if n > 0 && n < files.len() => {
            tracing::info!(limit = n, available = files.len(), "limiting input files");
            files.truncate(n);
        }
        _ => tracing::info!(files = files.len(), "processing all files"),
    }
    files
}

/// Input locators for `config`: explicit files, otherwise the (cached) catalog
/// listing of `config.dataset`; then the file limit.
///
/// Fails with [`Error::EmptySource`] when nothing is left.
pub fn resolve_inputs(config: &SkimConfig, catalog: &dyn DatasetCatalog) -> Result<Vec<String>> {
    let files = if !config.files.is_empty() {
        config.files.clone()
    } else if let Some(dataset) = config.dataset.as_deref() {
        let dir = config.file_list_cache.clone().unwrap_or_else(|| PathBuf::from("."));
        FileListCache::new(dir, config.redirector.clone()).load_or_fetch(dataset, catalog)?
    } else {
        return Err(Error::Validation("config names neither `files` nor `dataset`".into()));
    };
    let files = apply_file_limit(files, config.max_files);
    if files.is_empty() {
        return Err(Error::EmptySource(config.tree_name.clone()));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FakeCatalog {
        files: Vec<String>,
        calls: AtomicUsize,
    }

    impl DatasetCatalog for FakeCatalog {
        fn list_files(&self, _dataset: &str) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.files.clone())
        }
    }

    fn fake(files: &[&str]) -> FakeCatalog {
        FakeCatalog { files: files.iter().map(|s| s.to_string()).collect(), calls: AtomicUsize::new(0) }
    }

    #[test]
    fn cache_file_name_matches_dataset() {
        assert_eq!(
            FileListCache::cache_file_name("/MuonEG/Run2022D-22Sep2023-v1/NANOAOD"),
            "filelist_MuonEG_Run2022D-22Sep2023-v1_NANOAOD.txt"
        );
    }

    #[test]
    fn cache_is_written_once_then_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileListCache::new(dir.path(), "root://redirector/");
        let cat = fake(&["/store/a.root", "/store/b.root"]);
        let first = cache.load_or_fetch("/D/E/F", &cat).unwrap();
        assert_eq!(first, vec!["root://redirector//store/a.root", "root://redirector//store/b.root"]);
        let second = cache.load_or_fetch("/D/E/F", &cat).unwrap();
        assert_eq!(second, first);
        assert_eq!(cat.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn file_limit() {
        let files: Vec<String> = (0..5).map(|i| format!("f{i}")).collect();
        assert_eq!(apply_file_limit(files.clone(), Some(2)), vec!["f0", "f1"]);
        assert_eq!(apply_file_limit(files.clone(), Some(0)).len(), 5);
        assert_eq!(apply_file_limit(files.clone(), Some(9)).len(), 5);
        assert_eq!(apply_file_limit(files, None).len(), 5);
    }

    #[test]
    fn explicit_files_bypass_catalog() {
        let cfg: SkimConfig =
            serde_yaml_ng::from_str("dataset: /A/B/C\nfiles: [x.parquet, y.parquet]\nmax_files: 1\n").unwrap();
        let cat = fake(&["/store/z.root"]);
        assert_eq!(resolve_inputs(&cfg, &cat).unwrap(), vec!["x.parquet"]);
        assert_eq!(cat.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_listing_is_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg: SkimConfig = serde_yaml_ng::from_str("dataset: /A/B/C\n").unwrap();
        cfg.file_list_cache = Some(dir.path().to_path_buf());
        let err = resolve_inputs(&cfg, &fake(&[])).unwrap_err();
        assert!(matches!(err, Error::EmptySource(ref t) if t == "Events"));
    }

    #[test]
    fn failing_command_is_validation_error() {
        let cat = CommandCatalog::new("skimflow-no-such-catalog-binary");
        assert!(matches!(cat.list_files("/A/B/C"), Err(Error::Validation(_))));
    }
}
