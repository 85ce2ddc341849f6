//! Directory scanner: walks a root, honors ignore rules, classifies files.

use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use ctx_core::{FileType, Language};

/// Directories that are never worth indexing, regardless of gitignore.
const BUILTIN_IGNORE_DIRS: &[&str] = &[
  ".git",
  ".hg",
  ".svn",
  "node_modules",
  "target",
  "dist",
  "build",
  "out",
  ".next",
  ".venv",
  "venv",
  "__pycache__",
  ".idea",
  ".vscode",
  "vendor",
  ".cache",
  "coverage",
];

/// Extensions that are always binary; cheaper than sniffing.
const BINARY_EXTENSIONS: &[&str] = &[
  "png", "jpg", "jpeg", "gif", "webp", "ico", "bmp", "pdf", "zip", "tar", "gz", "bz2", "xz", "7z", "exe", "dll", "so",
  "dylib", "a", "o", "bin", "class", "jar", "war", "pyc", "wasm", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4",
  "avi", "mov", "sqlite", "db",
];

/// Bytes sniffed for NUL detection.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct ScanOptions {
  /// None = unbounded.
  pub max_depth: Option<usize>,
  /// None = every extension the language map knows.
  pub extensions: Option<HashSet<String>>,
  /// Extra ignore patterns; `!pattern` re-includes.
  pub extra_ignore: Vec<String>,
  pub follow_symlinks: bool,
  pub max_file_size: u64,
}

impl Default for ScanOptions {
  fn default() -> Self {
    Self {
      max_depth: None,
      extensions: None,
      extra_ignore: Vec::new(),
      follow_symlinks: false,
      max_file_size: 1024 * 1024, // 1MB
    }
  }
}

/// A file selected for indexing.
#[derive(Debug, Clone)]
pub struct FileInfo {
  pub path: PathBuf,
  pub relative_path: String,
  pub extension: String,
  pub language: Option<Language>,
  pub file_type: FileType,
  pub size: u64,
  /// ISO-8601 modification time.
  pub mtime: String,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ScanStats {
  pub total_files: u32,
  pub by_language: HashMap<String, u32>,
  pub by_type: HashMap<String, u32>,
  pub errors_encountered: u32,
  pub scan_duration_ms: u64,
}

#[derive(Debug)]
pub struct ScanResult {
  pub files: Vec<FileInfo>,
  pub stats: ScanStats,
}

/// Walk `root` and classify every indexable file.
///
/// Ignore patterns are merged in order: the built-in set, any `.gitignore`
/// discovered along the walk, then user extras. Per-file errors are reported
/// through `on_error` and counted; the scan continues.
pub fn scan(
  root: &Path,
  opts: &ScanOptions,
  on_file: &(dyn Fn(&FileInfo) + Send + Sync),
  on_error: &(dyn Fn(&str) + Send + Sync),
) -> ScanResult {
  let start = Instant::now();
  let errors = AtomicU32::new(0);

  let mut builder = WalkBuilder::new(root);
  builder
    .follow_links(opts.follow_symlinks)
    .hidden(false)
    .git_ignore(true)
    .git_global(true)
    .git_exclude(true)
    .add_custom_ignore_filename(".ctxignore")
    .max_depth(opts.max_depth)
    .filter_entry(|entry| {
      let name = entry.file_name().to_string_lossy();
      !(entry.file_type().is_some_and(|ft| ft.is_dir()) && BUILTIN_IGNORE_DIRS.contains(&name.as_ref()))
    });

  if !opts.extra_ignore.is_empty() {
    let mut overrides = OverrideBuilder::new(root);
    // Whitelist everything up front: override matchers exclude non-matching
    // files once any whitelist pattern exists, which is not gitignore's
    // negation semantics. Later patterns still take precedence.
    let _ = overrides.add("**");
    for pattern in &opts.extra_ignore {
      // OverrideBuilder whitelists by default; a leading '!' ignores. User
      // patterns use gitignore polarity, so flip.
      let flipped = match pattern.strip_prefix('!') {
        Some(rest) => rest.to_string(),
        None => format!("!{pattern}"),
      };
      if let Err(e) = overrides.add(&flipped) {
        on_error(&format!("invalid ignore pattern '{pattern}': {e}"));
        errors.fetch_add(1, Ordering::Relaxed);
      }
    }
    match overrides.build() {
      Ok(built) => {
        builder.overrides(built);
      }
      Err(e) => {
        on_error(&format!("failed to build ignore overrides: {e}"));
        errors.fetch_add(1, Ordering::Relaxed);
      }
    }
  }

  let error_sink = Mutex::new(());
  let report_error = |message: String| {
    let _guard = error_sink.lock();
    on_error(&message);
    errors.fetch_add(1, Ordering::Relaxed);
  };

  let files: Vec<FileInfo> = builder
    .build()
    .filter_map(|entry| match entry {
      Ok(entry) => Some(entry),
      Err(e) => {
        report_error(format!("walk error: {e}"));
        None
      }
    })
    .par_bridge()
    .filter_map(|entry| {
      if entry.file_type().is_none_or(|ft| ft.is_dir()) {
        return None;
      }
      let path = entry.path();

      match classify_file(path, root, opts) {
        Ok(Some(info)) => {
          on_file(&info);
          Some(info)
        }
        Ok(None) => None,
        Err(e) => {
          report_error(format!("{}: {e}", path.display()));
          None
        }
      }
    })
    .collect();

  let mut stats = ScanStats {
    total_files: files.len() as u32,
    errors_encountered: errors.load(Ordering::Relaxed),
    scan_duration_ms: start.elapsed().as_millis() as u64,
    ..Default::default()
  };
  for file in &files {
    if let Some(lang) = file.language {
      *stats.by_language.entry(lang.as_str().to_string()).or_default() += 1;
    }
    *stats.by_type.entry(file.file_type.as_str().to_string()).or_default() += 1;
  }

  ScanResult { files, stats }
}

/// Decide whether a single file is indexable and classify it.
fn classify_file(path: &Path, root: &Path, opts: &ScanOptions) -> std::io::Result<Option<FileInfo>> {
  let extension = path
    .extension()
    .map(|e| e.to_string_lossy().to_lowercase())
    .unwrap_or_default();

  if BINARY_EXTENSIONS.contains(&extension.as_str()) {
    return Ok(None);
  }

  let language = Language::from_extension(&extension);
  let accepted = match &opts.extensions {
    Some(set) => set.contains(&extension),
    None => language.is_some(),
  };
  if !accepted {
    return Ok(None);
  }
  // Inside an explicit extension set, unknown languages index as plain text.
  let language = language.or(Some(Language::Text));

  let metadata = path.metadata()?;
  if metadata.len() == 0 || metadata.len() > opts.max_file_size {
    return Ok(None);
  }

  if is_binary(path)? {
    return Ok(None);
  }

  let mtime = metadata
    .modified()
    .map(chrono::DateTime::<chrono::Utc>::from)
    .map(|dt| dt.to_rfc3339())
    .unwrap_or_default();

  let relative_path = path
    .strip_prefix(root)
    .unwrap_or(path)
    .to_string_lossy()
    .replace('\\', "/");

  Ok(Some(FileInfo {
    path: path.to_path_buf(),
    relative_path,
    extension,
    file_type: language.map(|l| l.file_type()).unwrap_or(FileType::Docs),
    language,
    size: metadata.len(),
    mtime,
  }))
}

/// A NUL byte in the first 8 KiB marks the file as binary.
fn is_binary(path: &Path) -> std::io::Result<bool> {
  let mut file = File::open(path)?;
  let mut buffer = [0u8; BINARY_SNIFF_BYTES];
  let n = file.read(&mut buffer)?;
  Ok(buffer[..n].contains(&0))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn scan_quiet(root: &Path, opts: &ScanOptions) -> ScanResult {
    scan(root, opts, &|_| {}, &|_| {})
  }

  #[test]
  fn test_scan_honors_builtin_ignores() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
    std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
    std::fs::write(dir.path().join("node_modules/x.js"), "module.exports = 1;").unwrap();
    std::fs::create_dir_all(dir.path().join(".git")).unwrap();
    std::fs::write(dir.path().join(".git/config"), "[core]").unwrap();

    let result = scan_quiet(dir.path(), &ScanOptions::default());
    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].relative_path, "a.ts");
    assert_eq!(result.files[0].language, Some(Language::TypeScript));
  }

  #[test]
  fn test_scan_honors_gitignore() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join(".git")).unwrap();
    std::fs::write(dir.path().join(".gitignore"), "generated/\n*.tmp.rs\n").unwrap();
    std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
    std::fs::write(dir.path().join("scratch.tmp.rs"), "fn x() {}").unwrap();
    std::fs::create_dir(dir.path().join("generated")).unwrap();
    std::fs::write(dir.path().join("generated/gen.rs"), "fn gen() {}").unwrap();

    let result = scan_quiet(dir.path(), &ScanOptions::default());
    let paths: Vec<_> = result.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["main.rs"]);
  }

  #[test]
  fn test_extra_ignore_with_negation() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("keep.rs"), "fn keep() {}").unwrap();
    std::fs::write(dir.path().join("drop.rs"), "fn drop_me() {}").unwrap();

    let opts = ScanOptions {
      extra_ignore: vec!["*.rs".to_string(), "!keep.rs".to_string()],
      ..Default::default()
    };
    let result = scan_quiet(dir.path(), &opts);
    let paths: Vec<_> = result.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["keep.rs"]);
  }

  #[test]
  fn test_ctxignore_honored() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".ctxignore"), "vendored.rs\n").unwrap();
    std::fs::write(dir.path().join("own.rs"), "fn own() {}").unwrap();
    std::fs::write(dir.path().join("vendored.rs"), "fn vendored() {}").unwrap();

    let result = scan_quiet(dir.path(), &ScanOptions::default());
    let paths: Vec<_> = result.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["own.rs"]);
  }

  #[test]
  fn test_binary_detection_by_content() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("text.rs"), "fn main() {}").unwrap();
    std::fs::write(dir.path().join("blob.rs"), b"fn main\x00binary").unwrap();

    let result = scan_quiet(dir.path(), &ScanOptions::default());
    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].relative_path, "text.rs");
  }

  #[test]
  fn test_binary_detection_by_extension() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("logo.png"), "not actually a png").unwrap();

    // Even with a custom extension set including png, the binary set wins.
    let opts = ScanOptions {
      extensions: Some(HashSet::from(["png".to_string()])),
      ..Default::default()
    };
    let result = scan_quiet(dir.path(), &opts);
    assert!(result.files.is_empty());
  }

  #[test]
  fn test_unknown_extension_in_custom_set_is_text() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.custom"), "some notes").unwrap();

    let opts = ScanOptions {
      extensions: Some(HashSet::from(["custom".to_string()])),
      ..Default::default()
    };
    let result = scan_quiet(dir.path(), &opts);
    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].language, Some(Language::Text));
    assert_eq!(result.files[0].file_type, FileType::Docs);
  }

  #[test]
  fn test_skips_large_and_empty_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("small.rs"), "fn s() {}").unwrap();
    std::fs::write(dir.path().join("empty.rs"), "").unwrap();
    std::fs::write(dir.path().join("large.rs"), "x".repeat(2 * 1024 * 1024)).unwrap();

    let opts = ScanOptions {
      max_file_size: 1024 * 1024,
      ..Default::default()
    };
    let result = scan_quiet(dir.path(), &opts);
    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].relative_path, "small.rs");
  }

  #[test]
  fn test_max_depth() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("top.rs"), "fn top() {}").unwrap();
    std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
    std::fs::write(dir.path().join("a/b/deep.rs"), "fn deep() {}").unwrap();

    let opts = ScanOptions {
      max_depth: Some(1),
      ..Default::default()
    };
    let result = scan_quiet(dir.path(), &opts);
    let paths: Vec<_> = result.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["top.rs"]);
  }

  #[test]
  fn test_stats_aggregation() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
    std::fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();
    std::fs::write(dir.path().join("readme.md"), "# Readme").unwrap();

    let result = scan_quiet(dir.path(), &ScanOptions::default());
    assert_eq!(result.stats.total_files, 3);
    assert_eq!(result.stats.by_language["rust"], 2);
    assert_eq!(result.stats.by_type["code"], 2);
    assert_eq!(result.stats.by_type["docs"], 1);
    assert_eq!(result.stats.errors_encountered, 0);
  }
}
