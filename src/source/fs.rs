//! Filesystem document source.
//!
//! Walks a root directory honouring `.gitignore`, reads file content on
//! demand and counts term matches across files in parallel. Nothing is
//! indexed: every query re-scans the files it needs.

use crate::config::FsConfig;
use crate::error::{Error, Result};
use crate::source::{
    count_matches, DocId, DocumentSource, Field, Property, PropertyAccessor, SourceContext,
    TermCounts, TermPattern, CONTENT, FIELDS, SIZE,
};
use crate::utils::is_binary;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Directories never worth scanning
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
];

/// Source over the files below a root directory
pub struct FsSource {
    name: String,
    root: PathBuf,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    hidden: bool,
    max_file_size: u64,
    /// Files discovered by the last walk
    files: RwLock<Arc<Vec<PathBuf>>>,
}

impl FsSource {
    /// Create a source rooted at `root`
    pub fn new(root: impl AsRef<Path>, config: &FsConfig) -> Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(Error::MissingArgument("root"));
        }
        let root = root.canonicalize()?;

        Ok(Self {
            name: format!("fs:{}", root.display()),
            root,
            include: build_globset(&config.include)?,
            exclude: build_globset(&config.exclude)?,
            hidden: config.hidden,
            max_file_size: config.max_file_size,
            files: RwLock::new(Arc::new(Vec::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Document id for a file path
    pub fn doc_id(path: &Path) -> DocId {
        DocId::from(path.to_string_lossy().into_owned())
    }

    fn walk(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(!self.hidden)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !SKIPPED_DIRS.contains(&name.as_ref())
            })
            .build();

        walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.into_path())
            .filter(|path| self.is_selected(path))
            .collect()
    }

    fn is_selected(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        if let Some(ref include) = self.include {
            if !include.is_match(rel) {
                return false;
            }
        }
        if let Some(ref exclude) = self.exclude {
            if exclude.is_match(rel) {
                return false;
            }
        }
        true
    }

    /// The cached file list, walking first if nothing was listed yet
    fn files(&self) -> Arc<Vec<PathBuf>> {
        if let Ok(files) = self.files.read() {
            if !files.is_empty() {
                return files.clone();
            }
        }
        let walked = Arc::new(self.walk());
        if let Ok(mut files) = self.files.write() {
            *files = walked.clone();
        }
        walked
    }

    /// Read a file as text, `None` for unreadable, oversized or binary files
    fn read_text(&self, path: &Path) -> Option<String> {
        let meta = fs::metadata(path).ok()?;
        if meta.len() > self.max_file_size {
            return None;
        }
        let bytes = fs::read(path).ok()?;
        if is_binary(&bytes) {
            return None;
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Files are only served from below the root
    fn path_for(&self, id: &DocId) -> Option<PathBuf> {
        let path = PathBuf::from(id.as_str());
        path.starts_with(&self.root).then_some(path)
    }

    fn fields_for(&self, path: &Path) -> Vec<Field> {
        let mut fields = Vec::with_capacity(3);
        if let Some(name) = path.file_name() {
            fields.push(Field::text("name", name.to_string_lossy()));
        }
        // `path` is the directory below the root; the file name is `name`
        let dir = path
            .parent()
            .and_then(|parent| parent.strip_prefix(&self.root).ok())
            .filter(|rel| !rel.as_os_str().is_empty());
        if let Some(rel) = dir {
            fields.push(Field::text("path", rel.to_string_lossy()));
        }
        if let Some(ext) = path.extension() {
            fields.push(Field::category(
                "extension",
                vec![ext.to_string_lossy().to_lowercase()],
            ));
        }
        fields
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid glob `{}`: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| Error::Config(e.to_string()))
}

impl PropertyAccessor for FsSource {
    fn property(&self, id: &DocId, name: &str) -> Option<Property> {
        let path = self.path_for(id)?;
        match name {
            CONTENT => self.read_text(&path).map(|text| Property::Text(Arc::from(text))),
            SIZE => fs::metadata(&path).ok().map(|m| Property::Int(m.len() as i64)),
            FIELDS => Some(Property::Fields(Arc::from(self.fields_for(&path)))),
            _ => None,
        }
    }
}

impl DocumentSource for FsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_documents(&self, ctx: &SourceContext) -> Result<Vec<DocId>> {
        let walked = Arc::new(self.walk());
        ctx.check()?;
        debug!(source = %self.name, files = walked.len(), "listed documents");

        let ids = walked.iter().map(|p| Self::doc_id(p)).collect();
        if let Ok(mut files) = self.files.write() {
            *files = walked;
        }
        Ok(ids)
    }

    fn term_frequency(&self, ctx: &SourceContext, term: &TermPattern) -> Result<TermCounts> {
        let regex = term.compile()?;
        let files = self.files();

        let counts: TermCounts = files
            .par_iter()
            .filter_map(|path| {
                if ctx.token.is_cancelled() {
                    return None;
                }
                let content = self.read_text(path)?;
                let count = count_matches(&regex, &content);
                (count > 0).then(|| (Self::doc_id(path), count))
            })
            .collect();

        ctx.check()?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CancelToken;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {\n    helper();\n}\n").unwrap();
        fs::write(dir.path().join("lib.rs"), "pub fn helper() {}\n// helper docs\n").unwrap();
        fs::write(dir.path().join("notes.md"), "nothing here\n").unwrap();
        fs::write(dir.path().join("blob.bin"), [0u8; 128]).unwrap();
        dir
    }

    fn ctx() -> SourceContext {
        SourceContext::new(CancelToken::new())
    }

    #[test]
    fn test_lists_files() {
        let dir = fixture();
        let source = FsSource::new(dir.path(), &FsConfig::default()).unwrap();
        let docs = source.list_documents(&ctx()).unwrap();
        assert_eq!(docs.len(), 4);
    }

    #[test]
    fn test_include_glob() {
        let dir = fixture();
        let config = FsConfig {
            include: vec!["*.rs".to_string()],
            ..FsConfig::default()
        };
        let source = FsSource::new(dir.path(), &config).unwrap();
        let docs = source.list_documents(&ctx()).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.as_str().ends_with(".rs")));
    }

    #[test]
    fn test_term_frequency_skips_binary() {
        let dir = fixture();
        let source = FsSource::new(dir.path(), &FsConfig::default()).unwrap();
        source.list_documents(&ctx()).unwrap();

        let counts = source
            .term_frequency(&ctx(), &TermPattern::Literal("helper".into()))
            .unwrap();
        assert_eq!(counts.len(), 2);
        let lib = FsSource::doc_id(&source.root().join("lib.rs"));
        assert_eq!(counts[&lib], 2);
    }

    #[test]
    fn test_fields_and_size() {
        let dir = fixture();
        let source = FsSource::new(dir.path(), &FsConfig::default()).unwrap();
        let id = FsSource::doc_id(&source.root().join("notes.md"));

        assert_eq!(source.size(&id), Some(13));
        let fields = source.fields(&id);
        assert!(fields.iter().any(|f| f.name == "name"));
        assert!(fields
            .iter()
            .any(|f| f.name == "extension" && f.value.texts().any(|t| t == "md")));
    }

    #[test]
    fn test_path_field_holds_directory_only() {
        let dir = fixture();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("guide.md"), "guide\n").unwrap();
        let source = FsSource::new(dir.path(), &FsConfig::default()).unwrap();

        let nested = source.fields(&FsSource::doc_id(&source.root().join("docs").join("guide.md")));
        let path: Vec<&str> = nested
            .iter()
            .filter(|f| f.name == "path")
            .flat_map(|f| f.value.texts())
            .collect();
        assert_eq!(path, vec!["docs"]);

        // The file name is matched once, through `name`
        let top = source.fields(&FsSource::doc_id(&source.root().join("notes.md")));
        assert!(!top.iter().any(|f| f.name == "path"));
        let mentions: usize = top
            .iter()
            .flat_map(|f| f.value.texts())
            .filter(|t| t.contains("notes"))
            .count();
        assert_eq!(mentions, 1);
    }

    #[test]
    fn test_missing_root() {
        let result = FsSource::new("", &FsConfig::default());
        assert!(matches!(result, Err(Error::MissingArgument("root"))));
    }

    #[test]
    fn test_outside_root_is_absent() {
        let dir = fixture();
        let source = FsSource::new(dir.path(), &FsConfig::default()).unwrap();
        assert!(source.content(&DocId::from("/etc/hostname")).is_none());
    }
}
