//! Pattern retrieval for first-draft generation.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

pub trait Retriever {
    /// Return pattern guidance relevant to `query`. Empty when nothing matches.
    fn retrieve(&self, query: &str) -> Result<String>;
}

impl<R: Retriever + ?Sized> Retriever for Box<R> {
    fn retrieve(&self, query: &str) -> Result<String> {
        (**self).retrieve(query)
    }
}

/// Retriever that never returns anything.
pub struct NoRetriever;

impl Retriever for NoRetriever {
    fn retrieve(&self, _query: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Keyword-overlap retrieval over a directory of pattern files
/// (`.md`, `.txt`, `.xml`).
pub struct PatternDirRetriever {
    dir: PathBuf,
    limit: usize,
}

impl PatternDirRetriever {
    pub fn new(dir: &Path, limit: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            limit,
        }
    }
}

impl Retriever for PatternDirRetriever {
    fn retrieve(&self, query: &str) -> Result<String> {
        let query_terms = terms(query);
        let mut scored = Vec::new();
        let entries =
            fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("list {}", self.dir.display()))?
                .path();
            if !is_pattern_file(&path) {
                continue;
            }
            let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            let score = terms(&text).intersection(&query_terms).count();
            if score > 0 {
                scored.push((score, path, text));
            }
        }
        // Highest score first; file name breaks ties so output is stable.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        debug!(matches = scored.len(), "pattern files scored");

        let sections: Vec<String> = scored
            .into_iter()
            .take(self.limit)
            .map(|(_, path, text)| {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("### {name}\n\n{}", text.trim())
            })
            .collect();
        Ok(sections.join("\n\n"))
    }
}

fn is_pattern_file(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("md" | "txt" | "xml")
        )
}

fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| word.len() >= 3)
        .map(str::to_ascii_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_retriever_is_empty() {
        assert_eq!(NoRetriever.retrieve("anything").expect("retrieve"), "");
    }

    #[test]
    fn ranks_files_by_keyword_overlap() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("screens.md"), "Screen flow fields and screens layout").expect("write");
        fs::write(temp.path().join("lookups.md"), "recordLookups use filterLogic").expect("write");
        fs::write(temp.path().join("ignored.json"), "screen screen screen").expect("write");

        let retriever = PatternDirRetriever::new(temp.path(), 1);
        let text = retriever.retrieve("Screen flow with input fields").expect("retrieve");
        assert!(text.starts_with("### screens.md"));
        assert!(!text.contains("recordLookups"));
    }

    #[test]
    fn no_match_returns_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.md"), "decisions").expect("write");
        let retriever = PatternDirRetriever::new(temp.path(), 3);
        assert_eq!(retriever.retrieve("zzz").expect("retrieve"), "");
    }

    #[test]
    fn missing_dir_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let retriever = PatternDirRetriever::new(&temp.path().join("missing"), 3);
        assert!(retriever.retrieve("screen").is_err());
    }
}
