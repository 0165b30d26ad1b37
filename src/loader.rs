//! Locating and loading model sources
//!
//! Sources are AST item files found on the model search path. Each `import`
//! directive in a loaded file queues another source, unless it is already
//! queued, so the merged item list holds every file exactly once.

use std::fs;
use std::path::{Path, PathBuf};

use crate::ast::{parse_items, Item};
use crate::diagnostics::Diagnostics;
use crate::error::BcmdError;

/// Extension tried when a source name is not found as given
pub const SOURCE_EXT: &str = ".json";

/// Result of loading a set of sources
#[derive(Debug, Clone, Default)]
pub struct LoadedSources {
    /// Every source name attempted, in load order
    pub sources: Vec<String>,
    /// Sources that loaded, with the path they were found at
    pub parsed: Vec<(String, PathBuf)>,
    /// Sources that were missing or failed to parse
    pub failed: Vec<String>,
    /// Items of every parsed source, concatenated in load order
    pub merged: Vec<Item>,
}

impl LoadedSources {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Convert to the merged items, failing if any source did not load
    pub fn into_items(self) -> Result<Vec<Item>, BcmdError> {
        if self.failed.is_empty() {
            Ok(self.merged)
        } else {
            Err(BcmdError::SourcesFailed(self.failed))
        }
    }
}

/// Two source names refer to the same file, with or without the extension
fn same_source(a: &str, b: &str) -> bool {
    a.strip_suffix(SOURCE_EXT).unwrap_or(a) == b.strip_suffix(SOURCE_EXT).unwrap_or(b)
}

/// First existing `dir/filename` on the search path
pub fn search_file(filename: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    search_path
        .iter()
        .map(|dir| dir.join(filename))
        .find(|candidate| candidate.exists())
}

/// Find a source on the search path, retrying with [`SOURCE_EXT`] appended
pub fn find_source(name: &str, search_path: &[PathBuf], diags: &mut Diagnostics) -> Option<PathBuf> {
    diags.message(format!("Searching for source file: {}", name));
    if let Some(path) = search_file(name, search_path) {
        return Some(path);
    }
    if name.ends_with(SOURCE_EXT) {
        return None;
    }
    let extended = format!("{}{}", name, SOURCE_EXT);
    diags.message(format!("Not found, trying with added extension: {}", extended));
    search_file(&extended, search_path)
}

/// Read and decode one item file
pub fn read_items(path: &Path) -> Result<Vec<Item>, BcmdError> {
    let text = fs::read_to_string(path).map_err(|e| BcmdError::io(path, e))?;
    parse_items(&text)
}

/// Load the named sources and everything they import
///
/// Missing or malformed files are recorded in [`LoadedSources::failed`] rather
/// than aborting, so that every problem is reported in one run.
pub fn load_sources(
    names: &[String],
    search_path: &[PathBuf],
    diags: &mut Diagnostics,
) -> LoadedSources {
    let mut loaded = LoadedSources {
        sources: names.to_vec(),
        ..LoadedSources::default()
    };

    let mut next = 0;
    while next < loaded.sources.len() {
        let name = loaded.sources[next].clone();
        next += 1;

        let Some(path) = find_source(&name, search_path, diags) else {
            diags.warn(format!("File not found: {}", name));
            loaded.failed.push(name);
            continue;
        };

        let items = match read_items(&path) {
            Ok(items) => items,
            Err(e) => {
                diags.error(format!("Failed to load {}: {}", path.display(), e));
                loaded.failed.push(path.display().to_string());
                continue;
            }
        };

        for item in &items {
            if let Item::Import { files } = item {
                for import in files {
                    if !loaded.sources.iter().any(|s| same_source(s, import)) {
                        loaded.sources.push(import.clone());
                    }
                }
            }
        }

        diags.detail(format!("Loaded {} item(s) from {}", items.len(), path.display()));
        loaded.parsed.push((name, path));
        loaded.merged.extend(items);
    }

    diags.message(format!(
        "Total number of attempted source files: {}",
        loaded.sources.len()
    ));
    diags.message(format!(
        "{} parsed, {} failed",
        loaded.parsed.len(),
        loaded.failed.len()
    ));
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fresh scratch directory under the system temp dir
    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bcmd-loader-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("Should create scratch dir");
        dir
    }

    #[test]
    fn test_imports_are_followed_once() {
        let dir = scratch("imports");
        fs::write(
            dir.join("main.json"),
            r#"[{ "item": "import", "files": ["lib", "lib.json"] },
                { "item": "assign", "target": "a", "expr": { "literal": 1 } }]"#,
        )
        .expect("Should write main");
        fs::write(
            dir.join("lib.json"),
            r#"[{ "item": "import", "files": ["main.json"] },
                { "item": "assign", "target": "b", "expr": { "literal": 2 } }]"#,
        )
        .expect("Should write lib");

        let mut diags = Diagnostics::new();
        let loaded = load_sources(&["main".to_string()], &[dir.clone()], &mut diags);

        assert!(loaded.is_complete());
        assert_eq!(loaded.sources, vec!["main", "lib"]);
        assert_eq!(loaded.parsed.len(), 2);
        assert_eq!(loaded.merged.len(), 4);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_source_is_recorded() {
        let dir = scratch("missing");
        let mut diags = Diagnostics::new();
        let loaded = load_sources(&["nowhere".to_string()], &[dir.clone()], &mut diags);

        assert_eq!(loaded.failed, vec!["nowhere"]);
        assert!(matches!(
            loaded.into_items(),
            Err(BcmdError::SourcesFailed(failed)) if failed == vec!["nowhere".to_string()]
        ));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_malformed_source_fails() {
        let dir = scratch("malformed");
        fs::write(dir.join("bad.json"), "[{ \"item\": \"diffeqn\" }]").expect("Should write");
        let mut diags = Diagnostics::new();
        let loaded = load_sources(&["bad.json".to_string()], &[dir.clone()], &mut diags);

        assert_eq!(loaded.failed.len(), 1);
        assert!(diags.has_errors());
        let _ = fs::remove_dir_all(dir);
    }
}
