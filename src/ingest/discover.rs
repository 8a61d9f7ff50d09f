//! Locate source CSVs under a data directory.

use super::LogSource;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// For each source, the lexicographically first `<stem>.csv` found within `max_depth`.
pub fn discover(data_dir: &Path, max_depth: usize) -> BTreeMap<LogSource, PathBuf> {
    let mut found: BTreeMap<LogSource, PathBuf> = BTreeMap::new();
    if !data_dir.exists() {
        return found;
    }
    for entry in WalkDir::new(data_dir)
        .max_depth(max_depth.max(1))
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        for source in LogSource::ALL {
            if name != source.file_name() {
                continue;
            }
            let path = entry.path().to_path_buf();
            match found.get(&source) {
                Some(existing) if existing <= &path => {}
                _ => {
                    found.insert(source, path);
                }
            }
        }
    }
    found
}
