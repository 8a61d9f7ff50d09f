//! Known-insider labels for the supervised model.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::Path;

/// Users marked as insiders. With an `insider` or `label` column only `1`,
/// `true` and `yes` (any case) are positive; without one every listed user is.
pub fn load_labels(path: &Path) -> Result<HashSet<String>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let user_idx = ["user", "employee", "user_id", "actor"]
        .iter()
        .find_map(|name| headers.iter().position(|h| h == name))
        .ok_or_else(|| Error::Config(format!("labels file {} has no user column", path.display())))?;
    let label_idx = ["insider", "label"]
        .iter()
        .find_map(|name| headers.iter().position(|h| h == name));

    let mut positives = HashSet::new();
    for row in reader.records() {
        let row = row?;
        let Some(user) = row.get(user_idx).map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        let positive = match label_idx.and_then(|i| row.get(i)) {
            Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            None => true,
        };
        if positive {
            positives.insert(user.to_string());
        }
    }
    Ok(positives)
}
