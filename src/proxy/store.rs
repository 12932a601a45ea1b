//! Proxy list and health state files

use crate::proxy::ProxyRecord;
use crate::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// Reads one proxy address per line, skipping blank lines and `#` comments
pub fn load_proxy_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Reads a JSON object of address to [`ProxyRecord`]
pub fn read_state(path: &Path) -> Result<BTreeMap<String, ProxyRecord>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Writes the records as a pretty-printed JSON object keyed by address
pub fn write_state(path: &Path, records: &BTreeMap<String, ProxyRecord>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)?;
    Ok(())
}
