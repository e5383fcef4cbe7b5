use crate::error::{IoContext, ReconcileError, Result};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// SHA-256 of raw bytes, lowercase hex
pub fn content_hash(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(64);
    for b in Sha256::digest(bytes) {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

pub fn path_to_forward_slashes(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if raw.contains('\\') {
        raw.replace('\\', "/")
    } else {
        raw.into_owned()
    }
}

/// Flatten a relative artifact path into a single backup file name.
///
/// `app/Models/User.php` at index 3 becomes `003_app__Models__User.php.bak`.
/// The index keeps names unique when two entries flatten to the same string.
pub fn backup_file_name(index: usize, relative_path: &str) -> String {
    let flattened: String = relative_path
        .trim_start_matches(['/', '\\'])
        .replace(['/', '\\'], "__")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{:03}_{}.bak", index, flattened)
}

/// Read a JSON document; a missing or blank file yields `T::default()`
pub fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path).at_path(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&content).map_err(|err| ReconcileError::json(path, err))
}

/// Pretty-print to a temporary sibling, then rename over `path`
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).at_path(parent)?;
    let mut content =
        serde_json::to_string_pretty(value).map_err(|err| ReconcileError::json(path, err))?;
    content.push('\n');

    let mut temp = NamedTempFile::new_in(parent).at_path(parent)?;
    temp.write_all(content.as_bytes()).at_path(path)?;
    temp.persist(path).map_err(|err| ReconcileError::io(path, err.error))?;
    Ok(())
}

const SHORT_ID_ALPHABET: &[u8] = b"23456789abcdefghijkmnpqrstuvwxyz";

pub fn make_short_random_id(prefix: &str, len: usize) -> String {
    let mut rng = rand::thread_rng();

    let mut out = String::with_capacity(prefix.len() + if prefix.is_empty() { 0 } else { 1 } + len);
    if !prefix.is_empty() {
        out.push_str(prefix);
        out.push('-');
    }

    for _ in 0..len {
        let idx = rng.gen_range(0..SHORT_ID_ALPHABET.len());
        out.push(SHORT_ID_ALPHABET[idx] as char);
    }

    out
}
