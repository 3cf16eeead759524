use std::{
    env, fs,
    io,
    os::unix::fs::DirBuilderExt,
    path::{Path, PathBuf},
};

use log::{debug, warn};

/// Numeric entries found in an instances (or voices) directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NumberedEntries {
    pub ids: Vec<u32>,
}

impl NumberedEntries {
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn last_id(&self) -> u32 {
        self.ids.last().copied().unwrap_or(0)
    }
}

/// Lists directory entries whose name starts with a non-zero number,
/// sorted by that number.
pub fn count_instances(directory: &Path) -> io::Result<NumberedEntries> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if let Some(id) = entry.file_name().to_str().and_then(leading_number) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(NumberedEntries { ids })
}

fn leading_number(name: &str) -> Option<u32> {
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u32>().ok().filter(|id| *id != 0)
}

/// Counts running processes owned by the current user whose name starts
/// with `process_name`. Unreadable entries are skipped.
pub fn count_process(process_name: &str) -> usize {
    let Some(uid) = fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| status_uid(&status))
    else {
        return 0;
    };
    let Ok(entries) = fs::read_dir("/proc") else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.parse::<u64>().is_ok())
        })
        .filter_map(|entry| match fs::read_to_string(entry.path().join("status")) {
            Ok(status) => Some(status),
            Err(err) => {
                debug!("count_process: {}: {err}", entry.path().display());
                None
            }
        })
        .filter(|status| {
            status_name(status).is_some_and(|name| name.starts_with(process_name))
                && status_uid(status) == Some(uid)
        })
        .count()
}

fn status_name(status: &str) -> Option<&str> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Name:"))
        .map(str::trim)
}

fn status_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

/// Resolves `path` to an absolute canonical path, or `None` when it does not
/// exist.
pub fn canonize_path(path: &Path) -> Option<PathBuf> {
    match fs::canonicalize(path) {
        Ok(canonical) => Some(canonical),
        Err(err) => {
            warn!("can't canonize {}: {err}", path.display());
            None
        }
    }
}

/// Replaces everything up to the last `~` with the user's home directory.
pub fn expand_user(directory: &str) -> Option<PathBuf> {
    let home = env::var_os("HOME")?;
    let tail = directory
        .rfind('~')
        .map(|index| &directory[index + 1..])
        .unwrap_or(directory);
    let mut expanded = PathBuf::from(home);
    let tail = tail.trim_start_matches('/');
    if !tail.is_empty() {
        expanded.push(tail);
    }
    Some(expanded)
}

/// `None` when the path can't be inspected.
pub fn is_directory(path: &Path) -> Option<bool> {
    fs::metadata(path).ok().map(|meta| meta.is_dir())
}

pub fn recursive_mkdir(directory: &Path) -> io::Result<()> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(directory)
}

pub fn physical_memory_kib() -> Option<f64> {
    let meminfo = fs::read_to_string("/proc/meminfo")
        .map_err(|err| debug!("physical_memory_kib: /proc/meminfo: {err}"))
        .ok()?;
    let total = kib_field(&meminfo, "MemTotal:");
    if total.is_none() {
        debug!("physical_memory_kib: no line matching 'MemTotal:'");
    }
    total
}

/// Resident set size of this process as a percentage of `physical_kib`.
pub fn proc_memory_usage(physical_kib: f64) -> Option<f64> {
    if physical_kib <= 0.0 {
        return None;
    }
    let status = fs::read_to_string("/proc/self/status")
        .map_err(|err| debug!("proc_memory_usage: /proc/self/status: {err}"))
        .ok()?;
    kib_field(&status, "VmRSS:").map(|rss| rss / physical_kib * 100.0)
}

fn kib_field(text: &str, key: &str) -> Option<f64> {
    text.lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_entries_ignore_non_numeric_and_zero() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["3", "12", "0", "notes", "7abc"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let entries = count_instances(dir.path()).unwrap();
        assert_eq!(entries.ids, vec![3, 7, 12]);
        assert_eq!(entries.count(), 3);
        assert_eq!(entries.last_id(), 12);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(count_instances(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn status_fields_are_parsed() {
        let status = "Name:\tdsandgrains\nUmask:\t0022\nUid:\t1000\t1000\t1000\t1000\nVmRSS:\t  20480 kB\n";
        assert_eq!(status_name(status), Some("dsandgrains"));
        assert_eq!(status_uid(status), Some(1000));
        assert_eq!(kib_field(status, "VmRSS:"), Some(20480.0));
        assert_eq!(kib_field(status, "VmSwap:"), None);
    }

    #[test]
    fn recursive_mkdir_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        recursive_mkdir(&nested).unwrap();
        assert_eq!(is_directory(&nested), Some(true));
        assert_eq!(is_directory(&nested.join("missing")), None);
    }

    #[test]
    fn canonize_resolves_relative_segments() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner");
        fs::create_dir(&inner).unwrap();
        let canonical = canonize_path(&inner.join("..")).unwrap();
        assert_eq!(canonical, canonize_path(dir.path()).unwrap());
        assert!(canonize_path(&dir.path().join("nope")).is_none());
    }

    #[test]
    fn memory_usage_rejects_zero_physical_memory() {
        assert_eq!(proc_memory_usage(0.0), None);
    }
}
