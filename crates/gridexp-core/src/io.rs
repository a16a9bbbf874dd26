//! JSON persistence of full network state.
//!
//! Used both for loading inputs and for the checkpoint, result and backup
//! artifacts of the expansion loop. Writes go to a sibling temporary file and
//! are renamed into place, so a crash mid-write never leaves a truncated
//! artifact behind.

use crate::{GridError, GridResult, Network};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

impl Network {
    pub fn from_json_str(json: &str) -> GridResult<Network> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> GridResult<Network> {
        let json = fs::read_to_string(path)?;
        let network = Self::from_json_str(&json)
            .map_err(|e| GridError::Parse(format!("{}: {}", path.display(), e)))?;
        debug!(
            path = %path.display(),
            buses = network.buses.len(),
            lines = network.lines.len(),
            "loaded network"
        );
        Ok(network)
    }

    pub fn to_json_string(&self) -> GridResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize the full network state to `path`, replacing any previous file.
    pub fn to_json_file(&self, path: &Path) -> GridResult<()> {
        let json = self.to_json_string()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = staging_path(path);
        fs::write(&staging, json)?;
        if let Err(err) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        debug!(path = %path.display(), "wrote network");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("network"));
    name.push(".partial");
    path.with_file_name(name)
}

/// Path next to `path` with `_<label>` appended to the file stem.
///
/// `results/elec.json` with label `suboptimal` becomes
/// `results/elec_suboptimal.json`.
pub fn labeled_path(path: &Path, label: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "network".to_string());
    let file_name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, label, ext.to_string_lossy()),
        None => format!("{}_{}", stem, label),
    };
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bus, Line, Snapshot};

    #[test]
    fn test_labeled_path() {
        assert_eq!(
            labeled_path(Path::new("results/elec.json"), "suboptimal"),
            PathBuf::from("results/elec_suboptimal.json")
        );
        assert_eq!(
            labeled_path(Path::new("elec"), "checkpoint"),
            PathBuf::from("elec_checkpoint")
        );
    }

    #[test]
    fn test_file_roundtrip_keeps_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("net.json");

        let mut network = Network::new("roundtrip");
        network.buses.push(Bus::new("a", 220.0));
        network.buses.push(Bus::new("b", 220.0));
        let mut line = Line::new("a-b", "a", "b").with_s_nom(80.0).extendable(5.0);
        line.s_nom_opt = 93.5;
        line.p0 = vec![40.0, -12.0];
        network.lines.push(line);
        network.set_snapshots(Snapshot::hourly_from_ymd(2013, 1, 1, 2));
        network.objective = Some(1234.5);

        network.to_json_file(&path).unwrap();
        assert!(!staging_path(&path).exists());

        let loaded = Network::from_json_file(&path).unwrap();
        assert_eq!(loaded.lines[0].s_nom_opt, 93.5);
        assert_eq!(loaded.lines[0].p0, vec![40.0, -12.0]);
        assert_eq!(loaded.lines[0].s_nom_max, None);
        assert_eq!(loaded.snapshots, network.snapshots);
        assert_eq!(loaded.objective, Some(1234.5));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "name": "minimal",
            "buses": [{"name": "a", "v_nom": 110.0}],
            "lines": [{"name": "l", "bus0": "a", "bus1": "a", "s_nom": 10.0}]
        }"#;
        let network = Network::from_json_str(json).unwrap();
        assert_eq!(network.lines[0].num_parallel, 1.0);
        assert!(!network.lines[0].s_nom_extendable);
        assert_eq!(network.buses[0].carrier, "AC");
    }

    #[test]
    fn test_failed_rename_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory cannot be replaced by a file
        let path = dir.path().join("occupied.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let err = Network::new("blocked").to_json_file(&path).unwrap_err();
        assert!(matches!(err, GridError::Io(_)));
        assert!(!staging_path(&path).exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Network::from_json_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, GridError::Io(_)));
    }
}
