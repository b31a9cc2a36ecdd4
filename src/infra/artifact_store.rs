// ============================================================
// Layer 6 — Artifact Store
// ============================================================
// Writes the files a training run produces.
//
// A run produces two files that only make sense together: the
// model graph and its metadata sidecar. Writing them one after
// the other could leave a new model next to old metadata if the
// second write failed. So every write is two-phase:
//
//   1. stage   — write the bytes to `<name>.tmp` next to the
//                destination (same directory, same filesystem)
//   2. commit  — rename every staged file onto its destination
//
// Nothing is renamed until every file of the group has been
// staged, so a run that fails while building or staging leaves
// the previous artifacts untouched. A staged file that is never
// committed is deleted when it is dropped.
//
// Commit is ordered, not transactional: the renames happen one
// by one, and a rename failing part way leaves the files before
// it in place while the rest are discarded. The trainer stages
// the model first, so that case can leave a new model beside the
// previous metadata.
//
// File layout:
//   models/
//     maintenance_model.onnx
//     maintenance_metadata.json
//     co2_model.onnx
//     ...
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §15.3 (Drop)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// A file written to its temp path, waiting to be renamed into place
#[derive(Debug)]
pub struct Staged {
    tmp:       PathBuf,
    dest:      PathBuf,
    committed: bool,
}

impl Drop for Staged {
    fn drop(&mut self) {
        if !self.committed {
            // The file may never have been created; nothing to report then
            if fs::remove_file(&self.tmp).is_ok() {
                tracing::debug!("Removed uncommitted '{}'", self.tmp.display());
            }
        }
    }
}

/// Directory that owns the persisted model artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of a file inside the store
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Write `bytes` next to `<dir>/<file_name>` without touching it.
    pub fn stage(&self, file_name: &str, bytes: &[u8]) -> Result<Staged> {
        stage_at(&self.path(file_name), bytes)
    }

    /// Rename every staged file into place, in order.
    pub fn commit(&self, staged: Vec<Staged>) -> Result<Vec<PathBuf>> {
        commit_all(staged)
    }
}

/// Stage `bytes` for an arbitrary destination path
pub fn stage_at(dest: &Path, bytes: &[u8]) -> Result<Staged> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
    }

    let mut tmp_name = dest
        .file_name()
        .with_context(|| format!("'{}' has no file name", dest.display()))?
        .to_os_string();
    tmp_name.push(".tmp");

    let staged = Staged {
        tmp:       dest.with_file_name(tmp_name),
        dest:      dest.to_path_buf(),
        committed: false,
    };
    fs::write(&staged.tmp, bytes)
        .with_context(|| format!("Cannot write '{}'", staged.tmp.display()))?;
    tracing::debug!("Staged {} bytes for '{}'", bytes.len(), dest.display());
    Ok(staged)
}

/// Rename staged files into place. Files not yet renamed when a
/// rename fails are cleaned up by their `Drop`.
pub fn commit_all(staged: Vec<Staged>) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(staged.len());
    for mut s in staged {
        fs::rename(&s.tmp, &s.dest).with_context(|| {
            format!("Cannot move '{}' to '{}'", s.tmp.display(), s.dest.display())
        })?;
        s.committed = true;
        written.push(s.dest.clone());
    }
    Ok(written)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn save(store: &ArtifactStore, files: &[(&str, &[u8])]) -> Result<Vec<PathBuf>> {
        let staged = files
            .iter()
            .map(|(name, bytes)| store.stage(name, bytes))
            .collect::<Result<Vec<_>>>()?;
        store.commit(staged)
    }

    #[test]
    fn test_commit_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"));
        let paths = save(&store, &[("a.onnx", b"model".as_slice()), ("a.json", b"{}".as_slice())]).unwrap();

        assert_eq!(paths, vec![store.path("a.onnx"), store.path("a.json")]);
        assert_eq!(fs::read(&paths[0]).unwrap(), b"model");
        assert_eq!(fs::read_to_string(&paths[1]).unwrap(), "{}");
        assert!(!dir.path().join("models/a.onnx.tmp").exists());
    }

    #[test]
    fn test_dropped_stage_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        save(&store, &[("m.onnx", b"old".as_slice())]).unwrap();

        {
            let staged = store.stage("m.onnx", b"new").unwrap();
            assert!(dir.path().join("m.onnx.tmp").exists());
            drop(staged);
        }

        assert_eq!(fs::read(store.path("m.onnx")).unwrap(), b"old");
        assert!(!dir.path().join("m.onnx.tmp").exists());
    }

    #[test]
    fn test_failed_rename_keeps_earlier_files_and_drops_later_temps() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        save(&store, &[("first.onnx", b"old".as_slice())]).unwrap();
        // A non-empty directory at the second destination makes its rename fail
        fs::create_dir(dir.path().join("blocked.json")).unwrap();
        fs::create_dir(dir.path().join("blocked.json").join("inner")).unwrap();

        let result = save(&store, &[("first.onnx", b"new".as_slice()), ("blocked.json", b"y".as_slice())]);
        assert!(result.is_err());

        // The first rename already happened and is not undone
        assert_eq!(fs::read(store.path("first.onnx")).unwrap(), b"new");
        assert!(store.path("blocked.json").is_dir());
        assert!(!dir.path().join("first.onnx.tmp").exists());
        assert!(!dir.path().join("blocked.json.tmp").exists());
    }
}
