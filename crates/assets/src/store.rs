use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pathtracer_common::AssetName;

use crate::format::{fingerprint, AssetKind, Fingerprint, Material, Mesh};

/// Stable identifier of one loaded asset content. Never reissued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetHandle(u64);

impl AssetHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    Mesh(Mesh),
    Material(Material),
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("glTF parse error: {0}")]
    GltfParse(String),
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
    #[error("asset root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// A file that could not be loaded during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub name: AssetName,
    pub error: String,
}

/// Outcome of one [`AssetStore::load_from`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub added: Vec<AssetName>,
    pub replaced: Vec<AssetName>,
    pub unchanged: usize,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.replaced.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Source {
    fingerprint: Fingerprint,
    items: Vec<AssetName>,
}

enum FileOutcome {
    Added,
    Replaced,
    Unchanged,
}

/// Loaded assets, their handles and the names that currently point at them.
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    assets: BTreeMap<AssetHandle, (AssetName, Asset)>,
    names: BTreeMap<AssetName, AssetHandle>,
    sources: BTreeMap<AssetName, Source>,
    failures: BTreeMap<AssetName, String>,
    next_handle: u64,
    revision: u64,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped once per change set: a scan that changed anything, or an insert.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, handle: AssetHandle) -> Option<&Asset> {
        self.assets.get(&handle).map(|(_, asset)| asset)
    }

    pub fn name_of(&self, handle: AssetHandle) -> Option<&AssetName> {
        self.assets.get(&handle).map(|(name, _)| name)
    }

    /// Handle of the content currently published under `name`.
    pub fn lookup(&self, name: &AssetName) -> Option<AssetHandle> {
        self.names.get(name).copied()
    }

    pub fn get_mesh(&self, handle: AssetHandle) -> Option<&Mesh> {
        match self.get(handle) {
            Some(Asset::Mesh(m)) => Some(m),
            _ => None,
        }
    }

    pub fn get_material(&self, handle: AssetHandle) -> Option<&Material> {
        match self.get(handle) {
            Some(Asset::Material(m)) => Some(m),
            _ => None,
        }
    }

    pub fn mesh(&self, name: &AssetName) -> Option<&Mesh> {
        self.get_mesh(self.lookup(name)?)
    }

    pub fn material(&self, name: &AssetName) -> Option<&Material> {
        self.get_material(self.lookup(name)?)
    }

    /// Every published name with its handle, sorted by name.
    pub fn names(&self) -> impl Iterator<Item = (&AssetName, AssetHandle)> {
        self.names.iter().map(|(name, handle)| (name, *handle))
    }

    /// Published mesh names, sorted.
    pub fn mesh_names(&self) -> impl Iterator<Item = &AssetName> {
        self.names
            .iter()
            .filter(|(_, handle)| matches!(self.get(**handle), Some(Asset::Mesh(_))))
            .map(|(name, _)| name)
    }

    /// Files whose most recent load attempt failed.
    pub fn failures(&self) -> impl Iterator<Item = LoadFailure> + '_ {
        self.failures.iter().map(|(name, error)| LoadFailure {
            name: name.clone(),
            error: error.clone(),
        })
    }

    /// Publish `asset` under `name` outside of a scan.
    pub fn insert(&mut self, name: AssetName, asset: Asset) -> AssetHandle {
        let handle = self.publish(name, asset);
        self.revision += 1;
        handle
    }

    fn publish(&mut self, name: AssetName, asset: Asset) -> AssetHandle {
        self.next_handle += 1;
        let handle = AssetHandle(self.next_handle);
        if let Some(old) = self.names.insert(name.clone(), handle) {
            self.assets.remove(&old);
        }
        self.assets.insert(handle, (name, asset));
        handle
    }

    /// Scan `root` recursively and load every recognised file.
    ///
    /// Files whose content fingerprint is unchanged are skipped. A file that
    /// fails is recorded in the report and in [`failures`](Self::failures);
    /// whatever it published before stays published. Deleted files are not
    /// unpublished.
    pub fn load_from(&mut self, root: &Path) -> Result<LoadReport, AssetError> {
        if !root.is_dir() {
            return Err(AssetError::NotADirectory(root.to_path_buf()));
        }
        let _span = tracing::info_span!("asset_scan", root = %root.display()).entered();

        let mut files = Vec::new();
        collect_files(root, &mut files)?;
        files.sort();

        let mut report = LoadReport::default();
        for path in files {
            let Some(kind) = AssetKind::from_path(&path) else {
                continue;
            };
            let name = relative_name(root, &path);
            match self.load_file(&path, &name, kind) {
                Ok(FileOutcome::Added) => report.added.push(name),
                Ok(FileOutcome::Replaced) => report.replaced.push(name),
                Ok(FileOutcome::Unchanged) => report.unchanged += 1,
                Err(err) => {
                    tracing::warn!(asset = %name, error = %err, "asset failed to load");
                    self.failures.insert(name.clone(), err.to_string());
                    report.failures.push(LoadFailure {
                        name,
                        error: err.to_string(),
                    });
                }
            }
        }

        if report.changed() {
            self.revision += 1;
        }
        tracing::info!(
            added = report.added.len(),
            replaced = report.replaced.len(),
            unchanged = report.unchanged,
            failed = report.failures.len(),
            revision = self.revision,
            "asset scan complete"
        );
        Ok(report)
    }

    fn load_file(
        &mut self,
        path: &Path,
        name: &AssetName,
        kind: AssetKind,
    ) -> Result<FileOutcome, AssetError> {
        let bytes = std::fs::read(path)?;
        let fp = fingerprint(&bytes);
        if self.sources.get(name).is_some_and(|s| s.fingerprint == fp) {
            self.failures.remove(name);
            return Ok(FileOutcome::Unchanged);
        }

        // Parse completely before touching published state.
        let items = kind.parse(&bytes)?;

        let previous = self.sources.remove(name);
        let outcome = if previous.is_some() {
            FileOutcome::Replaced
        } else {
            FileOutcome::Added
        };

        let mut published = Vec::with_capacity(items.len());
        for (suffix, asset) in items {
            let item = match suffix {
                Some(suffix) => name.child(&suffix),
                None => name.clone(),
            };
            let handle = self.publish(item.clone(), asset);
            tracing::debug!(asset = %item, handle = handle.raw(), "published");
            published.push(item);
        }

        // Sub-assets that disappeared from a container are unpublished.
        if let Some(previous) = previous {
            for item in previous.items {
                if !published.contains(&item) {
                    if let Some(handle) = self.names.remove(&item) {
                        self.assets.remove(&handle);
                    }
                }
            }
        }

        self.sources.insert(
            name.clone(),
            Source {
                fingerprint: fp,
                items: published,
            },
        );
        self.failures.remove(name);
        Ok(outcome)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), AssetError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            // Symlinked directories can point back into the tree.
            if entry.file_type()?.is_symlink() {
                tracing::debug!(path = %path.display(), "skipping symlinked directory");
                continue;
            }
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn relative_name(root: &Path, path: &Path) -> AssetName {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    AssetName::new(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str =
        r#"{ "positions": [[0,0,0],[1,0,0],[0,1,0]], "indices": [0, 1, 2] }"#;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn scan_publishes_each_recognised_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tri.mesh.json", TRIANGLE);
        write(dir.path(), "props/red.material.json", r#"{ "base_color": [1, 0, 0] }"#);
        write(dir.path(), "readme.txt", "ignored");

        let mut store = AssetStore::new();
        let report = store.load_from(dir.path()).unwrap();

        assert_eq!(report.added.len(), 2);
        assert_eq!(store.revision(), 1);
        assert!(store.mesh(&"tri.mesh.json".into()).is_some());
        assert_eq!(
            store.material(&"props/red.material.json".into()).unwrap().base_color,
            [1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn unchanged_rescan_keeps_revision_and_handles() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tri.mesh.json", TRIANGLE);

        let mut store = AssetStore::new();
        store.load_from(dir.path()).unwrap();
        let handle = store.lookup(&"tri.mesh.json".into()).unwrap();

        let report = store.load_from(dir.path()).unwrap();
        assert!(!report.changed());
        assert_eq!(report.unchanged, 1);
        assert_eq!(store.revision(), 1);
        assert_eq!(store.lookup(&"tri.mesh.json".into()), Some(handle));
    }

    #[test]
    fn changed_file_gets_fresh_handle() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.mesh.json", TRIANGLE);
        write(dir.path(), "b.mesh.json", TRIANGLE);

        let mut store = AssetStore::new();
        store.load_from(dir.path()).unwrap();
        let a = store.lookup(&"a.mesh.json".into()).unwrap();
        let b = store.lookup(&"b.mesh.json".into()).unwrap();

        write(
            dir.path(),
            "a.mesh.json",
            r#"{ "positions": [[0,0,0],[2,0,0],[0,2,0]], "indices": [0, 1, 2] }"#,
        );
        let report = store.load_from(dir.path()).unwrap();

        assert_eq!(report.replaced, vec![AssetName::from("a.mesh.json")]);
        assert_eq!(store.revision(), 2);
        let a2 = store.lookup(&"a.mesh.json".into()).unwrap();
        assert_ne!(a, a2);
        assert!(a2 > b);
        assert!(store.get(a).is_none());
        assert_eq!(store.lookup(&"b.mesh.json".into()), Some(b));
    }

    #[test]
    fn failed_reload_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "tri.mesh.json", TRIANGLE);

        let mut store = AssetStore::new();
        store.load_from(dir.path()).unwrap();
        let handle = store.lookup(&"tri.mesh.json".into()).unwrap();

        write(dir.path(), "tri.mesh.json", "{ not json");
        let report = store.load_from(dir.path()).unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.revision(), 1);
        assert_eq!(store.lookup(&"tri.mesh.json".into()), Some(handle));
        assert!(store.get_mesh(handle).is_some());
        assert_eq!(store.failures().count(), 1);

        write(dir.path(), "tri.mesh.json", TRIANGLE);
        store.load_from(dir.path()).unwrap();
        assert_eq!(store.failures().count(), 0);
    }

    #[test]
    fn one_bad_file_among_ten() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..9 {
            write(dir.path(), &format!("m{i}.mesh.json"), TRIANGLE);
        }
        write(dir.path(), "broken.mesh.json", r#"{ "positions": [] }"#);

        let mut store = AssetStore::new();
        let report = store.load_from(dir.path()).unwrap();

        assert_eq!(report.added.len(), 9);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, AssetName::from("broken.mesh.json"));
        assert_eq!(store.len(), 9);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn gltf_sub_assets_named_after_container() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "scene.gltf",
            r#"{ "asset": { "version": "2.0" }, "meshes": [{ "name": "Box" }] }"#,
        );

        let mut store = AssetStore::new();
        store.load_from(dir.path()).unwrap();
        assert!(store.mesh(&"scene.gltf#Box_0".into()).is_some());
        assert_eq!(
            store.mesh_names().cloned().collect::<Vec<_>>(),
            [AssetName::from("scene.gltf#Box_0")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            write(dir.path(), &format!("mesh_{i}.mesh.json"), TRIANGLE);
        }
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let mut store = AssetStore::new();
        let report = store.load_from(dir.path()).unwrap();
        assert_eq!(report.added.len(), 3);
        assert_eq!(store.len(), 3);
        assert!(store.mesh_names().all(|n| !n.as_str().starts_with("loop/")));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AssetStore::new();
        assert!(matches!(
            store.load_from(&dir.path().join("nope")),
            Err(AssetError::NotADirectory(_))
        ));
    }

    #[test]
    fn insert_allocates_new_handles() {
        let mut store = AssetStore::new();
        let first = store.insert("cube".into(), Asset::Mesh(Mesh::unit_cube()));
        let second = store.insert("cube".into(), Asset::Mesh(Mesh::unit_cube()));
        assert_ne!(first, second);
        assert!(store.get(first).is_none());
        assert_eq!(store.revision(), 2);
    }
}
