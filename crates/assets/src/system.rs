use std::path::{Path, PathBuf};

use pathtracer_engine::{FrameContext, Key, System, SystemError};

use crate::store::{AssetError, AssetStore, LoadFailure, LoadReport};

/// Leaf producer: loads assets from a directory into its [`AssetStore`].
///
/// Load failures are never fatal. They are logged when they happen and
/// reported as engine diagnostics on the next update.
#[derive(Debug, Default)]
pub struct AssetSystem {
    root: Option<PathBuf>,
    store: AssetStore,
    unreported: Vec<LoadFailure>,
    reload_requested: bool,
}

impl AssetSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `root` during init, and rescan it when `R` is pressed.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AssetStore {
        &mut self.store
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Scan `dir` and publish what it contains. `dir` becomes the root for
    /// later rescans.
    pub fn load_from(&mut self, dir: impl AsRef<Path>) -> Result<LoadReport, AssetError> {
        let dir = dir.as_ref();
        self.root = Some(dir.to_path_buf());
        let report = self.store.load_from(dir)?;
        self.unreported.extend(report.failures.iter().cloned());
        Ok(report)
    }

    /// Rescan the root on the next update.
    pub fn request_reload(&mut self) {
        self.reload_requested = true;
    }

    fn rescan(&mut self) -> Result<(), SystemError> {
        let Some(root) = self.root.clone() else {
            return Ok(());
        };
        self.load_from(&root)
            .map(|_| ())
            .map_err(|err| SystemError::recoverable(format!("asset scan of {}: {err}", root.display())))
    }
}

impl System for AssetSystem {
    fn init(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        if self.store.revision() == 0 {
            if let Err(err) = self.rescan() {
                ctx.warn(err.to_string());
            }
        }
        for failure in self.unreported.drain(..) {
            ctx.warn(format!("{}: {}", failure.name, failure.error));
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut FrameContext<'_>) -> Result<(), SystemError> {
        if self.reload_requested || ctx.input.was_pressed(Key::R) {
            self.reload_requested = false;
            self.rescan()?;
        }
        for failure in self.unreported.drain(..) {
            ctx.warn(format!("{}: {}", failure.name, failure.error));
        }
        Ok(())
    }
}
