//! # Map Storage
//!
//! Persistence for the world's terrain layout. The world only talks to the
//! [MapStore] trait; [JsonMapStore] keeps the layout in a single JSON file:
//!
//! ```json
//! {"width": 3, "height": 2, "rows": [["Empty","Mountain","Empty"],["Water","Empty","Grass"]]}
//! ```
//!
//! Rows are indexed by `y`. Writes go to a temp file in the same directory and
//! are renamed over the destination, so readers never observe a partial map.
//! Occupancy is runtime state and is never persisted.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::world::grid::{CellType, Grid};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("map file not found: {0}")]
    Missing(PathBuf),

    #[error("map I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("map JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("map layout is malformed: {0}")]
    Malformed(String),

    #[error("no map store configured")]
    Unconfigured,
}

/// Serialized terrain layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapFile {
    pub width: i32,
    pub height: i32,
    pub rows: Vec<Vec<CellType>>,
}

impl MapFile {
    pub fn from_grid(grid: &Grid) -> Self {
        Self {
            width: grid.width(),
            height: grid.height(),
            rows: grid.rows(),
        }
    }

    /// An all-empty layout.
    pub fn blank(width: i32, height: i32) -> Self {
        Self::from_grid(&Grid::new(width, height))
    }

    /// Build a fresh grid, checking the declared dimensions against the rows.
    pub fn into_grid(self) -> Result<Grid, StorageError> {
        let grid = Grid::from_rows(&self.rows)
            .ok_or_else(|| StorageError::Malformed("rows are empty or ragged".to_string()))?;
        if grid.width() != self.width || grid.height() != self.height {
            return Err(StorageError::Malformed(format!(
                "declared {}x{} but rows are {}x{}",
                self.width,
                self.height,
                grid.width(),
                grid.height()
            )));
        }
        Ok(grid)
    }
}

/// Load and save the terrain layout.
pub trait MapStore: Send + Sync {
    fn load(&self) -> Result<MapFile, StorageError>;
    fn save(&self, map: &MapFile) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct JsonMapStore {
    path: PathBuf,
}

impl JsonMapStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the stored map, or write and return a blank one when the file is absent.
    pub fn load_or_create(&self, width: i32, height: i32) -> Result<MapFile, StorageError> {
        match self.load() {
            Err(StorageError::Missing(_)) => {
                let map = MapFile::blank(width, height);
                self.save(&map)?;
                info!("Created blank {}x{} map at {}", width, height, self.path.display());
                Ok(map)
            }
            other => other,
        }
    }

    fn write_atomic(&self, content: &str) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let base = self
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("map.json");

        let mut counter = 0u32;
        let tmp_path = loop {
            let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut tmp) => {
                    tmp.write_all(content.as_bytes())?;
                    tmp.flush()?;
                    let _ = tmp.sync_all();
                    break candidate;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        // Best-effort directory fsync so the rename survives a crash.
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
        Ok(())
    }
}

impl MapStore for JsonMapStore {
    fn load(&self) -> Result<MapFile, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::Missing(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let map: MapFile = serde_json::from_str(&content)?;
        debug!("Loaded {}x{} map from {}", map.width, map.height, self.path.display());
        Ok(map)
    }

    fn save(&self, map: &MapFile) -> Result<(), StorageError> {
        let content = serde_json::to_string(map)?;
        self.write_atomic(&content)?;
        debug!("Saved {}x{} map to {}", map.width, map.height, self.path.display());
        Ok(())
    }
}
