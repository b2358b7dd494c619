//! JSON snapshot storage for known listing ids and qualified cars.
//!
//! Each collection lives in its own document and every save replaces the
//! whole document through a temp file in the same directory followed by a
//! rename, so a reader sees either the previous snapshot or the new one.

use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::models::{MonitorState, QualifiedCar};

pub const KNOWN_LISTINGS_FILE: &str = "known_listings.json";
pub const QUALIFIED_CARS_FILE: &str = "good_cars.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct KnownListingsDocument {
    #[serde(default)]
    listings: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QualifiedCarsDocument {
    #[serde(default)]
    cars: Vec<QualifiedCar>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    known_listings_path: PathBuf,
    qualified_cars_path: PathBuf,
}

impl StateStore {
    /// Store keeping both documents in `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            known_listings_path: data_dir.join(KNOWN_LISTINGS_FILE),
            qualified_cars_path: data_dir.join(QUALIFIED_CARS_FILE),
        }
    }

    pub fn known_listings_path(&self) -> &Path {
        &self.known_listings_path
    }

    pub fn qualified_cars_path(&self) -> &Path {
        &self.qualified_cars_path
    }

    /// Loads both snapshots. Missing documents count as empty; unreadable
    /// ones are an error.
    pub fn load(&self) -> Result<MonitorState> {
        let known: KnownListingsDocument = read_document(&self.known_listings_path)?;
        let qualified: QualifiedCarsDocument = read_document(&self.qualified_cars_path)?;

        let state = MonitorState::from_snapshots(
            known.listings.into_iter().collect(),
            qualified.cars,
        );

        info!(
            "Loaded {} known listings and {} qualified cars",
            state.known_ids.len(),
            state.qualified_cars.len()
        );
        Ok(state)
    }

    pub fn save_known_ids(&self, known_ids: &HashSet<String>) -> Result<()> {
        let mut listings: Vec<String> = known_ids.iter().cloned().collect();
        listings.sort_unstable();

        write_document(
            &self.known_listings_path,
            &KnownListingsDocument { listings },
        )?;
        debug!("Saved {} known listings", known_ids.len());
        Ok(())
    }

    pub fn save_qualified_cars(&self, cars: &[QualifiedCar]) -> Result<()> {
        write_document(
            &self.qualified_cars_path,
            &QualifiedCarsDocument {
                cars: cars.to_vec(),
            },
        )?;
        debug!("Saved {} qualified cars", cars.len());
        Ok(())
    }

    /// Saves both snapshots.
    pub fn save(&self, state: &MonitorState) -> Result<()> {
        self.save_qualified_cars(&state.qualified_cars)?;
        self.save_known_ids(&state.known_ids)
    }
}

fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

    let file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.write_all(b"\n")?;

    let file = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    file.as_file().sync_all()?;
    file.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}
