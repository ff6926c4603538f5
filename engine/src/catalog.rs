//! Item catalog seam.
//!
//! The engine treats the catalog as a pure function of persisted
//! configuration text: it returns one string per drawable unit, expanded from
//! name + quantity pairs. Ordering is not meaningful, but the expansion must
//! be deterministic for unchanged configuration so the content hash computed
//! over it is stable.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Supplies the canonical expanded item list.
pub trait CatalogReader: Send + Sync {
    fn read_expanded_items(&self) -> Result<Vec<String>, CatalogError>;
}

/// One catalog line: a display name and how many drawable units it expands to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub quantity: u32,
}

/// Expand entries into the flat drawable list. Each occurrence is a distinct
/// unit sharing a display name; quantity zero contributes nothing.
pub fn expand_entries(entries: &[CatalogEntry]) -> Vec<String> {
    let mut items = Vec::new();
    for entry in entries {
        for _ in 0..entry.quantity {
            items.push(entry.name.clone());
        }
    }
    items
}

/// Catalog backed by a config file of `name,quantity` lines.
///
/// Blank lines and `#` comments are skipped. The quantity is taken from the
/// text after the last comma when it parses as an integer; otherwise the
/// whole line is a name with quantity 1, so names containing commas still
/// work.
#[derive(Clone, Debug)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogReader for FileCatalog {
    fn read_expanded_items(&self) -> Result<Vec<String>, CatalogError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(expand_entries(&parse_catalog_text(&text)))
    }
}

/// Parse catalog config text into entries.
pub fn parse_catalog_text(text: &str) -> Vec<CatalogEntry> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, quantity) = match line.rsplit_once(',') {
            Some((name, qty)) => match qty.trim().parse::<u32>() {
                Ok(quantity) => (name.trim(), quantity),
                Err(_) => (line, 1),
            },
            None => (line, 1),
        };
        if name.is_empty() {
            continue;
        }
        entries.push(CatalogEntry {
            name: name.to_string(),
            quantity,
        });
    }
    entries
}

/// Fixed in-memory catalog, swappable at runtime. Used by tests and demos to
/// simulate catalog edits without a config file.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    items: RwLock<Vec<String>>,
}

impl StaticCatalog {
    pub fn new(items: Vec<String>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    /// Replace the catalog contents, as a staff catalog edit would.
    pub fn set_items(&self, items: Vec<String>) {
        *self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = items;
    }
}

impl CatalogReader for StaticCatalog {
    fn read_expanded_items(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .items
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }
}

impl<C: CatalogReader> CatalogReader for std::sync::Arc<C> {
    fn read_expanded_items(&self) -> Result<Vec<String>, CatalogError> {
        self.as_ref().read_expanded_items()
    }
}
