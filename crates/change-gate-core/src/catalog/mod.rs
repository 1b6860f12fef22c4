// crates/change-gate-core/src/catalog/mod.rs
// ============================================================================
// Module: Changeset Catalog
// Description: Loads the ordered changeset list from a manifest or directory.
// Purpose: Produce validated changesets and resolve their SQL text.
// Dependencies: serde_yaml, regex, crate::core
// ============================================================================

//! ## Overview
//! The catalog has two mutually exclusive modes selected by whether the
//! manifest file exists:
//! - manifest mode parses `databaseChangeLog` from YAML ([`manifest`]),
//! - auto-discovery scans versioned `*.up.*` files for comment headers
//!   ([`discovery`]).
//!
//! Both modes return changesets in catalog order and reject duplicate
//! `(id, author)` pairs. SQL text is resolved lazily relative to the base
//! directory.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod discovery;
pub mod manifest;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::ChangeGateError;
use crate::core::Changeset;
use crate::core::ChangesetKey;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default manifest path relative to the base directory.
pub const DEFAULT_CHANGELOG_PATH: &str = "changelog/changelog.yml";
/// Default migrations directory relative to the base directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

// ============================================================================
// SECTION: Source
// ============================================================================

/// Location of a catalog on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSource {
    /// Directory SQL references are resolved against.
    base_dir: PathBuf,
    /// Manifest path; relative paths are resolved against `base_dir`.
    changelog: PathBuf,
    /// Migrations directory; relative paths are resolved against `base_dir`.
    migrations_dir: PathBuf,
}

impl CatalogSource {
    /// Creates a source rooted at `base_dir` with default locations.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            changelog: PathBuf::from(DEFAULT_CHANGELOG_PATH),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
        }
    }

    /// Overrides the manifest path.
    #[must_use]
    pub fn with_changelog(mut self, changelog: impl Into<PathBuf>) -> Self {
        self.changelog = changelog.into();
        self
    }

    /// Overrides the migrations directory.
    #[must_use]
    pub fn with_migrations_dir(mut self, migrations_dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = migrations_dir.into();
        self
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the resolved manifest path.
    #[must_use]
    pub fn changelog_path(&self) -> PathBuf {
        self.base_dir.join(&self.changelog)
    }

    /// Returns the resolved migrations directory.
    #[must_use]
    pub fn migrations_path(&self) -> PathBuf {
        self.base_dir.join(&self.migrations_dir)
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// How the catalog was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogMode {
    /// Explicit YAML manifest.
    Manifest,
    /// Directory scan of versioned SQL files.
    AutoDiscovery,
}

/// Ordered, validated changeset list.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Loading mode.
    mode: CatalogMode,
    /// Directory SQL references are resolved against.
    base_dir: PathBuf,
    /// Changesets in catalog order.
    changesets: Vec<Changeset>,
}

impl Catalog {
    /// Builds a catalog, rejecting duplicate `(id, author)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeGateError::Catalog`] on duplicates.
    pub fn new(
        mode: CatalogMode,
        base_dir: impl Into<PathBuf>,
        changesets: Vec<Changeset>,
    ) -> Result<Self, ChangeGateError> {
        let mut seen: BTreeSet<&ChangesetKey> = BTreeSet::new();
        for changeset in &changesets {
            if !seen.insert(changeset.key()) {
                return Err(ChangeGateError::Catalog(format!(
                    "duplicate changeset {}",
                    changeset.key()
                )));
            }
        }
        Ok(Self {
            mode,
            base_dir: base_dir.into(),
            changesets,
        })
    }

    /// Returns the loading mode.
    #[must_use]
    pub const fn mode(&self) -> CatalogMode {
        self.mode
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the changesets in catalog order.
    #[must_use]
    pub fn changesets(&self) -> &[Changeset] {
        &self.changesets
    }

    /// Returns the number of changesets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    /// Returns whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Returns changesets matching the run context, in catalog order.
    pub fn filter_context<'a>(
        &'a self,
        context: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Changeset> + 'a {
        self.changesets.iter().filter(move |changeset| changeset.matches_context(context))
    }

    /// Reads the SQL text of a changeset.
    ///
    /// # Errors
    ///
    /// Returns [`ChangeGateError::NotFound`] when the file is missing.
    pub fn resolve_sql(&self, changeset: &Changeset) -> Result<String, ChangeGateError> {
        resolve_sql(&self.base_dir, changeset)
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Loads a catalog, choosing manifest mode when the manifest file exists.
///
/// # Errors
///
/// Returns [`ChangeGateError::Catalog`] for malformed, incomplete, or
/// duplicate entries.
pub fn load(source: &CatalogSource) -> Result<Catalog, ChangeGateError> {
    let changelog = source.changelog_path();
    if changelog.is_file() {
        let changesets = manifest::load_manifest(&changelog)?;
        return Catalog::new(CatalogMode::Manifest, source.base_dir(), changesets);
    }
    let changesets = discovery::discover(&source.migrations_path(), source.base_dir())?;
    Catalog::new(CatalogMode::AutoDiscovery, source.base_dir(), changesets)
}

/// Reads the SQL text of a changeset relative to `base_dir`.
///
/// # Errors
///
/// Returns [`ChangeGateError::NotFound`] when the file is missing, or
/// [`ChangeGateError::Catalog`] when it cannot be read as UTF-8 text.
pub fn resolve_sql(base_dir: &Path, changeset: &Changeset) -> Result<String, ChangeGateError> {
    let path = base_dir.join(changeset.sql_file());
    match fs::read_to_string(&path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(ChangeGateError::NotFound(format!("SQL file not found: {}", path.display())))
        }
        Err(err) => Err(ChangeGateError::Catalog(format!(
            "failed to read SQL file {}: {err}",
            path.display()
        ))),
    }
}
