use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::engine::Collection;

/// Root handle over a directory of collections.
///
/// Each collection lives in its own `<name>.db` partition set under the
/// root. Handles are opened lazily and kept until closed.
#[derive(Debug)]
pub struct Db {
    root: PathBuf,
    config: Config,
    collections: HashMap<String, Collection>,
}

impl Db {
    /// Opens (creating when missing) a database root directory with the
    /// default configuration.
    pub fn open(root: impl Into<PathBuf>) -> Result<Db> {
        Db::open_with_config(root, Config::default())
    }

    pub fn open_with_config(root: impl Into<PathBuf>, config: Config) -> Result<Db> {
        config.validate()?;
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::debug!("Db - opened root {}", root.display());
        Ok(Db {
            root,
            config,
            collections: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The named collection, opened on first use.
    pub fn collection(&mut self, name: &str) -> Result<&mut Collection> {
        validate_name(name)?;
        match self.collections.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.root.join(format!("{}.db", name));
                Ok(entry.insert(Collection::open(path, self.config.clone())?))
            }
        }
    }

    /// Flushes and releases one collection handle. Returns `false` when it
    /// was not open.
    pub fn close(&mut self, name: &str) -> Result<bool> {
        match self.collections.remove(name) {
            Some(collection) => {
                collection.close()?;
                tracing::debug!("Db - closed collection '{}'", name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flushes every open collection.
    pub fn flush_all(&mut self) -> Result<()> {
        for collection in self.collections.values_mut() {
            collection.flush()?;
        }
        Ok(())
    }

    /// Names of the collections currently held open, sorted.
    pub fn open_collections(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !ok {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("invalid collection name '{}'", name),
        ));
    }
    Ok(())
}
