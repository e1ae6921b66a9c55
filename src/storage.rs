// Local key/value storage backing the cached session.
use crate::error::StorageError;
use sled::{
    Config,
    Db,
    Tree,
};
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc,
        Mutex,
    },
};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

const LOCAL_STORAGE_TREE: &str = "local_storage";

/// String key/value store with browser local-storage semantics.
pub trait LocalStorage {
    /// read the value stored under `key`, if any
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// write or overwrite the value stored under `key`
    fn set_item(&mut self, key: &str, value: &str) -> StorageResult<()>;

    /// remove `key`; removing a missing key is not an error
    fn remove_item(&mut self, key: &str) -> StorageResult<()>;
}

#[derive(Clone)]
pub struct SledLocalStorage {
    tree: Tree,
}

impl SledLocalStorage {
    pub fn new(db: &Db) -> StorageResult<Self> {
        let tree = db.open_tree(LOCAL_STORAGE_TREE)?;
        Ok(Self { tree })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = Config::default().path(path).open()?;
        Self::new(&db)
    }
}

impl LocalStorage for SledLocalStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| StorageError::Backend(format!("value for {key}: {e}"))),
            None => Ok(None),
        }
    }

    fn set_item(&mut self, key: &str, value: &str) -> StorageResult<()> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> StorageResult<()> {
        self.tree.remove(key.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }
}

/// Process-local storage; clones share the same map.
#[derive(Clone, Default)]
pub struct InMemoryLocalStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<Mutex<usize>>,
}

impl InMemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_item` calls observed so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn items(&self) -> Arc<Mutex<HashMap<String, String>>> {
        self.items.clone()
    }
}

impl LocalStorage for InMemoryLocalStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        Ok(items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> StorageResult<()> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> StorageResult<()> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}
