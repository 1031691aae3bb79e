use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;

use crate::error::StorageError;

/// Typed key-value wrapper over the embedded database.
///
/// Values are bincode-serialized; keys are plain strings. Shared by the
/// current key store, the account cache and the migration marker.
pub struct Storage {
    db: Db,
}

impl Storage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let db = sled::Config::new().path(path).open()?;
        Ok(Storage { db })
    }

    /// In-memory database for tests; nothing touches disk.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Storage { db })
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let serialized =
            bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.db.insert(key.as_bytes(), serialized)?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.get(key.as_bytes())? {
            Some(data) => {
                let deserialized = bincode::deserialize(&data)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(deserialized))
            }
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.db.contains_key(key.as_bytes())?)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.db.remove(key.as_bytes())?;
        Ok(())
    }

    /// Keys under a `prefix:` namespace, in lexicographic order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.db
            .scan_prefix(prefix.as_bytes())
            .filter_map(|entry| entry.ok())
            .filter_map(|(k, _)| String::from_utf8(k.to_vec()).ok())
            .collect()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let storage = Storage::temporary().unwrap();
        storage.put("answer", &42u64).unwrap();

        assert_eq!(storage.get::<u64>("answer").unwrap(), Some(42));
        assert_eq!(storage.get::<u64>("missing").unwrap(), None);
    }

    #[test]
    fn test_remove_and_contains() {
        let storage = Storage::temporary().unwrap();
        storage.put("k", &"v".to_string()).unwrap();

        assert!(storage.contains("k").unwrap());
        storage.remove("k").unwrap();
        assert!(!storage.contains("k").unwrap());
    }

    #[test]
    fn test_prefix_scan() {
        let storage = Storage::temporary().unwrap();
        storage.put("key:a", &1u8).unwrap();
        storage.put("key:b", &2u8).unwrap();
        storage.put("other:c", &3u8).unwrap();

        let keys = storage.keys_with_prefix("key:");
        assert_eq!(keys, vec!["key:a".to_string(), "key:b".to_string()]);
    }
}
