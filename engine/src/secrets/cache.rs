use crate::secrets::string::SecretString;
use crate::secrets::SecretManager;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An in-memory cache in front of [`SecretManager`].
///
/// The completion provider asks for its API key on every request; the cache
/// keeps that off the keychain after the first lookup. Cloning shares the cache.
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cache pre-filled with known values; nothing is read from the environment
    /// or keychain for these keys.
    pub fn with_values(manager: Arc<SecretManager>, values: &[(&str, &str)]) -> Self {
        let cache = Self::new(manager);
        {
            let mut map = cache.cache.write().unwrap_or_else(|e| e.into_inner());
            for (key, value) in values {
                map.insert((*key).to_string(), SecretString::new(*value));
            }
        }
        cache
    }

    /// Retrieves a secret, checking the memory cache first.
    pub fn get_secret(&self, key: &str) -> Result<SecretString, EngineError> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(secret) = cache.get(key) {
                return Ok(secret.clone());
            }
        }

        let secret = SecretString::new(self.manager.get_secret(key)?);

        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.insert(key.to_string(), secret.clone());
        }

        Ok(secret)
    }

    /// Forget a cached value so the next lookup hits the manager again.
    pub fn invalidate(&self, key: &str) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.remove(key);
    }
}
