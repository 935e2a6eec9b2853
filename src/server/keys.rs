use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// API key entry in the server config file
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    user_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct KeysFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Load API keys from the YAML config file.
    ///
    /// A missing or unreadable file yields an empty store, so every
    /// authenticated request is rejected.
    pub fn load(config_path: &Path) -> Self {
        let contents = match std::fs::read_to_string(config_path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                return Self::default();
            }
        };

        match Self::parse(&contents) {
            Ok(store) => {
                tracing::info!("Loaded {} API key(s)", store.len());
                store
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let file: KeysFile = serde_yaml::from_str(yaml)?;
        Ok(Self::from_entries(
            file.api_keys.into_iter().map(|e| (e.key, e.user_id)),
        ))
    }

    pub fn from_entries<K, U>(entries: impl IntoIterator<Item = (K, U)>) -> Self
    where
        K: Into<String>,
        U: Into<String>,
    {
        let keys = entries
            .into_iter()
            .map(|(key, user_id)| {
                (
                    key.into(),
                    AuthUser {
                        user_id: user_id.into(),
                    },
                )
            })
            .collect();
        Self { keys }
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
