use std::env;

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::local::LocalStore;

/// Local-storage key holding the user's cloud-config override.
pub const CLOUD_CONFIG_KEY: &str = "cloud_config";

/// Compiled-in master settings, resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_key: String,

    pub gemini_api_key: String,
    pub gemini_model: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            supabase_url: env::var("SUPABASE_URL").unwrap_or_else(|_| String::new()),
            supabase_key: env::var("SUPABASE_KEY").unwrap_or_else(|_| String::new()),

            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_else(|_| String::new()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-3-flash-preview".into()),
        }
    }

    /// The cloud connection implied by the master values alone.
    pub fn master_cloud_config(&self) -> CloudConfig {
        CloudConfig {
            url: self.supabase_url.clone(),
            key: self.supabase_key.clone(),
            enabled: !self.supabase_url.is_empty() && !self.supabase_key.is_empty(),
        }
    }
}

/// Cloud connection settings: master defaults overridable by a persisted
/// user record. Read once at startup, mutated only via explicit save or
/// reset-to-master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub url: String,
    pub key: String,
    pub enabled: bool,
}

impl CloudConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.url.is_empty()
    }
}

/// Resolves and persists the cloud connection settings.
#[derive(Debug)]
pub struct ConfigStore {
    master: Config,
    local: LocalStore,
    current: CloudConfig,
}

impl ConfigStore {
    /// Loads the persisted override if one exists, otherwise falls back to
    /// the master values.
    pub fn load(master: Config, local: LocalStore) -> Self {
        let current = local
            .get::<CloudConfig>(CLOUD_CONFIG_KEY)
            .unwrap_or_else(|| master.master_cloud_config());
        Self {
            master,
            local,
            current,
        }
    }

    pub fn current(&self) -> &CloudConfig {
        &self.current
    }

    pub fn master(&self) -> &Config {
        &self.master
    }

    pub fn save(&mut self, config: CloudConfig) -> AppResult<()> {
        self.local.set(CLOUD_CONFIG_KEY, &config)?;
        self.current = config;
        Ok(())
    }

    /// Clears *all* persisted local state (not just the config override) and
    /// rebuilds from the master values. Tombstones and cached overrides must
    /// not outlive a deliberate "start fresh from canonical source" action.
    /// The caller is expected to re-fetch everything afterwards.
    pub fn reset_to_master(&mut self) -> AppResult<()> {
        self.local.clear()?;
        self.current = self.master.master_cloud_config();
        self.local.set(CLOUD_CONFIG_KEY, &self.current)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> Config {
        Config {
            supabase_url: "https://master.example.co".into(),
            supabase_key: "master-key".into(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-3-flash-preview".into(),
        }
    }

    fn temp_local() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::at(dir.path().to_path_buf()).unwrap();
        (dir, local)
    }

    #[test]
    fn load_uses_master_when_no_override_exists() {
        let (_dir, local) = temp_local();
        let store = ConfigStore::load(master(), local);
        assert_eq!(store.current().url, "https://master.example.co");
        assert_eq!(store.current().key, "master-key");
        assert!(store.current().enabled);
    }

    #[test]
    fn master_without_credentials_is_disabled() {
        let (_dir, local) = temp_local();
        let mut cfg = master();
        cfg.supabase_key = String::new();
        let store = ConfigStore::load(cfg, local);
        assert!(!store.current().enabled);
    }

    #[test]
    fn load_prefers_persisted_override() {
        let (_dir, local) = temp_local();
        let saved = CloudConfig {
            url: "https://custom.example.co".into(),
            key: "custom-key".into(),
            enabled: true,
        };
        local.set(CLOUD_CONFIG_KEY, &saved).unwrap();
        let store = ConfigStore::load(master(), local);
        assert_eq!(store.current(), &saved);
    }

    #[test]
    fn save_persists_the_override() {
        let (_dir, local) = temp_local();
        let mut store = ConfigStore::load(master(), local.clone());
        let next = CloudConfig {
            url: "https://new.example.co".into(),
            key: "new-key".into(),
            enabled: false,
        };
        store.save(next.clone()).unwrap();
        assert_eq!(store.current(), &next);
        assert_eq!(local.get::<CloudConfig>(CLOUD_CONFIG_KEY), Some(next));
    }

    #[test]
    fn reset_to_master_wipes_all_local_state() {
        let (_dir, local) = temp_local();
        local.set("deleted_evidence_urls", &vec!["u1".to_string()]).unwrap();
        let mut store = ConfigStore::load(master(), local.clone());
        store
            .save(CloudConfig {
                url: "https://other.example.co".into(),
                key: "other".into(),
                enabled: true,
            })
            .unwrap();

        store.reset_to_master().unwrap();

        assert_eq!(store.current().url, "https://master.example.co");
        // Every other persisted key is gone too, not just the config.
        assert!(local.get::<Vec<String>>("deleted_evidence_urls").is_none());
        // The rebuilt master config is re-persisted.
        assert!(local.get::<CloudConfig>(CLOUD_CONFIG_KEY).is_some());
    }
}
