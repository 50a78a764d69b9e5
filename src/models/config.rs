use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    S3,
    R2,
    Minio,
    /// In-process bucket, nothing leaves the machine.
    Memory,
}

/// Connection settings for one bucket on one object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub name: String,
    #[serde(default)]
    pub provider: Provider,
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub secret_access_key: Option<String>,
    /// Cloudflare account id, used to derive the R2 endpoint.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub account_id: Option<String>,
    /// Named profile from `~/.aws/credentials` when no static keys are given.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub aws_profile: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub role_chain: Vec<String>,
    #[serde(default)]
    pub path_style: bool,
    /// Public or CDN base URL that uploaded objects are served from.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub public_base_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl ServerProfile {
    pub fn new(name: impl Into<String>, provider: Provider, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider,
            bucket: bucket.into(),
            endpoint_url: None,
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            account_id: None,
            aws_profile: None,
            role_chain: Vec::new(),
            path_style: false,
            public_base_url: None,
        }
    }

    pub fn is_r2(&self) -> bool {
        self.provider == Provider::R2
            || self
                .endpoint_url
                .as_deref()
                .is_some_and(|e| e.contains("r2.cloudflarestorage.com"))
    }

    /// MinIO only serves path-style requests.
    pub fn uses_path_style(&self) -> bool {
        self.path_style || self.provider == Provider::Minio
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub profiles: Vec<ServerProfile>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub download_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_profile: Option<String>,
}

/// Loads the configuration at startup and writes it back on every change.
pub struct ConfigManager {
    config_path: PathBuf,
    pub app_config: AppConfig,
}

impl ConfigManager {
    /// Load `~/.config/s3q/config.json`, creating the directory if needed.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::home_dir()
            .context("Could not find home directory")?
            .join(".config")
            .join("s3q");

        fs::create_dir_all(&config_dir)?;
        Self::load_from(config_dir.join("config.json"))
    }

    /// Load from an explicit path. A missing file yields the default config.
    pub fn load_from(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();

        let app_config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?
        } else {
            AppConfig::default()
        };

        Ok(Self {
            config_path,
            app_config,
        })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.app_config)?;
        fs::write(&self.config_path, json)
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Option<&ServerProfile> {
        self.app_config.profiles.iter().find(|p| p.name == name)
    }

    /// The named profile, else the default one, else the only one configured.
    pub fn resolve_profile(&self, name: Option<&str>) -> Result<&ServerProfile> {
        if let Some(name) = name.or(self.app_config.default_profile.as_deref()) {
            return self
                .profile(name)
                .with_context(|| format!("Unknown profile '{name}'"));
        }
        match self.app_config.profiles.as_slice() {
            [only] => Ok(only),
            [] => bail!(
                "No server profiles configured in {}",
                self.config_path.display()
            ),
            _ => bail!("Several profiles configured; pick one with -p <profile>"),
        }
    }

    /// Replace the profile with the same name, or add it.
    pub fn upsert_profile(&mut self, profile: ServerProfile) -> Result<()> {
        if let Some(existing) = self
            .app_config
            .profiles
            .iter_mut()
            .find(|p| p.name == profile.name)
        {
            *existing = profile;
        } else {
            self.app_config.profiles.push(profile);
        }
        self.save()
    }

    pub fn remove_profile(&mut self, name: &str) -> Result<()> {
        self.app_config.profiles.retain(|p| p.name != name);
        if self.app_config.default_profile.as_deref() == Some(name) {
            self.app_config.default_profile = None;
        }
        self.save()
    }

    pub fn set_default_profile(&mut self, name: Option<String>) -> Result<()> {
        self.app_config.default_profile = name;
        self.save()
    }

    pub fn set_download_dir(&mut self, dir: Option<PathBuf>) -> Result<()> {
        self.app_config.download_dir = dir;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_default_and_changes_persist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let mut manager = ConfigManager::load_from(&path).unwrap();
        assert_eq!(manager.app_config, AppConfig::default());

        let mut profile = ServerProfile::new("media", Provider::R2, "assets");
        profile.account_id = Some("abc".to_string());
        profile.public_base_url = Some("https://cdn.example.com".to_string());
        manager.upsert_profile(profile.clone()).unwrap();
        manager
            .set_download_dir(Some(PathBuf::from("/data/downloads")))
            .unwrap();

        let reloaded = ConfigManager::load_from(&path).unwrap();
        assert_eq!(reloaded.profile("media"), Some(&profile));
        assert_eq!(
            reloaded.app_config.download_dir,
            Some(PathBuf::from("/data/downloads"))
        );
    }

    #[test]
    fn minimal_profile_uses_defaults() {
        let json = r#"{"profiles":[{"name":"local","provider":"minio","bucket":"b"}]}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        let profile = &config.profiles[0];
        assert_eq!(profile.region, "us-east-1");
        assert!(profile.uses_path_style());
        assert!(!profile.is_r2());
    }

    #[test]
    fn unknown_profile_keys_are_ignored() {
        let json = r#"{"profiles":[{"name":"old","bucket":"b","description":"legacy"}]}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.profiles[0].name, "old");
        assert!(!serde_json::to_string(&config).unwrap().contains("legacy"));
    }

    #[test]
    fn r2_is_detected_from_endpoint() {
        let mut profile = ServerProfile::new("x", Provider::S3, "b");
        profile.endpoint_url = Some("https://acct.r2.cloudflarestorage.com".to_string());
        assert!(profile.is_r2());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(ConfigManager::load_from(&path).is_err());
    }

    #[test]
    fn profile_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = ConfigManager::load_from(temp_dir.path().join("c.json")).unwrap();
        assert!(manager.resolve_profile(None).is_err());

        manager
            .upsert_profile(ServerProfile::new("a", Provider::S3, "one"))
            .unwrap();
        assert_eq!(manager.resolve_profile(None).unwrap().name, "a");

        manager
            .upsert_profile(ServerProfile::new("b", Provider::Minio, "two"))
            .unwrap();
        assert!(manager.resolve_profile(None).is_err());
        assert_eq!(manager.resolve_profile(Some("b")).unwrap().bucket, "two");

        manager.set_default_profile(Some("b".to_string())).unwrap();
        assert_eq!(manager.resolve_profile(None).unwrap().name, "b");

        manager.remove_profile("b").unwrap();
        assert_eq!(manager.app_config.default_profile, None);
        assert!(manager.resolve_profile(Some("b")).is_err());
    }
}
