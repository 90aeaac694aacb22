//! Persisted environment list
//!
//! Target environments the dashboard can point a run at. Kept as a single
//! JSON file with seeded defaults; every mutation is a read-modify-write
//! with an atomic rename.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A target environment entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub browsers: Vec<String>,
    pub status: String,
    pub color: String,
}

/// Fields accepted when creating or updating an environment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentUpsert {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub browsers: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Environment list store backed by one JSON file
#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
}

impl EnvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current list. Seeds the defaults on first access; a corrupt file
    /// reads as the defaults rather than an error.
    pub fn load(&self) -> Vec<Environment> {
        match std::fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(envs) => envs,
                Err(e) => {
                    warn!("Environment list unreadable, using defaults: {}", e);
                    default_environments()
                }
            },
            Err(_) => {
                let defaults = default_environments();
                if let Err(e) = self.save(&defaults) {
                    warn!("Failed to seed environment list: {}", e);
                }
                defaults
            }
        }
    }

    pub fn add(&self, upsert: EnvironmentUpsert) -> Result<Environment> {
        validate(&upsert)?;
        let mut envs = self.load();
        let env = Environment {
            id: slug_id(&upsert.name),
            name: upsert.name,
            url: upsert.url,
            browsers: upsert.browsers.unwrap_or_else(|| vec!["chromium".to_string()]),
            status: upsert.status.unwrap_or_else(|| "idle".to_string()),
            color: upsert.color.unwrap_or_else(|| "#8b5cf6".to_string()),
        };
        envs.push(env.clone());
        self.save(&envs)?;
        Ok(env)
    }

    pub fn update(&self, id: &str, upsert: EnvironmentUpsert) -> Result<Environment> {
        validate(&upsert)?;
        let mut envs = self.load();
        let Some(env) = envs.iter_mut().find(|e| e.id == id) else {
            return Err(Error::NotFound {
                kind: "environment".to_string(),
                id: id.to_string(),
            });
        };
        env.name = upsert.name;
        env.url = upsert.url;
        env.browsers = upsert.browsers.unwrap_or_else(|| vec!["chromium".to_string()]);
        env.status = upsert.status.unwrap_or_else(|| "idle".to_string());
        if let Some(color) = upsert.color {
            env.color = color;
        }
        let updated = env.clone();
        self.save(&envs)?;
        Ok(updated)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let mut envs = self.load();
        let before = envs.len();
        envs.retain(|e| e.id != id);
        if envs.len() == before {
            return Err(Error::NotFound {
                kind: "environment".to_string(),
                id: id.to_string(),
            });
        }
        self.save(&envs)
    }

    fn save(&self, envs: &[Environment]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(envs)?;
        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

fn validate(upsert: &EnvironmentUpsert) -> Result<()> {
    if upsert.name.trim().is_empty() || upsert.url.trim().is_empty() {
        return Err(Error::InvalidInput("name and url are required".to_string()));
    }
    Ok(())
}

/// Lowercased name with a short random suffix, URL- and filesystem-safe
fn slug_id(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", slug, &suffix[..8])
}

fn default_environments() -> Vec<Environment> {
    vec![
        Environment {
            id: "production".to_string(),
            name: "Production".to_string(),
            url: "https://www.casadellibro.com".to_string(),
            browsers: vec!["chromium".to_string(), "firefox".to_string()],
            status: "active".to_string(),
            color: "#10b981".to_string(),
        },
        Environment {
            id: "staging".to_string(),
            name: "Staging".to_string(),
            url: "https://staging.casadellibro.com".to_string(),
            browsers: vec!["chromium".to_string()],
            status: "idle".to_string(),
            color: "#f59e0b".to_string(),
        },
        Environment {
            id: "preprod".to_string(),
            name: "Pre-prod".to_string(),
            url: "https://preprod.casadellibro.com".to_string(),
            browsers: vec!["chromium".to_string()],
            status: "idle".to_string(),
            color: "#3b82f6".to_string(),
        },
    ]
}
