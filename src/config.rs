use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::models::ExperienceLevel;

// --- Filter rules ---

/// Per-dimension keyword rules. An absent or empty rule set means
/// "no restriction" for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub role: RoleRules,
    pub location: LocationRules,
    pub company: CompanyRules,
    pub tech: TechRules,
    pub experience: ExperienceRules,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleRules {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationRules {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub remote_ok: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyRules {
    pub exclude_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechRules {
    pub require_any: Vec<String>,
    pub exclude: Vec<String>,
    pub min_match: usize,
}

impl Default for TechRules {
    fn default() -> Self {
        Self {
            require_any: Vec::new(),
            exclude: Vec::new(),
            min_match: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceRules {
    pub max_years: Option<u32>,
    pub levels: Vec<ExperienceLevel>,
}

impl FilterConfig {
    /// A missing file is the empty config. A malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no filter config found, accepting everything");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read filter config: {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("Invalid filter config: {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }
}

// --- Runtime settings ---

pub struct Settings {
    pub espo_url: String,
    pub espo_user: String,
    pub espo_pass: String,
    pub rapidapi_key: Option<String>,
    pub webdriver_url: String,
    pub database_path: PathBuf,
    pub filters_path: PathBuf,
}

impl Settings {
    /// Reads the environment; call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Self {
        Self {
            espo_url: env::var("ESPO_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            espo_user: env::var("ESPO_USER").unwrap_or_else(|_| "admin".to_string()),
            espo_pass: env::var("ESPO_PASS").unwrap_or_else(|_| "password".to_string()),
            rapidapi_key: env::var("RAPIDAPI_KEY").ok().filter(|k| !k.trim().is_empty()),
            webdriver_url: env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:9515".to_string()),
            database_path: env::var("LEADPIPE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_path("leadpipe.db")),
            filters_path: env::var("LEADPIPE_FILTERS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_config_path("filters.json")),
        }
    }
}

fn default_data_path(file: &str) -> PathBuf {
    match directories::ProjectDirs::from("", "", "leadpipe") {
        Some(dirs) => dirs.data_dir().join(file),
        None => PathBuf::from(file),
    }
}

fn default_config_path(file: &str) -> PathBuf {
    match directories::ProjectDirs::from("", "", "leadpipe") {
        Some(dirs) => dirs.config_dir().join(file),
        None => PathBuf::from(file),
    }
}
