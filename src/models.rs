use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A job listing normalized from any source.
///
/// `(source, source_id)` is the identity key; a later posting with the same
/// key replaces the stored one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub source: String,    // "hn_hiring", "indeed", "wellfound", ...
    pub source_id: String, // unique within `source`
    pub source_url: String,
    pub company_name: String,
    pub company_website: Option<String>,
    pub title: String,
    pub location: Option<String>,
    pub remote: bool,
    pub description: String,
    pub tech_stack: BTreeSet<String>, // lowercase tokens
    pub posted_at: Option<DateTime<Utc>>,
}

impl Posting {
    pub fn new(
        source: impl Into<String>,
        source_id: impl Into<String>,
        source_url: impl Into<String>,
        company_name: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
            source_url: source_url.into(),
            company_name: company_name.into(),
            company_website: None,
            title: title.into(),
            location: None,
            remote: false,
            description: String::new(),
            tech_stack: BTreeSet::new(),
            posted_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_website(mut self, website: impl Into<String>) -> Self {
        self.company_website = Some(website.into());
        self
    }

    /// Tech tokens are lowercased and trimmed; blanks are dropped.
    pub fn with_tech<I, S>(mut self, tech: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tech_stack = tech
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn tech_summary(&self) -> String {
        self.tech_stack
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Pipeline bookkeeping for one stored posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub source: String,
    pub source_id: String,
    pub source_url: String,
    pub company_name: String,
    pub title: String,
    pub scraped_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
    pub account_id: Option<String>,
    pub opportunity_id: Option<String>,
}

impl SyncRecord {
    pub fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Junior,
    Mid,
    Senior,
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExperienceLevel::Junior => "junior",
            ExperienceLevel::Mid => "mid",
            ExperienceLevel::Senior => "senior",
        };
        f.write_str(s)
    }
}

/// Derived from free text, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExperienceEstimate {
    pub years_min: Option<u32>,
    pub years_max: Option<u32>,
    pub level: Option<ExperienceLevel>,
}

impl ExperienceEstimate {
    pub fn has_signal(&self) -> bool {
        self.years_min.is_some() || self.level.is_some()
    }
}
