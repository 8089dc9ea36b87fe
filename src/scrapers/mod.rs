mod hn_hiring;
mod jsearch;
mod wellfound;

pub use hn_hiring::HnHiringScraper;
pub use jsearch::JSearchScraper;
pub use wellfound::WellfoundScraper;

use anyhow::Result;
use regex::Regex;
use std::collections::BTreeMap;

use crate::config::Settings;
use crate::models::Posting;

/// A job source. Errors are source-specific and never abort a run.
pub trait Scraper {
    fn name(&self) -> &str;
    fn scrape(&self) -> Result<Vec<Posting>>;
}

/// Sources by name.
#[derive(Default)]
pub struct ScraperRegistry {
    scrapers: BTreeMap<String, Box<dyn Scraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in source, configured from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(HnHiringScraper::new()));
        registry.register(Box::new(JSearchScraper::new(settings.rapidapi_key.clone())));
        registry.register(Box::new(WellfoundScraper::new(&settings.webdriver_url)));
        registry
    }

    pub fn register(&mut self, scraper: Box<dyn Scraper>) {
        self.scrapers.insert(scraper.name().to_string(), scraper);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Scraper> {
        self.scrapers.get(name).map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.scrapers.keys().map(String::as_str).collect()
    }
}

// --- Shared parsing helpers ---

/// Known tech keywords, matched against lowercased text.
///
/// Keywords of three characters or fewer only match as whole words,
/// so "go" does not fire on "good" and "ai" not on "maintain".
pub(crate) struct TechMatcher {
    terms: Vec<(&'static str, Option<Regex>)>,
}

impl TechMatcher {
    pub(crate) fn new(keywords: &[&'static str]) -> Result<Self, regex::Error> {
        let terms = keywords
            .iter()
            .map(|&tech| -> Result<(&'static str, Option<Regex>), regex::Error> {
                if tech.chars().count() > 3 {
                    return Ok((tech, None));
                }
                // Not \b: terms like "c++" end in non-word characters
                let pattern = format!(r"(?:^|[^a-z0-9_]){}(?:$|[^a-z0-9_])", regex::escape(tech));
                Ok((tech, Some(Regex::new(&pattern)?)))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { terms })
    }

    pub(crate) fn extract(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        self.terms
            .iter()
            .filter(|(tech, boundary)| match boundary {
                Some(re) => re.is_match(&lower),
                None => lower.contains(*tech),
            })
            .map(|(tech, _)| tech.to_string())
            .collect()
    }
}

/// Cut to `max` characters, backing up to the last space when one exists.
pub(crate) fn truncate_on_word(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}
