use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use super::{Scraper, TechMatcher};
use crate::models::Posting;

const API_URL: &str = "https://jsearch.p.rapidapi.com/search";
const API_HOST: &str = "jsearch.p.rapidapi.com";
const SOURCE: &str = "indeed";
const MAX_RETRIES: u32 = 3;

const TECH_KEYWORDS: &[&str] = &[
    "python", "javascript", "typescript", "java", "c++", "c#", "go", "golang", "rust",
    "ruby", "php", "swift", "kotlin", "scala", "react", "angular", "vue", "next.js",
    "nextjs", "node.js", "nodejs", "express", "django", "flask", "fastapi", "spring",
    "rails", "aws", "azure", "gcp", "google cloud", "kubernetes", "k8s", "docker",
    "postgresql", "postgres", "mysql", "mongodb", "redis", "elasticsearch", "graphql",
    "rest", "api", "machine learning", "ml", "ai", "llm", "gpt", "openai", "langchain",
    "tensorflow", "pytorch", "pandas", "numpy",
];

static TECH: LazyLock<TechMatcher> =
    LazyLock::new(|| TechMatcher::new(TECH_KEYWORDS).expect("tech keyword patterns"));

const REMOTE_INDICATORS: &[&str] = &["remote", "work from home", "wfh", "distributed", "anywhere"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<JobItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JobItem {
    job_id: String,
    job_apply_link: String,
    employer_name: Option<String>,
    employer_website: Option<String>,
    job_title: Option<String>,
    job_city: Option<String>,
    job_state: Option<String>,
    job_is_remote: Option<bool>,
    job_description: Option<String>,
    job_posted_at_datetime_utc: Option<String>,
}

/// Indeed, Glassdoor and LinkedIn listings through the JSearch API.
pub struct JSearchScraper {
    api_key: Option<String>,
    query: String,
    remote_only: bool,
    max_pages: u32,
    client: reqwest::blocking::Client,
}

impl JSearchScraper {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            query: "remote software engineer".to_string(),
            remote_only: true,
            max_pages: 5,
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new()),
        }
    }

    fn params(&self, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", self.query.clone()),
            ("page", page.to_string()),
            ("num_pages", "1".to_string()),
        ];
        if self.remote_only {
            params.push(("remote_jobs_only", "true".to_string()));
        }
        params
    }

    /// Rate limits are retried with exponential waits; anything else is returned as-is.
    fn fetch_page(&self, api_key: &str, page: u32) -> Result<reqwest::blocking::Response> {
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .get(API_URL)
                .query(&self.params(page))
                .header("X-RapidAPI-Key", api_key)
                .header("X-RapidAPI-Host", API_HOST)
                .send()
                .context("Failed to reach JSearch API")?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS || attempt >= MAX_RETRIES {
                return Ok(response);
            }
            attempt += 1;
            let wait = Duration::from_secs(2u64.pow(attempt));
            tracing::warn!(page, attempt, wait_secs = wait.as_secs(), "JSearch rate limited");
            thread::sleep(wait);
        }
    }
}

impl Scraper for JSearchScraper {
    fn name(&self) -> &str {
        SOURCE
    }

    fn scrape(&self) -> Result<Vec<Posting>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("RAPIDAPI_KEY not set. Get a JSearch key from rapidapi.com and add it to .env"))?;

        let mut postings = Vec::new();
        for page in 1..=self.max_pages {
            let response = self.fetch_page(api_key, page)?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let body = response.text().unwrap_or_default();
                if body.to_lowercase().contains("not subscribed") {
                    return Err(anyhow!(
                        "Not subscribed to the JSearch API. Subscribe (free tier available) on rapidapi.com"
                    ));
                }
                return Err(anyhow!(
                    "JSearch authentication failed (HTTP {}). Check RAPIDAPI_KEY.",
                    status
                ));
            }
            if !status.is_success() {
                tracing::warn!(page, %status, "JSearch paging stopped");
                break;
            }

            let body: SearchResponse = response
                .json()
                .context("Failed to parse JSearch response")?;
            if body.data.is_empty() {
                break;
            }
            postings.extend(
                body.data
                    .into_iter()
                    .filter(|item| !item.job_id.is_empty())
                    .map(to_posting),
            );

            if page < self.max_pages {
                thread::sleep(Duration::from_secs(1));
            }
        }
        Ok(postings)
    }
}

fn to_posting(item: JobItem) -> Posting {
    let location = [item.job_city.as_deref(), item.job_state.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let location = if location.is_empty() {
        "Remote".to_string()
    } else {
        location
    };

    let remote = is_remote(&item);
    let description = item.job_description.unwrap_or_default();
    let posted_at = item
        .job_posted_at_datetime_utc
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let mut posting = Posting::new(
        SOURCE,
        item.job_id,
        item.job_apply_link,
        item.employer_name.unwrap_or_else(|| "Unknown".to_string()),
        item.job_title.unwrap_or_else(|| "Unknown".to_string()),
    )
    .with_location(location)
    .with_remote(remote)
    .with_tech(TECH.extract(&description))
    .with_description(description);
    if let Some(website) = item.employer_website.filter(|w| !w.is_empty()) {
        posting = posting.with_website(website);
    }
    posting.posted_at = posted_at;
    posting
}

fn is_remote(item: &JobItem) -> bool {
    if item.job_is_remote == Some(true) {
        return true;
    }
    let fields = [
        item.job_description.as_deref(),
        item.job_title.as_deref(),
        item.job_city.as_deref(),
    ];
    fields.into_iter().flatten().any(|field| {
        let lower = field.to_lowercase();
        REMOTE_INDICATORS.iter().any(|ind| lower.contains(ind))
    })
}
