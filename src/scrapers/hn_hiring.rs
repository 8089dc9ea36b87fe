use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use scraper::Html;
use serde::Deserialize;
use std::sync::LazyLock;

use super::{Scraper, TechMatcher, truncate_on_word};
use crate::models::Posting;

const ALGOLIA_SEARCH: &str = "https://hn.algolia.com/api/v1/search_by_date";
const ALGOLIA_ITEM: &str = "https://hn.algolia.com/api/v1/items";
const SOURCE: &str = "hn_hiring";
const MIN_COMMENT_LEN: usize = 50;
const NAME_MAX: usize = 100;

const TECH_KEYWORDS: &[&str] = &[
    "python", "javascript", "typescript", "go", "golang", "rust", "java", "ruby", "php",
    "c++", "c#", "swift", "kotlin", "scala", "react", "vue", "angular", "node", "django",
    "flask", "rails", "postgresql", "mysql", "mongodb", "redis", "elasticsearch", "aws",
    "gcp", "azure", "docker", "kubernetes", "terraform",
];

static TECH: LazyLock<TechMatcher> =
    LazyLock::new(|| TechMatcher::new(TECH_KEYWORDS).expect("tech keyword patterns"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "objectID")]
    object_id: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    children: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct Comment {
    id: u64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// Top-level comments of the latest "Ask HN: Who is hiring?" thread.
pub struct HnHiringScraper {
    client: reqwest::blocking::Client,
}

impl Default for HnHiringScraper {
    fn default() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl HnHiringScraper {
    pub fn new() -> Self {
        Self::default()
    }

    fn latest_thread_id(&self) -> Result<String> {
        let response: SearchResponse = self
            .client
            .get(ALGOLIA_SEARCH)
            .query(&[("tags", "story,ask_hn,author_whoishiring"), ("hitsPerPage", "5")])
            .send()
            .context("Failed to search HN threads")?
            .error_for_status()?
            .json()
            .context("Failed to parse HN search response")?;

        // Skip "Who wants to be hired?" and "Freelancer?" threads
        response
            .hits
            .into_iter()
            .find(|hit| hit.title.contains("Who is hiring?"))
            .map(|hit| hit.object_id)
            .ok_or_else(|| anyhow!("No hiring thread found"))
    }
}

impl Scraper for HnHiringScraper {
    fn name(&self) -> &str {
        SOURCE
    }

    fn scrape(&self) -> Result<Vec<Posting>> {
        let thread_id = self.latest_thread_id()?;
        tracing::debug!(thread_id = %thread_id, "fetching HN hiring thread");

        let item: Item = self
            .client
            .get(format!("{}/{}", ALGOLIA_ITEM, thread_id))
            .send()
            .context("Failed to fetch HN thread")?
            .error_for_status()?
            .json()
            .context("Failed to parse HN thread")?;

        Ok(item.children.iter().filter_map(parse_comment).collect())
    }
}

fn parse_comment(comment: &Comment) -> Option<Posting> {
    let html = comment.text.as_deref()?;
    if html.len() < MIN_COMMENT_LEN {
        return None;
    }
    let text = html_to_text(html);

    let mut posting = Posting::new(
        SOURCE,
        comment.id.to_string(),
        format!("https://news.ycombinator.com/item?id={}", comment.id),
        parse_company_name(&text),
        parse_job_title(&text),
    )
    .with_remote(text.to_lowercase().contains("remote"))
    .with_tech(TECH.extract(&text))
    .with_description(text);
    posting.posted_at = comment.created_at;
    Some(posting)
}

/// Paragraph breaks become newlines; entities are decoded.
fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(&html.replace("<p>", "\n<p>"));
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

/// First `|` segment, first line, cut before a dash separator.
fn parse_company_name(text: &str) -> String {
    let first = text.split('|').next().unwrap_or("");
    let first = first.lines().next().unwrap_or("");
    let first = first.split('—').next().unwrap_or("");
    let name = first.split(" - ").next().unwrap_or("").trim();
    if name.is_empty() {
        return "Unknown".to_string();
    }
    truncate_on_word(name, NAME_MAX)
}

fn parse_job_title(text: &str) -> String {
    let title = text
        .split('|')
        .nth(1)
        .and_then(|s| s.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("");
    if title.is_empty() {
        return "Software Engineer".to_string();
    }
    truncate_on_word(title, NAME_MAX)
}
