use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use thirtyfour::ChromiumLikeCapabilities;
use thirtyfour::prelude::*;

use super::Scraper;
use crate::models::Posting;

const BASE_URL: &str = "https://wellfound.com";
const SOURCE: &str = "wellfound";
const MAX_PAGES: u32 = 5;
const LISTING_RENDER_WAIT: u64 = 2;
const DETAIL_RENDER_WAIT: u64 = 1;

static JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/jobs/(\d+)").expect("job id pattern"));

/// Startup listings; the pages are rendered client-side, so this drives a
/// WebDriver session instead of plain HTTP.
pub struct WellfoundScraper {
    webdriver_url: String,
    role: String,
    remote: bool,
}

impl WellfoundScraper {
    pub fn new(webdriver_url: &str) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            role: "software-engineer".to_string(),
            remote: true,
        }
    }

    fn search_url(&self, page: u32) -> String {
        let mut url = format!("{}/role/{}", BASE_URL, self.role);
        let mut params = Vec::new();
        if self.remote {
            params.push("remote=true".to_string());
        }
        if page > 1 {
            params.push(format!("page={}", page));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    async fn scrape_async(&self) -> Result<Vec<Posting>> {
        let mut caps = DesiredCapabilities::chrome();
        caps.set_headless()?;
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;

        let driver = WebDriver::new(&self.webdriver_url, caps)
            .await
            .context("Failed to connect to WebDriver. Is chromedriver running?")?;

        let result = self.scrape_with_driver(&driver).await;

        // Close the browser even when scraping failed
        if let Err(e) = driver.quit().await {
            tracing::warn!(error = %e, "failed to quit browser");
        }
        result
    }

    async fn scrape_with_driver(&self, driver: &WebDriver) -> Result<Vec<Posting>> {
        let mut postings = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = self.search_url(page);
            driver
                .goto(&url)
                .await
                .with_context(|| format!("Failed to open {}", url))?;
            tokio::time::sleep(Duration::from_secs(LISTING_RENDER_WAIT)).await;

            let html = driver.source().await.context("Failed to read listing page")?;
            let cards = parse_job_cards(&html);
            if cards.is_empty() {
                break;
            }
            tracing::debug!(page, cards = cards.len(), "wellfound listing page");
            postings.extend(cards);
        }

        for posting in &mut postings {
            match fetch_description(driver, &posting.source_url).await {
                Ok(description) => posting.description = description,
                Err(e) => {
                    tracing::debug!(url = %posting.source_url, error = %e, "no wellfound description")
                }
            }
        }

        Ok(postings)
    }
}

impl Scraper for WellfoundScraper {
    fn name(&self) -> &str {
        SOURCE
    }

    fn scrape(&self) -> Result<Vec<Posting>> {
        let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
        runtime.block_on(self.scrape_async())
    }
}

async fn fetch_description(driver: &WebDriver, url: &str) -> Result<String> {
    driver.goto(url).await?;
    tokio::time::sleep(Duration::from_secs(DETAIL_RENDER_WAIT)).await;
    let html = driver.source().await?;
    Ok(parse_description(&html).unwrap_or_default())
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first_text(element: &ElementRef, css: &str) -> Option<String> {
    let sel = selector(css)?;
    element
        .select(&sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn first_href(element: &ElementRef, css: &str) -> Option<String> {
    let sel = selector(css)?;
    element
        .select(&sel)
        .next()
        .and_then(|e| e.value().attr("href"))
        .map(absolute_url)
}

fn absolute_url(href: &str) -> String {
    if href.starts_with('/') {
        format!("{}{}", BASE_URL, href)
    } else {
        href.to_string()
    }
}

/// Cards without a numeric job id are dropped.
fn parse_job_cards(html: &str) -> Vec<Posting> {
    let document = Html::parse_document(html);
    let Some(cards) = selector(r#"[data-test="StartupResult"], [class*="styles_component"]"#) else {
        return Vec::new();
    };

    document
        .select(&cards)
        .filter_map(|card| parse_job_card(&card))
        .collect()
}

fn parse_job_card(card: &ElementRef) -> Option<Posting> {
    let source_url = first_href(card, r#"a[href*="/jobs/"]"#)?;
    let source_id = JOB_ID.captures(&source_url)?.get(1)?.as_str().to_string();

    let company = first_text(card, r#"[class*="name"]"#).unwrap_or_else(|| "Unknown".to_string());
    let title = first_text(card, r#"[class*="title"]"#).unwrap_or_else(|| "Unknown".to_string());
    let remote = selector(r#"[class*="remote"]"#)
        .map(|sel| card.select(&sel).next().is_some())
        .unwrap_or(false);

    let tags: Vec<String> = selector(r#"[class*="tags"] span"#)
        .map(|sel| {
            card.select(&sel)
                .map(|s| s.text().collect::<String>().trim().to_string())
                .collect()
        })
        .unwrap_or_default();

    let mut posting = Posting::new(SOURCE, source_id, source_url, company, title)
        .with_remote(remote)
        .with_tech(tags);
    posting.location = first_text(card, r#"[class*="location"]"#);
    posting.company_website = first_href(card, r#"a[href*="/company/"]"#);
    Some(posting)
}

fn parse_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = selector(r#"[class*="jobDescription"], [class*="description"]"#)?;
    document
        .select(&sel)
        .next()
        .map(|e| e.text().collect::<Vec<_>>().join(" ").trim().to_string())
}
