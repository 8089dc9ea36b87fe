use thiserror::Error;

use crate::config::FilterConfig;
use crate::crm::CrmClient;
use crate::db::{Database, PostingStore, StoreError};
use crate::filters;
use crate::models::Posting;
use crate::scrapers::ScraperRegistry;
use crate::sync::{SyncError, SyncOrchestrator};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Synced, or "would sync" in a dry run.
    pub synced: usize,
    pub failed: usize,
    pub skipped_duplicate: usize,
    pub skipped_filtered: usize,
    pub failed_sources: Vec<String>,
}

/// A run stopped by a store invariant violation, with the counts so far.
#[derive(Debug, Error)]
#[error("run aborted after {} synced: {source}", .stats.synced)]
pub struct RunAborted {
    pub stats: RunStats,
    #[source]
    pub source: StoreError,
}

/// Scrape, filter, dedup and sync, one posting at a time.
pub struct Pipeline<'a> {
    store: &'a dyn PostingStore,
    crm: &'a dyn CrmClient,
    filters: &'a FilterConfig,
    dry_run: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a dyn PostingStore,
        crm: &'a dyn CrmClient,
        filters: &'a FilterConfig,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            crm,
            filters,
            dry_run,
        }
    }

    /// Sources run in the given order. A failing or unknown source is
    /// recorded and skipped, and a posting the store cannot read or write
    /// counts as failed. Only a missing record at sync time aborts the run.
    pub fn run(&self, sources: &[String], registry: &ScraperRegistry) -> Result<RunStats, RunAborted> {
        let mut stats = RunStats::default();

        for name in sources {
            let Some(scraper) = registry.get(name) else {
                tracing::warn!(source = %name, "unknown source");
                stats.failed_sources.push(name.clone());
                continue;
            };

            tracing::info!(source = %name, "scraping");
            let postings = match scraper.scrape() {
                Ok(postings) => postings,
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::warn!(source = %name, %error, "scrape failed");
                    stats.failed_sources.push(name.clone());
                    continue;
                }
            };
            tracing::info!(source = %name, found = postings.len(), "scrape finished");

            for posting in &postings {
                if let Err(source) = self.process(posting, &mut stats) {
                    return Err(RunAborted { stats, source });
                }
            }
        }

        Ok(stats)
    }

    fn process(&self, posting: &Posting, stats: &mut RunStats) -> Result<(), StoreError> {
        if !filters::accepts(posting, self.filters) {
            tracing::debug!(
                source = %posting.source,
                source_id = %posting.source_id,
                stage = ?filters::rejected_by(posting, self.filters),
                "filtered out"
            );
            stats.skipped_filtered += 1;
            return Ok(());
        }

        match self.store.exists(&posting.source, &posting.source_id) {
            Ok(true) => {
                tracing::debug!(source = %posting.source, source_id = %posting.source_id, "duplicate");
                stats.skipped_duplicate += 1;
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                store_failed(posting, "duplicate check", &e);
                stats.failed += 1;
                return Ok(());
            }
        }

        if let Err(e) = self.store.upsert(posting) {
            store_failed(posting, "save", &e);
            stats.failed += 1;
            return Ok(());
        }

        if self.dry_run {
            tracing::info!(company = %posting.company_name, title = %posting.title, "would sync");
            stats.synced += 1;
            return Ok(());
        }

        if sync_one(self.crm, self.store, posting)? {
            stats.synced += 1;
        } else {
            stats.failed += 1;
        }
        Ok(())
    }
}

fn store_failed(posting: &Posting, step: &str, error: &StoreError) {
    tracing::warn!(
        source = %posting.source,
        source_id = %posting.source_id,
        step,
        %error,
        "store failed"
    );
}

/// `Ok(false)` when the posting could not be synced. Only a record missing
/// from the store at `mark_synced` time is returned as an error.
fn sync_one(crm: &dyn CrmClient, store: &dyn PostingStore, posting: &Posting) -> Result<bool, StoreError> {
    match SyncOrchestrator::new(crm, store).sync_to_crm(posting) {
        Ok(outcome) => {
            tracing::info!(
                company = %posting.company_name,
                title = %posting.title,
                account_id = %outcome.account_id,
                opportunity_id = %outcome.opportunity_id,
                "synced"
            );
            Ok(true)
        }
        Err(SyncError::Crm { step, source }) => {
            tracing::warn!(
                company = %posting.company_name,
                title = %posting.title,
                %step,
                error = %source,
                "sync failed"
            );
            Ok(false)
        }
        Err(SyncError::Store(e @ StoreError::NotFound { .. })) => Err(e),
        Err(SyncError::Store(e)) => {
            // The CRM has the opportunity but the record stays unsynced
            store_failed(posting, "mark synced", &e);
            Ok(false)
        }
    }
}

/// One sync attempt for every unsynced record. Records whose stored
/// posting can no longer be decoded count as failed.
pub fn retry_unsynced(db: &Database, crm: &dyn CrmClient, dry_run: bool) -> Result<RunStats, RunAborted> {
    let mut stats = RunStats::default();

    let records = match db.list_unsynced() {
        Ok(records) => records,
        Err(source) => return Err(RunAborted { stats, source }),
    };

    for record in records {
        let posting = match db.get_posting(&record.source, &record.source_id) {
            Ok(Some(posting)) => posting,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(
                    source = %record.source,
                    source_id = %record.source_id,
                    error = %e,
                    "stored posting unreadable"
                );
                stats.failed += 1;
                continue;
            }
        };

        if dry_run {
            tracing::info!(company = %posting.company_name, title = %posting.title, "would retry");
            stats.synced += 1;
            continue;
        }
        match sync_one(crm, db, &posting) {
            Ok(true) => stats.synced += 1,
            Ok(false) => stats.failed += 1,
            Err(source) => return Err(RunAborted { stats, source }),
        }
    }

    Ok(stats)
}
