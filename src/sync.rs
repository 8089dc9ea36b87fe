use chrono::{Days, Local, NaiveDate};
use std::fmt;
use thiserror::Error;

use crate::crm::{CrmClient, CrmError, NewCompany, NewOpportunity};
use crate::db::{PostingStore, StoreError};
use crate::models::Posting;

pub const OPPORTUNITY_STAGE: &str = "To Apply";
pub const COMPANY_INDUSTRY: &str = "Software";
const OPPORTUNITY_NAME_MAX: usize = 150;
const DESCRIPTION_EXCERPT_MAX: usize = 1000;
const CLOSE_DATE_OFFSET_DAYS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    FindCompany,
    CreateCompany,
    CreateOpportunity,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStep::FindCompany => "find company",
            SyncStep::CreateCompany => "create company",
            SyncStep::CreateOpportunity => "create opportunity",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{step} failed: {source}")]
    Crm {
        step: SyncStep,
        #[source]
        source: CrmError,
    },

    /// Recording the sync failed after the CRM accepted it.
    #[error("could not record sync: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub account_id: String,
    pub opportunity_id: String,
    pub created_company: bool,
}

/// Projects one posting into the CRM and records the result.
///
/// Nothing is written to the store unless the opportunity was created.
/// There is no retry here; a failed posting stays unsynced.
pub struct SyncOrchestrator<'a> {
    crm: &'a dyn CrmClient,
    store: &'a dyn PostingStore,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(crm: &'a dyn CrmClient, store: &'a dyn PostingStore) -> Self {
        Self { crm, store }
    }

    pub fn sync_to_crm(&self, posting: &Posting) -> Result<SyncOutcome, SyncError> {
        let failed_at = |step: SyncStep| move |source: CrmError| SyncError::Crm { step, source };

        let existing = self
            .crm
            .find_company_by_name(&posting.company_name)
            .map_err(failed_at(SyncStep::FindCompany))?;

        let (account_id, created_company) = match existing {
            Some(record) => (record.id, false),
            None => {
                let id = self
                    .crm
                    .create_company(&company_for(posting))
                    .map_err(failed_at(SyncStep::CreateCompany))?;
                (id, true)
            }
        };

        let today = Local::now().date_naive();
        let opportunity_id = self
            .crm
            .create_opportunity(&opportunity_for(posting, today), &account_id)
            .map_err(failed_at(SyncStep::CreateOpportunity))?;

        self.store.mark_synced(
            &posting.source,
            &posting.source_id,
            &account_id,
            &opportunity_id,
        )?;

        Ok(SyncOutcome {
            account_id,
            opportunity_id,
            created_company,
        })
    }
}

pub fn company_for(posting: &Posting) -> NewCompany {
    NewCompany {
        name: posting.company_name.clone(),
        website: posting.company_website.clone(),
        industry: COMPANY_INDUSTRY.to_string(),
        description: Some(format!("Tech: {}", posting.tech_summary())),
    }
}

pub fn opportunity_for(posting: &Posting, today: NaiveDate) -> NewOpportunity {
    let name = truncate_chars(
        &format!("{} at {}", posting.title, posting.company_name),
        OPPORTUNITY_NAME_MAX,
    );

    let mut description = if posting.description.chars().count() > DESCRIPTION_EXCERPT_MAX {
        format!(
            "{}...",
            truncate_chars(&posting.description, DESCRIPTION_EXCERPT_MAX)
        )
    } else {
        posting.description.clone()
    };
    description.push_str(&format!("\n\nSource: {}", posting.source_url));
    if !posting.tech_stack.is_empty() {
        description.push_str(&format!("\nTech: {}", posting.tech_summary()));
    }

    NewOpportunity {
        name,
        stage: OPPORTUNITY_STAGE.to_string(),
        amount: 0,
        close_date: today
            .checked_add_days(Days::new(CLOSE_DATE_OFFSET_DAYS))
            .unwrap_or(today),
        description,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
