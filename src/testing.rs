//! Fixtures and fakes shared by the unit tests.

use anyhow::{Result, anyhow};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::crm::{CrmClient, CrmError, CrmRecord, NewCompany, NewOpportunity};
use crate::db::{Database, PostingStore, StoreError};
use crate::models::{Posting, SyncRecord};
use crate::scrapers::Scraper;

pub fn sample_posting() -> Posting {
    Posting::new(
        "hn_hiring",
        "12345",
        "https://news.ycombinator.com/item?id=12345",
        "Acme Corp",
        "Backend Engineer",
    )
    .with_website("https://acme.com")
    .with_location("Remote")
    .with_remote(true)
    .with_description("Python, PostgreSQL, AWS")
    .with_tech(["python", "postgresql", "aws"])
}

/// Which CRM call the fake should fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Nothing,
    Find,
    CreateCompany,
    CreateOpportunity,
}

/// In-memory CRM that records every call.
pub struct FakeCrm {
    pub existing: Vec<CrmRecord>,
    pub fail_on: FailOn,
    pub finds: RefCell<Vec<String>>,
    pub companies: RefCell<Vec<NewCompany>>,
    pub opportunities: RefCell<Vec<(NewOpportunity, String)>>,
    next_id: Cell<u32>,
}

impl Default for FakeCrm {
    fn default() -> Self {
        Self {
            existing: Vec::new(),
            fail_on: FailOn::Nothing,
            finds: RefCell::new(Vec::new()),
            companies: RefCell::new(Vec::new()),
            opportunities: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }
}

impl FakeCrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(fail_on: FailOn) -> Self {
        Self {
            fail_on,
            ..Self::new()
        }
    }

    pub fn with_company(mut self, id: &str, name: &str) -> Self {
        self.existing.push(CrmRecord {
            id: id.to_string(),
            name: Some(name.to_string()),
        });
        self
    }

    fn next_id(&self, prefix: &str) -> String {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        format!("{prefix}{id}")
    }

    fn unavailable() -> CrmError {
        CrmError::Api {
            status: 503,
            body: "service unavailable".to_string(),
        }
    }
}

impl CrmClient for FakeCrm {
    fn find_company_by_name(&self, name: &str) -> Result<Option<CrmRecord>, CrmError> {
        self.finds.borrow_mut().push(name.to_string());
        if self.fail_on == FailOn::Find {
            return Err(Self::unavailable());
        }
        let created = self
            .companies
            .borrow()
            .iter()
            .position(|c| c.name == name)
            .map(|i| CrmRecord {
                id: format!("acc-created-{i}"),
                name: Some(name.to_string()),
            });
        Ok(self
            .existing
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
            .cloned()
            .or(created))
    }

    fn create_company(&self, company: &NewCompany) -> Result<String, CrmError> {
        if self.fail_on == FailOn::CreateCompany {
            return Err(Self::unavailable());
        }
        let mut companies = self.companies.borrow_mut();
        companies.push(company.clone());
        Ok(format!("acc-created-{}", companies.len() - 1))
    }

    fn create_opportunity(
        &self,
        opportunity: &NewOpportunity,
        company_id: &str,
    ) -> Result<String, CrmError> {
        if self.fail_on == FailOn::CreateOpportunity {
            return Err(Self::unavailable());
        }
        self.opportunities
            .borrow_mut()
            .push((opportunity.clone(), company_id.to_string()));
        Ok(self.next_id("opp-"))
    }
}

/// Scraper returning a fixed batch, or failing.
pub struct FakeScraper {
    pub name: String,
    pub postings: Vec<Posting>,
    pub fail: bool,
    calls: Rc<Cell<usize>>,
}

impl FakeScraper {
    pub fn new(name: &str, postings: Vec<Posting>) -> Self {
        Self {
            name: name.to_string(),
            postings,
            fail: false,
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, Vec::new())
        }
    }

    /// Shared counter that stays readable after the scraper is boxed into a registry.
    pub fn calls(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.calls)
    }
}

impl Scraper for FakeScraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn scrape(&self) -> Result<Vec<Posting>> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(anyhow!("{} is down", self.name));
        }
        Ok(self.postings.clone())
    }
}

/// How a `FlakyStore` call goes wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    Sqlite,
    NotFound,
}

impl StoreFault {
    fn error(self, source: &str, source_id: &str) -> StoreError {
        match self {
            StoreFault::Sqlite => StoreError::Sqlite(rusqlite::Error::InvalidQuery),
            StoreFault::NotFound => StoreError::NotFound {
                source_name: source.to_string(),
                source_id: source_id.to_string(),
            },
        }
    }
}

/// In-memory `Database` that fails chosen calls (1-based call numbers).
pub struct FlakyStore {
    pub inner: Database,
    fail_exists: Option<usize>,
    fail_upsert: Option<usize>,
    fail_mark_synced: Option<(usize, StoreFault)>,
    exists_calls: Cell<usize>,
    upsert_calls: Cell<usize>,
    mark_calls: Cell<usize>,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self {
            inner: Database::open_in_memory().unwrap(),
            fail_exists: None,
            fail_upsert: None,
            fail_mark_synced: None,
            exists_calls: Cell::new(0),
            upsert_calls: Cell::new(0),
            mark_calls: Cell::new(0),
        }
    }
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_exists_on(mut self, call: usize) -> Self {
        self.fail_exists = Some(call);
        self
    }

    pub fn failing_upsert_on(mut self, call: usize) -> Self {
        self.fail_upsert = Some(call);
        self
    }

    pub fn failing_mark_synced_on(mut self, call: usize, fault: StoreFault) -> Self {
        self.fail_mark_synced = Some((call, fault));
        self
    }

    fn bump(counter: &Cell<usize>) -> usize {
        counter.set(counter.get() + 1);
        counter.get()
    }
}

impl PostingStore for FlakyStore {
    fn upsert(&self, posting: &Posting) -> Result<(), StoreError> {
        if Some(Self::bump(&self.upsert_calls)) == self.fail_upsert {
            return Err(StoreFault::Sqlite.error(&posting.source, &posting.source_id));
        }
        self.inner.upsert(posting)
    }

    fn exists(&self, source: &str, source_id: &str) -> Result<bool, StoreError> {
        if Some(Self::bump(&self.exists_calls)) == self.fail_exists {
            return Err(StoreFault::Sqlite.error(source, source_id));
        }
        self.inner.exists(source, source_id)
    }

    fn mark_synced(
        &self,
        source: &str,
        source_id: &str,
        account_id: &str,
        opportunity_id: &str,
    ) -> Result<(), StoreError> {
        let call = Self::bump(&self.mark_calls);
        if let Some((n, fault)) = self.fail_mark_synced {
            if n == call {
                return Err(fault.error(source, source_id));
            }
        }
        self.inner
            .mark_synced(source, source_id, account_id, opportunity_id)
    }

    fn list_unsynced(&self) -> Result<Vec<SyncRecord>, StoreError> {
        self.inner.list_unsynced()
    }
}
