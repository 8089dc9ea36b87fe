use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Client trait ---

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("CRM request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("CRM returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("CRM response for {entity} carried no id")]
    MissingId { entity: &'static str },
}

/// Minimal view of an existing CRM record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CrmRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCompany {
    pub name: String,
    pub website: Option<String>,
    pub industry: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOpportunity {
    pub name: String,
    pub stage: String,
    pub amount: u32,
    pub close_date: NaiveDate,
    pub description: String,
}

/// What the sync step needs from a CRM.
pub trait CrmClient {
    /// Exact name match.
    fn find_company_by_name(&self, name: &str) -> Result<Option<CrmRecord>, CrmError>;
    fn create_company(&self, company: &NewCompany) -> Result<String, CrmError>;
    fn create_opportunity(
        &self,
        opportunity: &NewOpportunity,
        company_id: &str,
    ) -> Result<String, CrmError>;
}

// --- EspoCRM ---

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    list: Vec<CrmRecord>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OpportunityPayload<'a> {
    name: &'a str,
    account_id: &'a str,
    stage: &'a str,
    amount: u32,
    close_date: String,
    description: &'a str,
}

pub struct EspoClient {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::blocking::Client,
}

impl EspoClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn endpoint(&self, entity: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, entity)
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::Response, CrmError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(CrmError::Api { status, body });
        }
        Ok(response)
    }

    fn create(&self, entity: &'static str, payload: &impl Serialize) -> Result<String, CrmError> {
        let response = self.send(self.client.post(self.endpoint(entity)).json(payload))?;
        let created: CreatedResponse = response.json()?;
        created.id.ok_or(CrmError::MissingId { entity })
    }
}

impl CrmClient for EspoClient {
    fn find_company_by_name(&self, name: &str) -> Result<Option<CrmRecord>, CrmError> {
        let params = [
            ("where[0][type]", "equals"),
            ("where[0][attribute]", "name"),
            ("where[0][value]", name),
        ];
        let response = self.send(self.client.get(self.endpoint("Account")).query(&params))?;
        let result: ListResponse = response.json()?;
        if result.total == 0 {
            return Ok(None);
        }
        Ok(result.list.into_iter().next())
    }

    fn create_company(&self, company: &NewCompany) -> Result<String, CrmError> {
        self.create("Account", company)
    }

    fn create_opportunity(
        &self,
        opportunity: &NewOpportunity,
        company_id: &str,
    ) -> Result<String, CrmError> {
        let payload = OpportunityPayload {
            name: &opportunity.name,
            account_id: company_id,
            stage: &opportunity.stage,
            amount: opportunity.amount,
            close_date: opportunity.close_date.format("%Y-%m-%d").to_string(),
            description: &opportunity.description,
        };
        self.create("Opportunity", &payload)
    }
}
