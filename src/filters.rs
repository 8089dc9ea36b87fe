use std::fmt;

use crate::config::{
    CompanyRules, ExperienceRules, FilterConfig, LocationRules, RoleRules, TechRules,
};
use crate::experience;
use crate::models::{ExperienceEstimate, Posting};

/// The sub-filter that rejected a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Role,
    Location,
    Company,
    Tech,
    Experience,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterStage::Role => "role",
            FilterStage::Location => "location",
            FilterStage::Company => "company",
            FilterStage::Tech => "tech",
            FilterStage::Experience => "experience",
        };
        f.write_str(s)
    }
}

/// True when the posting passes every sub-filter.
pub fn accepts(posting: &Posting, config: &FilterConfig) -> bool {
    rejected_by(posting, config).is_none()
}

/// Runs the sub-filters in order and stops at the first failure.
pub fn rejected_by(posting: &Posting, config: &FilterConfig) -> Option<FilterStage> {
    if !passes_role_filter(posting, &config.role) {
        return Some(FilterStage::Role);
    }
    if !passes_location_filter(posting, &config.location) {
        return Some(FilterStage::Location);
    }
    if !passes_company_filter(posting, &config.company) {
        return Some(FilterStage::Company);
    }
    if !passes_tech_filter(posting, &config.tech) {
        return Some(FilterStage::Tech);
    }
    if !passes_experience_filter(posting, &config.experience) {
        return Some(FilterStage::Experience);
    }
    None
}

fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.contains(&term.to_lowercase())
}

pub fn passes_role_filter(posting: &Posting, rules: &RoleRules) -> bool {
    let title = posting.title.to_lowercase();
    let description = posting.description.to_lowercase();

    // Excludes only look at the title
    if rules.exclude.iter().any(|term| contains_term(&title, term)) {
        return false;
    }

    if rules.include.is_empty() {
        return true;
    }
    rules
        .include
        .iter()
        .any(|term| contains_term(&title, term) || contains_term(&description, term))
}

pub fn passes_location_filter(posting: &Posting, rules: &LocationRules) -> bool {
    let haystack = format!(
        "{} {}",
        posting.location.as_deref().unwrap_or(""),
        posting.description
    )
    .to_lowercase();

    if rules.exclude.iter().any(|term| contains_term(&haystack, term)) {
        return false;
    }

    if rules.remote_ok && posting.remote {
        return true;
    }

    if rules.include.is_empty() {
        return true;
    }
    rules.include.iter().any(|term| contains_term(&haystack, term))
}

pub fn passes_company_filter(posting: &Posting, rules: &CompanyRules) -> bool {
    let haystack = format!("{} {}", posting.company_name, posting.description).to_lowercase();
    !rules
        .exclude_keywords
        .iter()
        .any(|term| contains_term(&haystack, term))
}

pub fn passes_tech_filter(posting: &Posting, rules: &TechRules) -> bool {
    let description = posting.description.to_lowercase();
    let present = |term: &String| {
        let term = term.to_lowercase();
        posting.tech_stack.contains(&term) || description.contains(&term)
    };

    // Exclusion is checked before require-any counting
    if rules.exclude.iter().any(present) {
        return false;
    }

    if rules.require_any.is_empty() {
        return true;
    }
    let matches = rules.require_any.iter().filter(|t| present(t)).count();
    matches >= rules.min_match
}

pub fn passes_experience_filter(posting: &Posting, rules: &ExperienceRules) -> bool {
    let from_title = experience::extract(&posting.title);
    let from_description = experience::extract(&posting.description);

    let estimate = ExperienceEstimate {
        years_min: from_title.years_min.or(from_description.years_min),
        years_max: from_title.years_max.or(from_description.years_max),
        level: from_title.level.or(from_description.level),
    };

    // No signal at all is not disqualifying
    if !estimate.has_signal() {
        return true;
    }

    if let (Some(max), Some(min)) = (rules.max_years, estimate.years_min) {
        if min > max {
            return false;
        }
    }

    if let Some(level) = estimate.level {
        if !rules.levels.is_empty() && !rules.levels.contains(&level) {
            return false;
        }
    }

    true
}
