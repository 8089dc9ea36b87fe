use regex::Regex;
use std::sync::LazyLock;

use crate::models::{ExperienceEstimate, ExperienceLevel};

// "5+ years", "3 yrs"
static PLUS_YEARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)\+?\s*(?:years?|yrs?)\b").expect("plus-years pattern")
});

// "3-5 years", "2 – 4 yrs"
static RANGE_YEARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)\s*[-–]\s*(\d+)\s*(?:years?|yrs?)\b").expect("range-years pattern")
});

// Checked in this order; the first class that matches wins.
static LEVELS: LazyLock<[(Regex, ExperienceLevel); 3]> = LazyLock::new(|| {
    [
        (
            Regex::new(r"\b(?:junior|jr|entry-level)\b").expect("junior pattern"),
            ExperienceLevel::Junior,
        ),
        (
            Regex::new(r"\b(?:senior|sr)\b").expect("senior pattern"),
            ExperienceLevel::Senior,
        ),
        (
            Regex::new(r"\b(?:mid-level|intermediate)\b").expect("mid pattern"),
            ExperienceLevel::Mid,
        ),
    ]
});

/// Estimate required experience from free text.
///
/// Nothing recognizable leaves every field `None`; that is the common case.
pub fn extract(text: &str) -> ExperienceEstimate {
    let lower = text.to_lowercase();
    let mut estimate = ExperienceEstimate::default();

    if let Some(cap) = PLUS_YEARS.captures(&lower) {
        estimate.years_min = cap[1].parse().ok();
    }

    // Range runs second and overwrites the plus-pattern minimum.
    if let Some(cap) = RANGE_YEARS.captures(&lower) {
        if let (Ok(min), Ok(max)) = (cap[1].parse(), cap[2].parse()) {
            estimate.years_min = Some(min);
            estimate.years_max = Some(max);
        }
    }

    estimate.level = LEVELS
        .iter()
        .find(|(re, _)| re.is_match(&lower))
        .map(|(_, level)| *level);

    estimate
}
