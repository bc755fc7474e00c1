//! Scoring rules and subject lookup codes.
//!
//! Thresholds are strict: a diagnostic score of exactly 40 or 80 is
//! `Intermediate`, and progress of exactly 30 or 70 stays in the lower
//! engagement bucket.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::error::{EduError, Result};
use crate::model::{AssessmentAnswer, EngagementLevel, ProficiencyLevel};

/// Diagnostic scores strictly below this are `Beginner`.
pub const BEGINNER_BELOW: f64 = 40.0;

/// Diagnostic scores strictly above this are `Advanced`.
pub const ADVANCED_ABOVE: f64 = 80.0;

/// Maximum draws when looking for an unused subject code.
pub const MAX_CODE_ATTEMPTS: usize = 64;

/// Prefix used when a subject name yields no characters.
const FALLBACK_PREFIX: &str = "SUB";

#[allow(clippy::unwrap_used)]
static CODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s-]+-\d{4}$").unwrap());

/// Percentage of correct answers, or `None` for an empty answer list.
#[must_use]
pub fn diagnostic_score(answers: &[AssessmentAnswer]) -> Option<f64> {
    if answers.is_empty() {
        return None;
    }
    let correct = answers.iter().filter(|a| a.correct).count();
    #[allow(clippy::cast_precision_loss)]
    let score = 100.0 * (correct as f64 / answers.len() as f64);
    Some(score)
}

impl ProficiencyLevel {
    /// Derives the level from a diagnostic score.
    ///
    /// # Examples
    ///
    /// ```
    /// use eduadapt_core::ProficiencyLevel;
    ///
    /// assert_eq!(ProficiencyLevel::from_score(35.0), ProficiencyLevel::Beginner);
    /// assert_eq!(ProficiencyLevel::from_score(40.0), ProficiencyLevel::Intermediate);
    /// assert_eq!(ProficiencyLevel::from_score(80.0), ProficiencyLevel::Intermediate);
    /// assert_eq!(ProficiencyLevel::from_score(81.0), ProficiencyLevel::Advanced);
    /// ```
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < BEGINNER_BELOW {
            Self::Beginner
        } else if score > ADVANCED_ABOVE {
            Self::Advanced
        } else {
            Self::Intermediate
        }
    }

    /// Like [`ProficiencyLevel::from_score`], treating a missing score as `Intermediate`.
    #[must_use]
    pub fn from_optional_score(score: Option<f64>) -> Self {
        score.map_or(Self::Intermediate, Self::from_score)
    }
}

impl EngagementLevel {
    /// Buckets subject progress: above 70 is high, above 30 is medium.
    #[must_use]
    pub const fn from_progress(progress: u8) -> Self {
        if progress > 70 {
            Self::High
        } else if progress > 30 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Helpers for the human-typeable subject lookup code, e.g. `ALG-4921`.
pub struct SubjectCode;

impl SubjectCode {
    /// The uppercased prefix derived from a subject name.
    #[must_use]
    pub fn prefix(subject_name: &str) -> String {
        let prefix: String = subject_name
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .take(3)
            .collect::<String>()
            .to_uppercase();
        if prefix.is_empty() {
            FALLBACK_PREFIX.to_string()
        } else {
            prefix
        }
    }

    /// Draws a random code for the subject name.
    #[must_use]
    pub fn draw<R: Rng + ?Sized>(subject_name: &str, rng: &mut R) -> String {
        let number: u16 = rng.gen_range(1000..=9999);
        format!("{}-{number}", Self::prefix(subject_name))
    }

    /// Draws codes until one is not already taken.
    pub fn mint<R, F>(subject_name: &str, rng: &mut R, mut is_taken: F) -> Result<String>
    where
        R: Rng + ?Sized,
        F: FnMut(&str) -> bool,
    {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = Self::draw(subject_name, rng);
            if !is_taken(&Self::normalize(&code)) {
                return Ok(code);
            }
        }
        Err(EduError::CodeSpaceExhausted {
            prefix: Self::prefix(subject_name),
        })
    }

    /// Canonical form used for comparisons: trimmed and uppercased.
    #[must_use]
    pub fn normalize(input: &str) -> String {
        input.trim().to_uppercase()
    }

    /// Returns `true` if the normalized input looks like a minted code.
    #[must_use]
    pub fn is_well_formed(input: &str) -> bool {
        CODE_PATTERN.is_match(&Self::normalize(input))
    }
}
