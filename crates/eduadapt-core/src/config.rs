//! Configuration types for EduAdapt.
//!
//! Configuration is read from `eduadapt.json` (camelCase keys). Every field
//! has a default, so a missing file yields a usable configuration; a file
//! that exists but does not parse or validate is a fatal error.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EduError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "eduadapt.json";

/// Default directory for the JSON record store.
fn default_data_dir() -> String {
    ".eduadapt".to_string()
}

/// Default provider model.
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

/// Default environment variable holding the provider key.
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

/// Default provider endpoint.
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

/// Default per-call generation timeout in seconds.
const fn default_timeout_seconds() -> u32 {
    30
}

/// Default number of weak-area inputs offered.
const fn default_weak_area_slots() -> usize {
    2
}

/// Default diagnostic length.
const fn default_assessment_length() -> usize {
    10
}

/// Default diagnostic subject mix.
fn default_assessment_subjects() -> Vec<String> {
    ["Math", "Language", "Natural Science", "History"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Default number of interests requested from enrichment.
const fn default_interests_count() -> usize {
    3
}

/// Default progress gained per correct lesson answer.
const fn default_progress_step() -> u8 {
    10
}

/// Default number of video recommendations per lesson.
const fn default_video_links() -> usize {
    2
}

/// Default reserved demo code.
fn default_demo_code() -> String {
    "DEMO-1234".to_string()
}

/// Default minutes a session may sit idle before it is dropped.
const fn default_idle_timeout_minutes() -> u32 {
    120
}

/// Default value for boolean options that default to true.
const fn default_true() -> bool {
    true
}

/// Main configuration for EduAdapt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory holding the record store collections.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Content generator settings.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Student onboarding settings.
    #[serde(default)]
    pub onboarding: OnboardingConfig,

    /// Lesson loop settings.
    #[serde(default)]
    pub lesson: LessonConfig,

    /// Reserved demo code settings.
    #[serde(default)]
    pub demo: DemoConfig,

    /// Session lifetime settings.
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            generator: GeneratorConfig::default(),
            onboarding: OnboardingConfig::default(),
            lesson: LessonConfig::default(),
            demo: DemoConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            EduError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `eduadapt.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns the validated default configuration.
    ///
    /// # Errors
    ///
    /// Returns `EduError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values, and
    /// `EduError::ConfigValidationError` if the values are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(EduError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| EduError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `EduError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.trim().is_empty() {
            return Err(EduError::config_validation(
                "dataDir must not be empty",
                "Provide a directory for the record store in your eduadapt.json",
            ));
        }

        if self.generator.timeout_seconds == 0 {
            return Err(EduError::config_validation(
                "generator.timeoutSeconds must be greater than 0",
                "Set generator.timeoutSeconds to at least 1 second in your eduadapt.json",
            ));
        }

        if self.onboarding.weak_area_slots == 0 {
            return Err(EduError::config_validation(
                "onboarding.weakAreaSlots must be greater than 0",
                "Set onboarding.weakAreaSlots to at least 1 in your eduadapt.json",
            ));
        }

        if self.onboarding.assessment_length == 0 {
            return Err(EduError::config_validation(
                "onboarding.assessmentLength must be greater than 0",
                "Set onboarding.assessmentLength to at least 1 in your eduadapt.json",
            ));
        }

        if self
            .onboarding
            .assessment_subjects
            .iter()
            .all(|s| s.trim().is_empty())
        {
            return Err(EduError::config_validation(
                "onboarding.assessmentSubjects must name at least one subject",
                "List the diagnostic subjects in your eduadapt.json",
            ));
        }

        if self.lesson.progress_step == 0 || self.lesson.progress_step > 100 {
            return Err(EduError::config_validation(
                "lesson.progressStep must be between 1 and 100",
                "Set lesson.progressStep to a percentage such as 10 in your eduadapt.json",
            ));
        }

        if self.demo.enabled && self.demo.code.trim().is_empty() {
            return Err(EduError::config_validation(
                "demo.code must not be empty when the demo is enabled",
                "Set demo.code or disable the demo in your eduadapt.json",
            ));
        }

        if self.session.idle_timeout_minutes == 0 {
            return Err(EduError::config_validation(
                "session.idleTimeoutMinutes must be greater than 0",
                "Set session.idleTimeoutMinutes to at least 1 in your eduadapt.json",
            ));
        }

        Ok(())
    }
}

/// Supported content providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeneratorProvider {
    /// Google Gemini over HTTP (default).
    #[default]
    Gemini,
    /// No provider; every request falls back.
    Offline,
}

impl GeneratorProvider {
    /// Parses a string into a `GeneratorProvider`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Some(Self::Gemini),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for GeneratorProvider {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid generator provider '{s}': expected one of 'gemini', 'offline'"
            ))
        })
    }
}

impl Serialize for GeneratorProvider {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Gemini => "gemini",
            Self::Offline => "offline",
        };
        serializer.serialize_str(s)
    }
}

/// Content generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    /// Which provider to call.
    #[serde(default)]
    pub provider: GeneratorProvider,

    /// Provider model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Provider base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: GeneratorProvider::default(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl GeneratorConfig {
    /// The per-call timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }

    /// Reads the API key from the configured environment variable.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Student onboarding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingConfig {
    /// Maximum number of weak areas a student may declare.
    #[serde(default = "default_weak_area_slots")]
    pub weak_area_slots: usize,

    /// Number of diagnostic items requested.
    #[serde(default = "default_assessment_length")]
    pub assessment_length: usize,

    /// Subjects the diagnostic spans.
    #[serde(default = "default_assessment_subjects")]
    pub assessment_subjects: Vec<String>,

    /// Number of interests requested from enrichment.
    #[serde(default = "default_interests_count")]
    pub interests_count: usize,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            weak_area_slots: default_weak_area_slots(),
            assessment_length: default_assessment_length(),
            assessment_subjects: default_assessment_subjects(),
            interests_count: default_interests_count(),
        }
    }
}

/// Lesson loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonConfig {
    /// Progress percentage gained per correct answer.
    #[serde(default = "default_progress_step")]
    pub progress_step: u8,

    /// Video recommendations requested per lesson.
    #[serde(default = "default_video_links")]
    pub video_links: usize,
}

impl Default for LessonConfig {
    fn default() -> Self {
        Self {
            progress_step: default_progress_step(),
            video_links: default_video_links(),
        }
    }
}

/// Reserved demo code settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoConfig {
    /// Whether the demo code returns canned data when nothing real matches.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// The reserved demo code.
    #[serde(default = "default_demo_code")]
    pub code: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            code: default_demo_code(),
        }
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Minutes without a request after which a session is dropped.
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: u32,
}

impl SessionConfig {
    /// The idle timeout as a `Duration`.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.idle_timeout_minutes) * 60)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: default_idle_timeout_minutes(),
        }
    }
}
