//! Service configuration read from the environment

use crate::grading::{GradeScale, ScaleError, ScaleKind};
use crate::state_machine::state::{DEFAULT_MAX_COURSES, DEFAULT_MAX_CREDIT};
use crate::state_machine::CollectionPolicy;
use std::str::FromStr;

const DEFAULT_PORT: u16 = 8000;

/// Runtime configuration for the assistant
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub db_path: String,
    pub port: u16,
    pub max_courses: u32,
    pub max_credit: f64,
    pub scale: ScaleKind,
    pub persist_results: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(std::env::var("HOME").ok()),
            port: DEFAULT_PORT,
            max_courses: DEFAULT_MAX_COURSES,
            max_credit: DEFAULT_MAX_CREDIT,
            scale: ScaleKind::default(),
            persist_results: true,
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unparseable values keep their default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self {
            db_path: default_db_path(lookup("HOME")),
            ..Self::default()
        };

        let max_courses = parse_or(
            "GPA_MAX_COURSES",
            lookup("GPA_MAX_COURSES"),
            defaults.max_courses,
        )
        .max(1);

        let mut max_credit = parse_or(
            "GPA_MAX_CREDIT",
            lookup("GPA_MAX_CREDIT"),
            defaults.max_credit,
        );
        if !(max_credit.is_finite() && max_credit > 0.0) {
            tracing::warn!(value = max_credit, "GPA_MAX_CREDIT must be positive, using default");
            max_credit = defaults.max_credit;
        }

        Self {
            db_path: lookup("GPA_DB_PATH").unwrap_or(defaults.db_path),
            port: parse_or("GPA_PORT", lookup("GPA_PORT"), defaults.port),
            max_courses,
            max_credit,
            scale: parse_or("GPA_GRADE_SCALE", lookup("GPA_GRADE_SCALE"), defaults.scale),
            persist_results: lookup("GPA_PERSIST_RESULTS")
                .map_or(defaults.persist_results, |v| parse_flag(&v)),
        }
    }

    pub fn policy(&self) -> CollectionPolicy {
        CollectionPolicy {
            max_courses: self.max_courses,
            max_credit: self.max_credit,
        }
    }

    /// The configured grade table, validated
    pub fn grade_scale(&self) -> Result<GradeScale, ScaleError> {
        self.scale.build()
    }
}

fn default_db_path(home: Option<String>) -> String {
    let home = home.unwrap_or_else(|| "/tmp".to_string());
    format!("{home}/.gpa-assistant/gpa.db")
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring invalid configuration value");
            default
        }),
    }
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
