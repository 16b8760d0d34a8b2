//! Grade scales
//!
//! Maps a numeric course score to a letter grade and grade point. A scale is a
//! named, ordered table of tiers; each tier covers `[min_score, next_min)` and
//! the top tier extends to 100.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest score a course can receive
pub const MAX_SCORE: f64 = 100.0;

/// Letter grade and the grade point it is worth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub letter: String,
    pub point: f64,
}

/// One contiguous score range of a scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeTier {
    /// Inclusive lower bound
    pub min_score: f64,
    pub letter: String,
    pub point: f64,
}

impl GradeTier {
    pub fn new(min_score: f64, letter: impl Into<String>, point: f64) -> Self {
        Self {
            min_score,
            letter: letter.into(),
            point,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScaleError {
    #[error("Scale has no tiers")]
    Empty,
    #[error("Tier {index} has an empty letter")]
    EmptyLetter { index: usize },
    #[error("Tier {index} starts at {min_score}, outside 0..=100")]
    OutOfRange { index: usize, min_score: f64 },
    #[error("Tier {index} must start below the tier above it")]
    NotDescending { index: usize },
    #[error("Tier {index} is worth more points than the tier above it")]
    PointsIncrease { index: usize },
    #[error("Lowest tier must start at 0, found {0}")]
    GapAtBottom(f64),
    #[error("Unknown grade scale: {0}")]
    UnknownKind(String),
}

/// Built-in scales a deployment can pick from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    /// Eleven-tier table with split B and C bands
    #[default]
    PlusMinus,
    /// Five-point-step table with minus grades
    FivePoint,
}

impl ScaleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleKind::PlusMinus => "plus_minus",
            ScaleKind::FivePoint => "five_point",
        }
    }

    /// Validated scale for this kind
    pub fn build(self) -> Result<GradeScale, ScaleError> {
        GradeScale::new(self.as_str(), self.tiers())
    }

    /// Tier table, highest first
    fn tiers(self) -> Vec<GradeTier> {
        match self {
            // A+ at 95, split B (83/80) and C (73/70) bands
            ScaleKind::PlusMinus => vec![
                GradeTier::new(95.0, "A+", 4.0),
                GradeTier::new(90.0, "A", 3.7),
                GradeTier::new(87.0, "B+", 3.3),
                GradeTier::new(83.0, "B", 3.0),
                GradeTier::new(80.0, "B", 2.7),
                GradeTier::new(77.0, "C+", 2.3),
                GradeTier::new(73.0, "C", 2.0),
                GradeTier::new(70.0, "C", 1.7),
                GradeTier::new(65.0, "D", 1.3),
                GradeTier::new(60.0, "D", 1.0),
                GradeTier::new(0.0, "F", 0.0),
            ],
            ScaleKind::FivePoint => vec![
                GradeTier::new(95.0, "A+", 4.0),
                GradeTier::new(90.0, "A", 4.0),
                GradeTier::new(85.0, "A-", 3.7),
                GradeTier::new(80.0, "B+", 3.3),
                GradeTier::new(75.0, "B", 3.0),
                GradeTier::new(70.0, "B-", 2.7),
                GradeTier::new(65.0, "C+", 2.3),
                GradeTier::new(60.0, "C", 2.0),
                GradeTier::new(55.0, "C-", 1.7),
                GradeTier::new(50.0, "D", 1.0),
                GradeTier::new(0.0, "F", 0.0),
            ],
        }
    }
}

impl fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScaleKind {
    type Err = ScaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plus_minus" | "plus-minus" => Ok(ScaleKind::PlusMinus),
            "five_point" | "five-point" => Ok(ScaleKind::FivePoint),
            other => Err(ScaleError::UnknownKind(other.to_string())),
        }
    }
}

/// Validated grade table, tiers ordered highest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeScale {
    name: String,
    tiers: Vec<GradeTier>,
}

impl GradeScale {
    /// Build a scale from tiers ordered highest first.
    pub fn new(name: impl Into<String>, tiers: Vec<GradeTier>) -> Result<Self, ScaleError> {
        if tiers.is_empty() {
            return Err(ScaleError::Empty);
        }

        for (index, tier) in tiers.iter().enumerate() {
            if tier.letter.trim().is_empty() {
                return Err(ScaleError::EmptyLetter { index });
            }
            if !(0.0..=MAX_SCORE).contains(&tier.min_score) {
                return Err(ScaleError::OutOfRange {
                    index,
                    min_score: tier.min_score,
                });
            }
            if index > 0 {
                let above = &tiers[index - 1];
                if tier.min_score >= above.min_score {
                    return Err(ScaleError::NotDescending { index });
                }
                if tier.point > above.point {
                    return Err(ScaleError::PointsIncrease { index });
                }
            }
        }

        let bottom = tiers[tiers.len() - 1].min_score;
        if bottom > 0.0 {
            return Err(ScaleError::GapAtBottom(bottom));
        }

        Ok(Self {
            name: name.into(),
            tiers,
        })
    }

    /// Canonical plus/minus table
    #[cfg(test)]
    pub fn plus_minus() -> Self {
        Self {
            name: ScaleKind::PlusMinus.as_str().to_string(),
            tiers: ScaleKind::PlusMinus.tiers(),
        }
    }

    #[cfg(test)]
    pub fn five_point() -> Self {
        Self {
            name: ScaleKind::FivePoint.as_str().to_string(),
            tiers: ScaleKind::FivePoint.tiers(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tiers(&self) -> &[GradeTier] {
        &self.tiers
    }

    /// Highest grade point any tier awards
    pub fn max_point(&self) -> f64 {
        self.tiers.first().map_or(0.0, |t| t.point)
    }

    /// Find the tier a score falls in.
    ///
    /// Scores below zero land in the bottom tier; callers validate the range
    /// before grading.
    pub fn tier_for(&self, score: f64) -> &GradeTier {
        let last = self.tiers.len() - 1;
        self.tiers
            .iter()
            .find(|t| score >= t.min_score)
            .unwrap_or(&self.tiers[last])
    }

    pub fn score_to_grade(&self, score: f64) -> Grade {
        let tier = self.tier_for(score);
        Grade {
            letter: tier.letter.clone(),
            point: tier.point,
        }
    }
}
