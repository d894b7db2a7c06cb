use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Absorbs floating-point noise at band edges.
pub const GRADE_EPSILON: f64 = 0.01;

pub const NO_GRADE_LABEL: &str = "NG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub id: String,
    pub grade_name: String,
    pub min_score: f64,
    pub max_score: f64,
    pub interpretation: Option<String>,
    pub grade_point: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Closest,
    NoGrade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeMatch {
    pub grade_id: Option<String>,
    pub grade: String,
    pub interpretation: String,
    pub grade_point: Option<f64>,
    pub kind: MatchKind,
}

impl GradeMatch {
    pub fn no_grade(interpretation: &str) -> Self {
        Self {
            grade_id: None,
            grade: NO_GRADE_LABEL.to_string(),
            interpretation: interpretation.to_string(),
            grade_point: None,
            kind: MatchKind::NoGrade,
        }
    }

    fn from_band(band: &GradeBand, kind: MatchKind) -> Self {
        Self {
            grade_id: Some(band.id.clone()),
            grade: band.grade_name.clone(),
            interpretation: band
                .interpretation
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| band.grade_name.clone()),
            grade_point: band.grade_point,
            kind,
        }
    }
}

fn sorted_bands(bands: &[GradeBand]) -> Vec<&GradeBand> {
    let mut sorted: Vec<&GradeBand> = bands.iter().collect();
    sorted.sort_by(|a, b| {
        a.min_score
            .partial_cmp(&b.min_score)
            .unwrap_or(Ordering::Equal)
    });
    sorted
}

fn distance_to_band(score: f64, band: &GradeBand) -> f64 {
    if score < band.min_score {
        band.min_score - score
    } else if score > band.max_score {
        score - band.max_score
    } else {
        0.0
    }
}

/// Maps a score onto the school's grade bands.
///
/// Bounds are inclusive on both ends. A band that contains the score outright
/// wins; only then is [`GRADE_EPSILON`] tolerance applied. A score outside
/// every band falls back to the nearest band; an empty band list yields the
/// `NG` sentinel. Never fails.
pub fn resolve_grade(score: f64, bands: &[GradeBand]) -> GradeMatch {
    if bands.is_empty() {
        return GradeMatch::no_grade("No Grades Available");
    }

    let sorted = sorted_bands(bands);

    if let Some(band) = sorted
        .iter()
        .find(|b| score >= b.min_score && score <= b.max_score)
    {
        return GradeMatch::from_band(band, MatchKind::Exact);
    }
    if let Some(band) = sorted.iter().find(|b| {
        score >= b.min_score - GRADE_EPSILON && score <= b.max_score + GRADE_EPSILON
    }) {
        return GradeMatch::from_band(band, MatchKind::Exact);
    }

    let mut closest: Option<(&GradeBand, f64)> = None;
    for band in &sorted {
        let d = distance_to_band(score, band);
        if !d.is_finite() {
            continue;
        }
        // Strict comparison keeps the lower band on equal distance.
        if closest.map(|(_, best)| d < best).unwrap_or(true) {
            closest = Some((band, d));
        }
    }

    match closest {
        Some((band, distance)) => {
            tracing::warn!(
                score,
                distance,
                band_count = bands.len(),
                grade = %band.grade_name,
                "no grade band contains score; using closest band"
            );
            GradeMatch::from_band(band, MatchKind::Closest)
        }
        None => {
            tracing::warn!(score, band_count = bands.len(), "grade could not be determined");
            GradeMatch::no_grade("Grade Not Determined")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GradeBandIssue {
    InvertedRange {
        grade: String,
        min_score: f64,
        max_score: f64,
    },
    Gap {
        lower: String,
        upper: String,
        from: f64,
        to: f64,
    },
    Overlap {
        lower: String,
        upper: String,
        at: f64,
    },
}

/// Checks that bands partition the score range. Bands use integer-style edges,
/// so 40–59 followed by 60–100 is contiguous.
pub fn validate_grade_bands(bands: &[GradeBand]) -> Vec<GradeBandIssue> {
    let sorted = sorted_bands(bands);
    let mut issues = Vec::new();

    for (i, band) in sorted.iter().enumerate() {
        if band.min_score > band.max_score {
            issues.push(GradeBandIssue::InvertedRange {
                grade: band.grade_name.clone(),
                min_score: band.min_score,
                max_score: band.max_score,
            });
        }
        let Some(next) = sorted.get(i + 1) else {
            continue;
        };
        if band.max_score + 1.0 < next.min_score {
            issues.push(GradeBandIssue::Gap {
                lower: band.grade_name.clone(),
                upper: next.grade_name.clone(),
                from: band.max_score,
                to: next.min_score,
            });
        }
        if band.max_score >= next.min_score {
            issues.push(GradeBandIssue::Overlap {
                lower: band.grade_name.clone(),
                upper: next.grade_name.clone(),
                at: next.min_score,
            });
        }
    }

    issues
}
