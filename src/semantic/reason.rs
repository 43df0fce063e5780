//! Heuristic explanation attached to every search hit.

use crate::catalog::Category;

/// Scores above this are reported as very similar
const VERY_SIMILAR_THRESHOLD: f32 = 0.7;

/// Scores above this (and up to the previous one) are reported as related
const RELATED_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrength {
    VerySimilar,
    Related,
    SimilarTheme,
}

impl MatchStrength {
    pub fn from_score(score: f32) -> Self {
        if score > VERY_SIMILAR_THRESHOLD {
            MatchStrength::VerySimilar
        } else if score > RELATED_THRESHOLD {
            MatchStrength::Related
        } else {
            MatchStrength::SimilarTheme
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrength::VerySimilar => "very similar",
            MatchStrength::Related => "related",
            MatchStrength::SimilarTheme => "similar theme",
        }
    }
}

/// Reason string for a hit, e.g. `"Film: very similar"`.
pub fn reason_for(category: Category, score: f32) -> String {
    format!(
        "{}: {}",
        category.label(),
        MatchStrength::from_score(score).as_str()
    )
}
