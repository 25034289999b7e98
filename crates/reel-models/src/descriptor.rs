//! Match descriptor: the immutable metadata input for a render job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One side of the fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TeamInfo {
    /// Full team name (e.g., "Riverton United")
    pub name: String,
    /// Short code used in the scoreboard overlay (e.g., "RIV")
    pub short_code: String,
    /// Optional path to the team badge image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
}

impl TeamInfo {
    pub fn new(name: impl Into<String>, short_code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_code: short_code.into(),
            badge: None,
        }
    }
}

/// Final score of the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ScoreLine {
    pub home: u32,
    pub away: u32,
}

impl ScoreLine {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }
}

impl std::fmt::Display for ScoreLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.home, self.away)
    }
}

/// Immutable match metadata submitted alongside the source recording.
///
/// Owned by the caller; the pipeline never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatchDescriptor {
    pub home: TeamInfo,
    pub away: TeamInfo,
    /// Competition name (e.g., "County League Division 1")
    pub competition: String,
    /// Match date in ISO format (YYYY-MM-DD)
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    pub final_score: ScoreLine,
    /// Man of the match, if awarded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub man_of_the_match: Option<String>,
}

impl MatchDescriptor {
    /// Short fixture label for logging and slate titles (e.g., "RIV vs AWY").
    pub fn fixture_label(&self) -> String {
        format!("{} vs {}", self.home.short_code, self.away.short_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> MatchDescriptor {
        MatchDescriptor {
            home: TeamInfo::new("Riverton United", "RIV"),
            away: TeamInfo::new("Ashworth Town", "ASH"),
            competition: "County League".to_string(),
            date: "2026-03-14".to_string(),
            venue: Some("Riverton Park".to_string()),
            final_score: ScoreLine::new(2, 1),
            man_of_the_match: Some("J. Carter".to_string()),
        }
    }

    #[test]
    fn test_fixture_label() {
        assert_eq!(descriptor().fixture_label(), "RIV vs ASH");
    }

    #[test]
    fn test_score_display() {
        assert_eq!(ScoreLine::new(2, 1).to_string(), "2 - 1");
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let d = descriptor();
        let json = serde_json::to_string(&d).unwrap();
        let back: MatchDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.home.short_code, "RIV");
        assert_eq!(back.final_score, d.final_score);
    }
}
