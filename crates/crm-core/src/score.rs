//! Placement scores.
//!
//! A score is a bounded integer in `[-INFINITY, +INFINITY]`. The two
//! extremes are sticky: `-INFINITY` means "never here" and absorbs
//! everything (including `+INFINITY`), `+INFINITY` means "must be here"
//! and absorbs every finite value. Finite sums saturate at the bounds.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Magnitude used for the infinite scores.
pub const INFINITY: i32 = 1_000_000;

/// A node score or priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "ScoreRepr", into = "ScoreRepr")]
pub struct Score(i32);

impl Score {
    pub const ZERO: Score = Score(0);
    pub const INFINITY: Score = Score(INFINITY);
    pub const NEG_INFINITY: Score = Score(-INFINITY);

    /// Build a score, clamping out-of-range values to the infinities.
    pub fn new(value: i64) -> Self {
        Score(value.clamp(-i64::from(INFINITY), i64::from(INFINITY)) as i32)
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// `-INFINITY`: the node is excluded.
    pub fn is_excluded(self) -> bool {
        self.0 <= -INFINITY
    }

    /// `+INFINITY`: the node is mandatory.
    pub fn is_mandatory(self) -> bool {
        self.0 >= INFINITY
    }

    pub fn is_finite(self) -> bool {
        !self.is_excluded() && !self.is_mandatory()
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        if self.is_excluded() || rhs.is_excluded() {
            Score::NEG_INFINITY
        } else if self.is_mandatory() || rhs.is_mandatory() {
            Score::INFINITY
        } else {
            Score::new(i64::from(self.0) + i64::from(rhs.0))
        }
    }
}

impl AddAssign for Score {
    fn add_assign(&mut self, rhs: Score) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Score {
    fn sum<I: Iterator<Item = Score>>(iter: I) -> Score {
        iter.fold(Score::ZERO, |acc, s| acc + s)
    }
}

impl From<i32> for Score {
    fn from(value: i32) -> Self {
        Score::new(i64::from(value))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mandatory() {
            write!(f, "INFINITY")
        } else if self.is_excluded() {
            write!(f, "-INFINITY")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Error returned when a score string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid score: {0:?}")]
pub struct ParseScoreError(pub String);

impl FromStr for Score {
    type Err = ParseScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "INFINITY" | "+INFINITY" | "INF" | "+INF" => Ok(Score::INFINITY),
            "-INFINITY" | "-INF" => Ok(Score::NEG_INFINITY),
            _ => trimmed
                .parse::<i64>()
                .map(Score::new)
                .map_err(|_| ParseScoreError(s.to_string())),
        }
    }
}

/// Wire form: plain integers, or the strings `"INFINITY"` / `"-INFINITY"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ScoreRepr {
    Int(i64),
    Text(String),
}

impl TryFrom<ScoreRepr> for Score {
    type Error = ParseScoreError;

    fn try_from(repr: ScoreRepr) -> Result<Self, Self::Error> {
        match repr {
            ScoreRepr::Int(v) => Ok(Score::new(v)),
            ScoreRepr::Text(s) => s.parse(),
        }
    }
}

impl From<Score> for ScoreRepr {
    fn from(score: Score) -> Self {
        if score.is_finite() {
            ScoreRepr::Int(i64::from(score.0))
        } else {
            ScoreRepr::Text(score.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_addition() {
        assert_eq!(Score::from(5) + Score::from(-3), Score::from(2));
    }

    #[test]
    fn negative_infinity_absorbs_positive() {
        assert_eq!(Score::INFINITY + Score::NEG_INFINITY, Score::NEG_INFINITY);
        assert_eq!(Score::NEG_INFINITY + Score::from(100), Score::NEG_INFINITY);
    }

    #[test]
    fn sums_saturate() {
        let big = Score::from(INFINITY - 1);
        assert_eq!(big + Score::from(10), Score::INFINITY);
        assert_eq!(Score::new(-5_000_000), Score::NEG_INFINITY);
    }

    #[test]
    fn parses_infinity_strings() {
        assert_eq!("INFINITY".parse::<Score>().unwrap(), Score::INFINITY);
        assert_eq!("+infinity".parse::<Score>().unwrap(), Score::INFINITY);
        assert_eq!("-INFINITY".parse::<Score>().unwrap(), Score::NEG_INFINITY);
        assert_eq!(" 42 ".parse::<Score>().unwrap(), Score::from(42));
        assert!("lots".parse::<Score>().is_err());
    }

    #[test]
    fn serde_accepts_ints_and_strings() {
        let scores: Vec<Score> = serde_json::from_str(r#"[10, "-INFINITY", "INFINITY", -7]"#).unwrap();
        assert_eq!(
            scores,
            vec![Score::from(10), Score::NEG_INFINITY, Score::INFINITY, Score::from(-7)]
        );
        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"[10,"-INFINITY","INFINITY",-7]"#);
    }

    #[test]
    fn sum_of_empty_is_zero() {
        let total: Score = Vec::<Score>::new().into_iter().sum();
        assert_eq!(total, Score::ZERO);
    }
}
