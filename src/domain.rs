//! Domain models: difficulty levels, the validated challenge, and the persisted dare.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How hard a challenge is. Exactly these three values are valid on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "Easy",
      Difficulty::Medium => "Medium",
      Difficulty::Hard => "Hard",
    }
  }

  /// Strict parse used for model output: the value must match exactly.
  pub fn from_wire(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|d| d.as_str() == s)
  }
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::Medium }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Lenient parse used for request hints ("hard", " HARD " are fine).
impl FromStr for Difficulty {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let t = s.trim();
    Self::ALL
      .into_iter()
      .find(|d| d.as_str().eq_ignore_ascii_case(t))
      .ok_or_else(|| format!("unknown difficulty '{t}' (expected Easy, Medium or Hard)"))
  }
}

/// A generated challenge. Only `schema::validate_challenge` builds these from
/// untrusted input, so every instance satisfies the non-empty invariants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
  pub title: String,
  pub difficulty: Difficulty,
  pub estimated_time: String,
  pub steps: Vec<String>,
  pub fun_fact: String,
}

/// Dare identifier. Numeric so stores written by the browser app still load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DareId(pub u64);

impl fmt::Display for DareId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for DareId {
  type Err = std::num::ParseIntError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.trim().parse::<u64>().map(DareId)
  }
}

/// An accepted challenge plus its lifecycle metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dare {
  pub id: DareId,
  #[serde(flatten)]
  pub challenge: Challenge,
  pub accepted_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
}

/// Which of the two disjoint collections a dare lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
  Ongoing,
  Completed,
}

impl Collection {
  /// Fixed persistence key for this collection.
  pub fn key(&self) -> &'static str {
    match self {
      Collection::Ongoing => "ongoing",
      Collection::Completed => "completed",
    }
  }
}

impl fmt::Display for Collection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

/// Category shown to the user; `label` is what goes into the prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub id: String,
  pub label: String,
  #[serde(default)]
  pub description: String,
}
