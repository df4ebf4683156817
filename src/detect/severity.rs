use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of the count-to-severity band table below.
pub const SEVERITY_TABLE_VERSION: u32 = 1;

/// Severity band of a report.
///
/// Ordered: `Low < Medium < High < Critical`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Band table v1.
    ///
    /// | qualifying boxes | severity |
    /// |------------------|----------|
    /// | 0-1              | low      |
    /// | 2                | medium   |
    /// | 3-4              | high     |
    /// | 5+               | critical |
    pub fn from_box_count(count: u32) -> Self {
        match count {
            0..=1 => Severity::Low,
            2 => Severity::Medium,
            3..=4 => Severity::High,
            _ => Severity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown severity '{}'", s))
    }
}
