//! Issue report records.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::detect::Severity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Pothole,
    Waste,
    Streetlight,
    Water,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Pothole,
        Category::Waste,
        Category::Streetlight,
        Category::Water,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Pothole => "pothole",
            Category::Waste => "waste",
            Category::Streetlight => "streetlight",
            Category::Water => "water",
            Category::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Pothole => "Pothole",
            Category::Waste => "Waste management",
            Category::Streetlight => "Faulty streetlight",
            Category::Water => "Water and sanitation",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| anyhow!("unknown category '{}'", s.trim()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Pending,
    InProgress,
    Resolved,
    Closed,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        ReportStatus::Pending,
        ReportStatus::InProgress,
        ReportStatus::Resolved,
        ReportStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        ReportStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| anyhow!("unknown report status '{}'", s.trim()))
    }
}

/// A report ready to be stored. Status starts as `pending`.
#[derive(Clone, Debug, PartialEq)]
pub struct NewReport {
    pub reporter: Option<String>,
    pub title: String,
    pub category: Category,
    pub description: String,
    pub location: String,
    pub severity: Severity,
    /// Stored copy of the uploaded still.
    pub image: Option<String>,
    /// Stored copy of the uploaded clip.
    pub video: Option<String>,
    pub annotated_image: Option<String>,
    pub annotated_video: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IssueReport {
    pub id: i64,
    pub reporter: Option<String>,
    pub title: String,
    pub category: Category,
    pub description: String,
    pub location: String,
    pub status: ReportStatus,
    pub severity: Severity,
    pub created_at: u64,
    pub updated_at: u64,
    pub image: Option<String>,
    pub video: Option<String>,
    pub annotated_image: Option<String>,
    pub annotated_video: Option<String>,
}

impl IssueReport {
    pub(crate) fn from_new(id: i64, report: NewReport, now: u64) -> Self {
        Self {
            id,
            reporter: report.reporter,
            title: report.title,
            category: report.category,
            description: report.description,
            location: report.location,
            status: ReportStatus::Pending,
            severity: report.severity,
            created_at: now,
            updated_at: now,
            image: report.image,
            video: report.video,
            annotated_image: report.annotated_image,
            annotated_video: report.annotated_video,
        }
    }

    pub fn has_media(&self) -> bool {
        self.image.is_some() || self.video.is_some()
    }
}

impl fmt::Display for IssueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.category.label())
    }
}

/// Listing filter; `None` fields match everything.
#[derive(Clone, Debug, Default)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub category: Option<Category>,
    pub severity: Option<Severity>,
    pub limit: Option<usize>,
}

impl ReportFilter {
    pub fn matches(&self, report: &IssueReport) -> bool {
        self.status.map_or(true, |s| s == report.status)
            && self.category.map_or(true, |c| c == report.category)
            && self.severity.map_or(true, |s| s == report.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_parse_case_insensitively() {
        assert_eq!(" Pothole ".parse::<Category>().unwrap(), Category::Pothole);
        assert_eq!("STREETLIGHT".parse::<Category>().unwrap(), Category::Streetlight);
        assert!("graffiti".parse::<Category>().is_err());
    }

    #[test]
    fn status_uses_snake_case_names() {
        assert_eq!(ReportStatus::InProgress.as_str(), "in_progress");
        assert_eq!("in_progress".parse::<ReportStatus>().unwrap(), ReportStatus::InProgress);
        assert_eq!(ReportStatus::default(), ReportStatus::Pending);
        let json = serde_json::to_string(&ReportStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
