use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, Row};

use crate::now_s;
use crate::report::{IssueReport, NewReport, ReportFilter, ReportStatus};

pub trait ReportStore {
    fn create(&mut self, report: NewReport) -> Result<IssueReport>;

    fn get(&mut self, id: i64) -> Result<Option<IssueReport>>;

    /// Reports filed by `reporter`, newest first.
    fn list_by_reporter(&mut self, reporter: &str) -> Result<Vec<IssueReport>>;

    /// Reports matching `filter`, newest first.
    fn list(&mut self, filter: &ReportFilter) -> Result<Vec<IssueReport>>;

    /// Returns `false` when no report has that id.
    fn update_status(&mut self, id: i64, status: ReportStatus) -> Result<bool>;
}

pub struct SqliteReportStore {
    conn: Connection,
}

const SELECT_COLUMNS: &str = "id, reporter, title, category, description, location, status, \
     severity, created_at, updated_at, image, video, annotated_image, annotated_video";

impl SqliteReportStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("open report database {}", db_path))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS issue_reports (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              reporter TEXT,
              title TEXT NOT NULL,
              category TEXT NOT NULL,
              description TEXT NOT NULL,
              location TEXT NOT NULL,
              status TEXT NOT NULL DEFAULT 'pending',
              severity TEXT NOT NULL DEFAULT 'medium',
              created_at INTEGER NOT NULL,
              updated_at INTEGER NOT NULL,
              image TEXT,
              video TEXT,
              annotated_image TEXT,
              annotated_video TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_reports_reporter ON issue_reports(reporter);
            CREATE INDEX IF NOT EXISTS idx_reports_created ON issue_reports(created_at);
            "#,
        )?;
        Ok(())
    }

    fn query_reports(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<IssueReport>> {
        let rows = {
            let mut stmt = self.conn.prepare(sql)?;
            let mut rows = stmt.query(params)?;
            let mut raw = Vec::new();
            while let Some(row) = rows.next()? {
                raw.push(RawReport::from_row(row)?);
            }
            raw
        };
        rows.into_iter().map(RawReport::into_report).collect()
    }
}

/// Column values as stored, before enum parsing.
struct RawReport {
    id: i64,
    reporter: Option<String>,
    title: String,
    category: String,
    description: String,
    location: String,
    status: String,
    severity: String,
    created_at: i64,
    updated_at: i64,
    image: Option<String>,
    video: Option<String>,
    annotated_image: Option<String>,
    annotated_video: Option<String>,
}

impl RawReport {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            reporter: row.get(1)?,
            title: row.get(2)?,
            category: row.get(3)?,
            description: row.get(4)?,
            location: row.get(5)?,
            status: row.get(6)?,
            severity: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            image: row.get(10)?,
            video: row.get(11)?,
            annotated_image: row.get(12)?,
            annotated_video: row.get(13)?,
        })
    }

    fn into_report(self) -> Result<IssueReport> {
        let id = self.id;
        let corrupt = move |field: &str| format!("corrupt report {}: {}", id, field);
        Ok(IssueReport {
            id,
            category: self.category.parse().with_context(|| corrupt("category"))?,
            status: self.status.parse().with_context(|| corrupt("status"))?,
            severity: self.severity.parse().with_context(|| corrupt("severity"))?,
            created_at: u64::try_from(self.created_at)
                .map_err(|_| anyhow!(corrupt("created_at")))?,
            updated_at: u64::try_from(self.updated_at)
                .map_err(|_| anyhow!(corrupt("updated_at")))?,
            reporter: self.reporter,
            title: self.title,
            description: self.description,
            location: self.location,
            image: self.image,
            video: self.video,
            annotated_image: self.annotated_image,
            annotated_video: self.annotated_video,
        })
    }
}

impl ReportStore for SqliteReportStore {
    fn create(&mut self, report: NewReport) -> Result<IssueReport> {
        let now = now_s()?;
        let created_at =
            i64::try_from(now).map_err(|_| anyhow!("timestamp exceeds i64 range"))?;
        self.conn.execute(
            r#"
            INSERT INTO issue_reports(
              reporter, title, category, description, location, status, severity,
              created_at, updated_at, image, video, annotated_image, annotated_video
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                report.reporter,
                report.title,
                report.category.as_str(),
                report.description,
                report.location,
                ReportStatus::Pending.as_str(),
                report.severity.as_str(),
                created_at,
                report.image,
                report.video,
                report.annotated_image,
                report.annotated_video
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(IssueReport::from_new(id, report, now))
    }

    fn get(&mut self, id: i64) -> Result<Option<IssueReport>> {
        let sql = format!("SELECT {} FROM issue_reports WHERE id = ?1", SELECT_COLUMNS);
        Ok(self.query_reports(&sql, &[&id])?.into_iter().next())
    }

    fn list_by_reporter(&mut self, reporter: &str) -> Result<Vec<IssueReport>> {
        let sql = format!(
            "SELECT {} FROM issue_reports WHERE reporter = ?1 ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        );
        self.query_reports(&sql, &[&reporter])
    }

    fn list(&mut self, filter: &ReportFilter) -> Result<Vec<IssueReport>> {
        let status = filter.status.map(|s| s.as_str());
        let category = filter.category.map(|c| c.as_str());
        let severity = filter.severity.map(|s| s.as_str());
        let limit = filter
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        let sql = format!(
            r#"
            SELECT {} FROM issue_reports
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR category = ?2)
              AND (?3 IS NULL OR severity = ?3)
            ORDER BY created_at DESC, id DESC
            LIMIT ?4
            "#,
            SELECT_COLUMNS
        );
        self.query_reports(&sql, &[&status, &category, &severity, &limit])
    }

    fn update_status(&mut self, id: i64, status: ReportStatus) -> Result<bool> {
        let now = i64::try_from(now_s()?).map_err(|_| anyhow!("timestamp exceeds i64 range"))?;
        let changed = self.conn.execute(
            "UPDATE issue_reports SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )?;
        if changed > 0 {
            log::info!("report {} status changed to {}", id, status);
        }
        Ok(changed > 0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryReportStore {
    reports: Vec<IssueReport>,
    next_id: i64,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    fn newest_first<'a>(reports: impl Iterator<Item = &'a IssueReport>) -> Vec<IssueReport> {
        let mut out: Vec<IssueReport> = reports.cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }
}

impl ReportStore for InMemoryReportStore {
    fn create(&mut self, report: NewReport) -> Result<IssueReport> {
        self.next_id += 1;
        let stored = IssueReport::from_new(self.next_id, report, now_s()?);
        self.reports.push(stored.clone());
        Ok(stored)
    }

    fn get(&mut self, id: i64) -> Result<Option<IssueReport>> {
        Ok(self.reports.iter().find(|r| r.id == id).cloned())
    }

    fn list_by_reporter(&mut self, reporter: &str) -> Result<Vec<IssueReport>> {
        Ok(Self::newest_first(
            self.reports
                .iter()
                .filter(|r| r.reporter.as_deref() == Some(reporter)),
        ))
    }

    fn list(&mut self, filter: &ReportFilter) -> Result<Vec<IssueReport>> {
        let mut out = Self::newest_first(self.reports.iter().filter(|r| filter.matches(r)));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn update_status(&mut self, id: i64, status: ReportStatus) -> Result<bool> {
        let now = now_s()?;
        match self.reports.iter_mut().find(|r| r.id == id) {
            Some(report) => {
                report.status = status;
                report.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Severity;
    use crate::report::Category;

    fn new_report(reporter: &str, title: &str, category: Category, severity: Severity) -> NewReport {
        NewReport {
            reporter: Some(reporter.to_string()),
            title: title.to_string(),
            category,
            description: "deep hole in the left lane".to_string(),
            location: "5th and Main".to_string(),
            severity,
            image: Some("issues/images/hole.jpg".to_string()),
            video: None,
            annotated_image: Some("issues/ann_images/hole-1.jpg".to_string()),
            annotated_video: None,
        }
    }

    fn exercise(store: &mut dyn ReportStore) -> Result<()> {
        let first = store.create(new_report("ana", "Hole", Category::Pothole, Severity::High))?;
        let second = store.create(new_report("ana", "Bins", Category::Waste, Severity::Low))?;
        store.create(new_report("ben", "Lamp", Category::Streetlight, Severity::Low))?;

        assert_eq!(first.status, ReportStatus::Pending);
        assert!(second.id > first.id);

        let fetched = store.get(first.id)?.unwrap();
        assert_eq!(fetched, first);
        assert!(store.get(9999)?.is_none());

        let mine = store.list_by_reporter("ana")?;
        let ids: Vec<_> = mine.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        assert!(store.update_status(first.id, ReportStatus::InProgress)?);
        assert!(!store.update_status(9999, ReportStatus::Closed)?);
        assert_eq!(store.get(first.id)?.unwrap().status, ReportStatus::InProgress);

        let low = store.list(&ReportFilter {
            severity: Some(Severity::Low),
            ..ReportFilter::default()
        })?;
        assert_eq!(low.len(), 2);
        let in_progress = store.list(&ReportFilter {
            status: Some(ReportStatus::InProgress),
            ..ReportFilter::default()
        })?;
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].category, Category::Pothole);
        let limited = store.list(&ReportFilter {
            limit: Some(1),
            ..ReportFilter::default()
        })?;
        assert_eq!(limited.len(), 1);
        Ok(())
    }

    #[test]
    fn sqlite_store_round_trips_reports() -> Result<()> {
        let mut store = SqliteReportStore::open_in_memory()?;
        exercise(&mut store)
    }

    #[test]
    fn in_memory_store_matches_sqlite_behavior() -> Result<()> {
        let mut store = InMemoryReportStore::new();
        exercise(&mut store)?;
        assert_eq!(store.len(), 3);
        Ok(())
    }

    #[test]
    fn sqlite_store_persists_across_connections() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = dir.path().join("reports.db");
        let db = db.to_str().unwrap();
        let id = {
            let mut store = SqliteReportStore::open(db)?;
            store
                .create(new_report("ana", "Hole", Category::Pothole, Severity::Critical))?
                .id
        };
        let mut reopened = SqliteReportStore::open(db)?;
        let report = reopened.get(id)?.unwrap();
        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.annotated_image.as_deref(), Some("issues/ann_images/hole-1.jpg"));
        Ok(())
    }
}
