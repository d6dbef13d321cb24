//! Batch classification of a spreadsheet of articles.
//!
//! Rows are classified `batch_size` at a time, concurrently within a batch,
//! with a pause between batches so a rate-limited oracle endpoint stays under
//! its quota. A row that cannot be classified keeps the code it came with.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tariff_cascade::{CascadeOrchestrator, Tier};
use thiserror::Error;
use tracing::{info, warn};

const ARTICLE_COLUMN: &str = "article";
const CODE_COLUMN: &str = "code";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Input has no `{0}` column")]
    MissingColumn(&'static str),

    #[error("Batch size must be at least 1")]
    InvalidBatchSize,
}

/// A delimited table with an `article` column and a `code` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    article: usize,
    code: usize,
}

impl Sheet {
    /// Build from headers and rows. Column names match case-insensitively;
    /// a missing `code` column is appended.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, BatchError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let article = find(ARTICLE_COLUMN).ok_or(BatchError::MissingColumn(ARTICLE_COLUMN))?;
        let code = find(CODE_COLUMN);
        let mut headers = headers;
        let code = match code {
            Some(idx) => idx,
            None => {
                headers.push(CODE_COLUMN.to_string());
                headers.len() - 1
            }
        };
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width.max(row.len()), String::new());
                row
            })
            .collect();
        Ok(Self {
            headers,
            rows,
            article,
            code,
        })
    }

    /// Read a TSV (`.tsv`, `.tab`) or CSV file.
    pub fn read(path: &Path) -> Result<Self, BatchError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Self::new(headers, rows)
    }

    /// Write as TSV, whatever the input format was.
    pub fn write_tsv(&self, path: &Path) -> Result<(), BatchError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn article(&self, row: usize) -> &str {
        &self.rows[row][self.article]
    }

    pub fn code(&self, row: usize) -> &str {
        &self.rows[row][self.code]
    }

    fn set_code(&mut self, row: usize, code: String) {
        self.rows[row][self.code] = code;
    }
}

fn delimiter_for(path: &Path) -> u8 {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("tsv" | "tab" | "txt") => b'\t',
        _ => b',',
    }
}

/// What happened to one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Classified(String),
    /// The cascade found nothing; original code kept.
    Unmatched,
    /// Hard failure; original code kept.
    Failed(String),
    /// Blank article; not sent.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub classified: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub skipped: usize,
    pub batches: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    fn new(total: usize) -> Self {
        let now = Utc::now();
        Self {
            total,
            classified: 0,
            unmatched: 0,
            failed: 0,
            skipped: 0,
            batches: 0,
            started_at: now,
            finished_at: now,
        }
    }

    fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Classified(_) => self.classified += 1,
            RowOutcome::Unmatched => self.unmatched += 1,
            RowOutcome::Failed(_) => self.failed += 1,
            RowOutcome::Skipped => self.skipped += 1,
        }
    }
}

pub struct BatchClassifier {
    orchestrator: Arc<CascadeOrchestrator>,
    depth: Tier,
    batch_size: usize,
    pause: Duration,
}

impl BatchClassifier {
    pub fn new(
        orchestrator: Arc<CascadeOrchestrator>,
        batch_size: usize,
        pause: Duration,
    ) -> Result<Self, BatchError> {
        if batch_size == 0 {
            return Err(BatchError::InvalidBatchSize);
        }
        Ok(Self {
            orchestrator,
            depth: Tier::Leaf,
            batch_size,
            pause,
        })
    }

    /// Deepest tier to classify to (default: Leaf).
    pub fn with_depth(mut self, depth: Tier) -> Self {
        self.depth = depth;
        self
    }

    /// Classify every row of `sheet` in place.
    pub async fn run(&self, sheet: &mut Sheet) -> BatchSummary {
        let mut summary = BatchSummary::new(sheet.len());
        let indices: Vec<usize> = (0..sheet.len()).collect();
        let batches: Vec<&[usize]> = indices.chunks(self.batch_size).collect();
        let last = batches.len().saturating_sub(1);

        for (n, batch) in batches.iter().enumerate() {
            let articles: Vec<String> = batch
                .iter()
                .map(|&row| sheet.article(row).to_string())
                .collect();
            let outcomes = join_all(articles.iter().map(|a| self.classify_row(a))).await;

            for (&row, outcome) in batch.iter().zip(outcomes) {
                summary.record(&outcome);
                if let RowOutcome::Classified(code) = outcome {
                    sheet.set_code(row, code);
                }
            }
            summary.batches += 1;
            info!(
                batch = n + 1,
                of = batches.len(),
                classified = summary.classified,
                "batch complete"
            );

            if n < last && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        summary.finished_at = Utc::now();
        summary
    }

    /// Read `input`, classify it, write the result to `output` as TSV.
    pub async fn run_file(&self, input: &Path, output: &Path) -> Result<BatchSummary, BatchError> {
        let mut sheet = Sheet::read(input)?;
        let summary = self.run(&mut sheet).await;
        sheet.write_tsv(output)?;
        Ok(summary)
    }

    async fn classify_row(&self, article: &str) -> RowOutcome {
        if article.trim().is_empty() {
            return RowOutcome::Skipped;
        }
        match self.orchestrator.classify(article, self.depth).await {
            Ok(result) => match result.best_code() {
                Some(code) => RowOutcome::Classified(code.to_string()),
                None => RowOutcome::Unmatched,
            },
            Err(e) if e.is_no_match() => RowOutcome::Unmatched,
            Err(e) => {
                warn!(%article, kind = %e.kind(), error = %e, "row classification failed");
                RowOutcome::Failed(e.to_string())
            }
        }
    }
}
