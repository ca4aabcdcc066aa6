//! Bulk ingestion of products and orders.
//!
//! A run goes through four phases:
//!
//! 1. parse: JSON records or delimited text become positioned candidates
//! 2. validate: field checks, in-batch duplicates, conflicts with stored data
//! 3. decide: strict mode rejects the batch on any error; validate-only stops here
//! 4. commit: accepted records are written in fixed-size batches, one record at a time
//!
//! A failing record is reported and never stops its siblings. The whole run
//! leaves one audit entry.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::access::{authorize, Grant, Identity, Operation};
use crate::services::Fulfillment;
use crate::{FulfillmentError, Result};

pub mod orders;
pub mod parser;
pub mod products;

pub use parser::{parse_rows, Row, TextFormat};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportOptions {
    /// Omit records that clash with the batch or stored data instead of reporting them.
    pub skip_duplicates: bool,
    /// Update records that already exist instead of reporting them.
    pub update_existing: bool,
    /// Report what would happen without writing anything.
    pub validate_only: bool,
    /// Reject the whole batch if any record is invalid.
    pub strict: bool,
}

/// Records to import, either already structured or as delimited text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum ImportSource<T> {
    Records { records: Vec<T> },
    Text { text: String, #[serde(flatten)] format: TextFormat },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    /// 1-based position of the record in the batch.
    pub record: usize,
    /// Source lines for text input.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub validate_only: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport<T> {
    pub created: Vec<T>,
    pub updated: Vec<T>,
    pub skipped: Vec<usize>,
    pub errors: Vec<RecordError>,
    pub summary: ImportSummary,
}

impl<T> ImportReport<T> {
    fn new(total: usize, validate_only: bool) -> Self {
        Self {
            created: vec![],
            updated: vec![],
            skipped: vec![],
            errors: vec![],
            summary: ImportSummary { total, validate_only, ..Default::default() },
        }
    }

    fn fail(&mut self, origin: &Origin, error: impl Into<String>) {
        self.errors.push(RecordError { record: origin.record, lines: origin.lines.clone(), key: origin.key.clone(), error: error.into() });
        self.summary.errors += 1;
    }

    fn skip(&mut self, origin: &Origin) {
        self.skipped.push(origin.record);
        self.summary.skipped += 1;
    }

    fn created(&mut self, item: Option<T>) {
        self.created.extend(item);
        self.summary.created += 1;
    }

    fn updated(&mut self, item: Option<T>) {
        self.updated.extend(item);
        self.summary.updated += 1;
    }
}

/// Where a candidate came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Origin {
    pub record: usize,
    pub lines: Vec<usize>,
    pub key: Option<String>,
}

impl Origin {
    pub(crate) fn at(record: usize) -> Self { Self { record, ..Default::default() } }
}

/// What validation decided for one candidate.
pub(crate) enum Plan<C, U> {
    Create(C),
    Update(U),
    Skip,
    Reject(Vec<String>),
}

/// How duplicates are treated, shared by both record kinds.
pub(crate) fn on_duplicate<C, U>(options: ImportOptions, message: String) -> Plan<C, U> {
    if options.skip_duplicates { Plan::Skip } else { Plan::Reject(vec![message]) }
}

pub struct BulkIngestion<'a> {
    pub(crate) ctx: &'a Fulfillment,
}

impl<'a> BulkIngestion<'a> {
    pub(crate) fn new(ctx: &'a Fulfillment) -> Self { Self { ctx } }

    /// Authorizes the run and picks the business records are written into.
    pub(crate) fn begin<'i>(&self, identity: &'i Identity, requested: Option<Uuid>) -> Result<(Grant<'i>, Uuid)> {
        let grant = authorize(identity, Operation::BulkImport)?;
        let business = grant.target_business(requested)?;
        Ok((grant, business))
    }

    /// Phase 3. Sorts plans into skipped, rejected and accepted. Strict mode
    /// turns any rejection into a batch-level error; validate-only counts the
    /// accepted plans as if they had been written.
    pub(crate) fn decide<C, U, T>(
        &self,
        kind: &str,
        options: ImportOptions,
        plans: Vec<(Origin, Plan<C, U>)>,
    ) -> Result<(ImportReport<T>, Vec<(Origin, Plan<C, U>)>)> {
        let mut report = ImportReport::new(plans.len(), options.validate_only);
        let mut accepted = vec![];
        for (origin, plan) in plans {
            match plan {
                Plan::Skip => report.skip(&origin),
                Plan::Reject(problems) => report.fail(&origin, problems.join("; ")),
                plan => accepted.push((origin, plan)),
            }
        }

        if options.strict && !report.errors.is_empty() {
            let details = report.errors.iter().map(|e| format!("record {}: {}", e.record, e.error)).collect();
            return Err(FulfillmentError::invalid_fields(
                format!("Bulk {kind} import rejected: {} of {} records are invalid", report.errors.len(), report.summary.total),
                details,
            ));
        }
        if options.validate_only {
            for (_, plan) in &accepted {
                match plan {
                    Plan::Update(_) => report.updated(None),
                    _ => report.created(None),
                }
            }
            report.errors.sort_by_key(|e| e.record);
            return Ok((report, vec![]));
        }
        Ok((report, accepted))
    }

    /// Records per commit batch.
    pub(crate) fn batch_size(&self) -> usize { self.ctx.settings.bulk_batch_size.max(1) }

    /// Phase 4 bookkeeping: writes the run's single audit entry.
    pub(crate) async fn finish<T>(
        &self,
        identity: &Identity,
        kind: &str,
        business_id: Uuid,
        options: ImportOptions,
        batches: usize,
        mut report: ImportReport<T>,
    ) -> ImportReport<T> {
        report.errors.sort_by_key(|e| e.record);
        let s = &report.summary;
        self.ctx.audit.record(
            "BulkImport",
            business_id,
            &format!("BULK_IMPORT_{}", kind.to_ascii_uppercase()),
            json!({
                "total": s.total,
                "created": s.created,
                "updated": s.updated,
                "skipped": s.skipped,
                "errors": s.errors,
                "batches": batches,
                "options": options,
            }),
            identity.user_id,
        ).await;
        info!(kind, total = s.total, created = s.created, updated = s.updated, skipped = s.skipped, errors = s.errors, "Bulk import finished");
        report
    }
}

impl<T> ImportReport<T> {
    /// Records the result of committing one accepted record.
    pub(crate) fn outcome(&mut self, origin: &Origin, result: Result<(T, bool)>) {
        match result {
            Ok((item, false)) => self.created(Some(item)),
            Ok((item, true)) => self.updated(Some(item)),
            Err(e) => self.fail(origin, e.to_string()),
        }
    }
}

/// Parses an optional column, collecting the problem instead of failing.
pub(crate) fn field<T: std::str::FromStr>(row: &Row, column: &str, problems: &mut Vec<String>) -> Option<T> {
    row.parse(column).unwrap_or_else(|e| {
        problems.push(e);
        None
    })
}

pub(crate) fn log_batch(kind: &str, batch: usize, records: usize) {
    debug!(kind, batch, records, "Committing import batch");
}
