//! Flattened template context, with sensible defaults (row/column
//! counts, generated row labels, a zero-valued summary) so a template can
//! render even when upstream context-loading only partially populated the
//! verification.

use serde::Serialize;
use serde_json::{Map, Value};

const DEFAULT_ROW_COUNT: u32 = 6;
const DEFAULT_COLUMN_COUNT: u32 = 10;

/// Summary of a prior verification pass, defaulting to all-zero counts when
/// no history exists yet.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationSummary {
    /// Rows verified so far.
    pub rows_verified: u32,
    /// Discrepancies found so far.
    pub discrepancies_found: u32,
    /// Rows still pending verification.
    pub rows_pending: u32,
}

impl Default for VerificationSummary {
    fn default() -> Self {
        Self {
            rows_verified: 0,
            discrepancies_found: 0,
            rows_pending: 0,
        }
    }
}

impl VerificationSummary {
    /// Build a summary from loaded historical-context JSON, defaulting any
    /// absent field to zero rather than failing.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let get = |field: &str| value.get(field).and_then(Value::as_u64).map(|v| v as u32).unwrap_or(0);
        Self {
            rows_verified: get("rowsVerified"),
            discrepancies_found: get("discrepanciesFound"),
            rows_pending: get("rowsPending"),
        }
    }
}

/// The flat context handed to a template's `render`. Built up by the
/// orchestrator's context loader and turned into a handlebars JSON
/// context by `flatten`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    /// Number of rows in the vending machine layout.
    pub row_count: u32,
    /// Number of columns in the vending machine layout.
    pub column_count: u32,
    /// Row labels, defaulting to `A`, `B`, `C`, ... for `row_count` rows.
    pub row_labels: Vec<String>,
    /// Summary of prior verification progress.
    pub summary: VerificationSummary,
    /// Any additional key/value pairs a specific template needs, merged
    /// into the flattened context at the top level.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PromptContext {
    /// Build a context using default row/column counts and generated row
    /// labels (`A`..).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::with_dimensions(DEFAULT_ROW_COUNT, DEFAULT_COLUMN_COUNT)
    }

    /// Build a context with explicit dimensions, generating row labels.
    #[must_use]
    pub fn with_dimensions(row_count: u32, column_count: u32) -> Self {
        Self {
            row_count,
            column_count,
            row_labels: generate_row_labels(row_count),
            summary: VerificationSummary::default(),
            extra: Map::new(),
        }
    }

    /// Build a context from loaded layout metadata, reading `rowCount` and
    /// `columnCount` when present and falling back to
    /// [`Self::with_defaults`] only for whichever dimension metadata omits.
    /// `None` (no layout metadata at all) defaults both dimensions.
    #[must_use]
    pub fn from_layout_metadata(metadata: Option<&Value>) -> Self {
        let object = metadata.and_then(Value::as_object);
        let row_count = object
            .and_then(|m| m.get("rowCount"))
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_ROW_COUNT);
        let column_count = object
            .and_then(|m| m.get("columnCount"))
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_COLUMN_COUNT);
        let mut context = Self::with_dimensions(row_count, column_count);
        if let Some(labels) = object.and_then(|m| m.get("rowLabels")).and_then(Value::as_array) {
            let labels: Vec<String> = labels.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            if !labels.is_empty() {
                context.row_labels = labels;
            }
        }
        context
    }

    /// Merge an extra key/value pair into the flattened context.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Override the prior-verification summary (defaults to all-zero).
    #[must_use]
    pub fn with_summary(mut self, summary: VerificationSummary) -> Self {
        self.summary = summary;
        self
    }

    /// Flatten into the JSON value handlebars renders against.
    pub fn flatten(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

fn generate_row_labels(row_count: u32) -> Vec<String> {
    (0..row_count)
        .map(|i| {
            let letter = (b'A' + (i % 26) as u8) as char;
            letter.to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configured_constants() {
        let ctx = PromptContext::with_defaults();
        assert_eq!(ctx.row_count, 6);
        assert_eq!(ctx.column_count, 10);
        assert_eq!(ctx.row_labels, vec!["A", "B", "C", "D", "E", "F"]);
    }

    #[test]
    fn summary_defaults_to_zero() {
        let ctx = PromptContext::with_defaults();
        assert_eq!(ctx.summary.rows_verified, 0);
        assert_eq!(ctx.summary.discrepancies_found, 0);
    }

    #[test]
    fn extra_fields_are_merged_when_flattened() {
        let ctx = PromptContext::with_defaults().with_extra("machine_id", "vm-42");
        let flat = ctx.flatten().unwrap();
        assert_eq!(flat["machine_id"], "vm-42");
        assert_eq!(flat["row_count"], 6);
    }

    #[test]
    fn from_layout_metadata_defaults_when_absent() {
        let ctx = PromptContext::from_layout_metadata(None);
        assert_eq!(ctx.row_count, 6);
        assert_eq!(ctx.column_count, 10);
    }

    #[test]
    fn from_layout_metadata_overrides_dimensions_when_present() {
        let metadata = serde_json::json!({"rowCount": 8, "columnCount": 4});
        let ctx = PromptContext::from_layout_metadata(Some(&metadata));
        assert_eq!(ctx.row_count, 8);
        assert_eq!(ctx.column_count, 4);
        assert_eq!(ctx.row_labels.len(), 8);
    }

    #[test]
    fn from_layout_metadata_honors_explicit_row_labels() {
        let metadata = serde_json::json!({"rowCount": 2, "columnCount": 3, "rowLabels": ["R1", "R2"]});
        let ctx = PromptContext::from_layout_metadata(Some(&metadata));
        assert_eq!(ctx.row_labels, vec!["R1", "R2"]);
    }

    #[test]
    fn summary_from_json_defaults_missing_fields_to_zero() {
        let summary = VerificationSummary::from_json(&serde_json::json!({"rowsVerified": 4}));
        assert_eq!(summary.rows_verified, 4);
        assert_eq!(summary.discrepancies_found, 0);
        assert_eq!(summary.rows_pending, 0);
    }
}
