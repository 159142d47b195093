use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc::Sender;

use crate::config::{PipelineConfig, RetryPolicy};
use crate::document::{rows_to_csv, Workbook};
use crate::error::{AnalysisError, Result};
use crate::llm::model::{request_structured, request_text, LanguageModel};
use crate::llm::prompts::{
    metric_extraction_prompt, short_answer_prompt, SYSTEM_PROMPT_METRIC_EXTRACTION,
    SYSTEM_PROMPT_SHORT_ANSWER,
};
use crate::llm::sheet_locator::SheetLocator;
use crate::llm::types::ExtractionEvent;
use crate::normalizer::normalize_present;
use crate::retrieval::RetrievalEngine;
use crate::schema::{MetricName, MetricSet, RawExtraction};
use crate::session::AnalysisContext;
use crate::utils::{clean_text_answer, current_year_label};

/// Reply meaning "the context does not state it".
const UNKNOWN_ANSWER: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq)]
enum Extracted {
    Text(String),
    Crore(f64),
}

type Outcome = (MetricName, Result<Extracted>);

/// Fills a [`MetricSet`] from a document, one model request per metric.
///
/// Requests run concurrently up to `max_concurrent_extractions` and are all
/// joined before the set is assembled. A metric that cannot be extracted is
/// left absent; only cancellation or an unreadable document aborts.
pub struct MetricExtractor {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    max_concurrency: usize,
    progress: Option<Sender<ExtractionEvent>>,
}

impl MetricExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self {
            model,
            retry: config.retry.clone(),
            max_concurrency: config.max_concurrent_extractions.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Sender<ExtractionEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// PDF mode: each metric's context is retrieved from the semantic index.
    pub async fn extract_from_text(
        &self,
        retrieval: &RetrievalEngine,
        ctx: &AnalysisContext,
    ) -> Result<MetricSet> {
        info!(
            "Extracting {} metrics for '{}' from text",
            MetricName::EXTRACTED.len(),
            ctx.company_name
        );
        self.send_event(ExtractionEvent::Starting {
            metrics: MetricName::EXTRACTED.len(),
        })
        .await;

        let tasks = MetricName::EXTRACTED.into_iter().map(|metric| async move {
            let outcome = match retrieval.context_for(metric.question()).await {
                Ok(context) if context.trim().is_empty() => Err(AnalysisError::ExtractionFailure {
                    metric,
                    reason: "no passages retrieved".to_string(),
                }),
                Ok(context) => self.extract_metric(metric, &context).await,
                Err(e) => Err(as_metric_failure(metric, e)),
            };
            (metric, outcome)
        });

        let outcomes = self.run_bounded(ctx, tasks).await?;
        self.assemble(ctx, outcomes).await
    }

    /// Spreadsheet mode: the sheet locator runs first, then each mapped
    /// metric is extracted from its sheet rendered as CSV.
    pub async fn extract_from_workbook(
        &self,
        workbook: &mut dyn Workbook,
        ctx: &AnalysisContext,
    ) -> Result<MetricSet> {
        let sheet_names = workbook.list_sheets();
        info!(
            "Extracting {} metrics for '{}' from a workbook with {} sheet(s)",
            MetricName::EXTRACTED.len(),
            ctx.company_name,
            sheet_names.len()
        );
        self.send_event(ExtractionEvent::Starting {
            metrics: MetricName::EXTRACTED.len(),
        })
        .await;
        self.send_event(ExtractionEvent::LocatingSheets {
            sheets: sheet_names.len(),
        })
        .await;

        let locator = SheetLocator::new(self.model.clone(), self.retry.clone());
        let sheet_map = cancellable(ctx, locator.locate(&sheet_names)).await?;
        self.send_event(ExtractionEvent::SheetsLocated {
            unmapped: sheet_map.unmapped(),
        })
        .await;

        let mut tables: HashMap<String, String> = HashMap::new();
        for sheet in sheet_map.assigned_sheets() {
            match workbook.read_sheet(sheet).and_then(|rows| rows_to_csv(&rows)) {
                Ok(csv) => {
                    debug!("Read sheet '{}' ({} bytes of csv)", sheet, csv.len());
                    tables.insert(sheet.to_string(), csv);
                }
                Err(e) => warn!("Skipping sheet '{}': {}", sheet, e),
            }
        }

        let sheet_map = &sheet_map;
        let tables = &tables;
        let tasks = MetricName::EXTRACTED.into_iter().map(|metric| async move {
            let outcome = match sheet_map.sheet_for(metric) {
                None => Err(AnalysisError::MappingAbsent(metric)),
                Some(sheet) => match tables.get(sheet) {
                    Some(csv) if !csv.trim().is_empty() => self.extract_metric(metric, csv).await,
                    Some(_) => Err(AnalysisError::ExtractionFailure {
                        metric,
                        reason: format!("sheet '{sheet}' is empty"),
                    }),
                    None => Err(AnalysisError::ExtractionFailure {
                        metric,
                        reason: format!("sheet '{sheet}' could not be read"),
                    }),
                },
            };
            (metric, outcome)
        });

        let outcomes = self.run_bounded(ctx, tasks).await?;
        self.assemble(ctx, outcomes).await
    }

    async fn extract_metric(&self, metric: MetricName, context: &str) -> Result<Extracted> {
        if metric == MetricName::FiscalYear {
            let reply = request_text(
                self.model.as_ref(),
                &self.retry,
                SYSTEM_PROMPT_SHORT_ANSWER,
                &short_answer_prompt(metric.question(), context),
            )
            .await
            .map_err(|e| as_metric_failure(metric, e))?;

            let answer = clean_text_answer(&reply);
            if answer.is_empty() || answer.eq_ignore_ascii_case(UNKNOWN_ANSWER) {
                return Err(AnalysisError::ExtractionFailure {
                    metric,
                    reason: "not stated in context".to_string(),
                });
            }
            return Ok(Extracted::Text(answer));
        }

        let raw: RawExtraction = request_structured(
            self.model.as_ref(),
            &self.retry,
            SYSTEM_PROMPT_METRIC_EXTRACTION,
            &metric_extraction_prompt(metric.question(), context),
        )
        .await
        .map_err(|e| as_metric_failure(metric, e))?;

        match normalize_present(&raw) {
            Some(crore) => {
                debug!(
                    "{}: {:?} {:?} -> {} crore",
                    metric, raw.value, raw.unit, crore
                );
                Ok(Extracted::Crore(crore))
            }
            None => Err(AnalysisError::ExtractionFailure {
                metric,
                reason: "value not present in context".to_string(),
            }),
        }
    }

    async fn run_bounded<I, F>(&self, ctx: &AnalysisContext, tasks: I) -> Result<Vec<Outcome>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Outcome>,
    {
        let joined = stream::iter(tasks)
            .buffer_unordered(self.max_concurrency)
            .collect::<Vec<_>>();

        match cancellable(ctx, async { Ok(joined.await) }).await {
            Ok(outcomes) => Ok(outcomes),
            Err(e) => {
                self.send_event(ExtractionEvent::Failed {
                    reason: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    /// Barrier output: builds the set only once every metric has an outcome.
    async fn assemble(&self, ctx: &AnalysisContext, outcomes: Vec<Outcome>) -> Result<MetricSet> {
        let mut metrics = MetricSet::new(ctx.company_name.clone(), current_year_label());
        let mut absent = 0;

        for (metric, outcome) in outcomes {
            match outcome {
                Ok(Extracted::Text(text)) => {
                    metrics.fiscal_year = text;
                    self.send_event(ExtractionEvent::MetricExtracted { metric })
                        .await;
                }
                Ok(Extracted::Crore(value)) => {
                    metrics.set_numeric(metric, Some(value));
                    self.send_event(ExtractionEvent::MetricExtracted { metric })
                        .await;
                }
                Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(e) => {
                    absent += 1;
                    if metric == MetricName::FiscalYear {
                        warn!("{}; using {}", e, metrics.fiscal_year);
                    } else {
                        warn!("{}; recording as absent", e);
                    }
                    self.send_event(ExtractionEvent::MetricAbsent {
                        metric,
                        reason: e.to_string(),
                    })
                    .await;
                }
            }
        }

        info!(
            "Extracted {} of {} metrics for '{}' ({})",
            MetricName::EXTRACTED.len() - absent,
            MetricName::EXTRACTED.len(),
            metrics.company_name,
            metrics.fiscal_year
        );
        self.send_event(ExtractionEvent::Success { absent }).await;
        Ok(metrics)
    }

    async fn send_event(&self, event: ExtractionEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event).await;
        }
    }
}

/// Per-metric failures collapse into `ExtractionFailure`; cancellation passes
/// through untouched.
fn as_metric_failure(metric: MetricName, err: AnalysisError) -> AnalysisError {
    match err {
        AnalysisError::Cancelled | AnalysisError::ExtractionFailure { .. } => err,
        other => AnalysisError::ExtractionFailure {
            metric,
            reason: other.to_string(),
        },
    }
}

/// Resolves to `Cancelled` as soon as the context's token fires.
pub(crate) async fn cancellable<T, F>(ctx: &AnalysisContext, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if ctx.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = ctx.cancellation().cancelled() => {
            warn!("Session '{}' cancelled during extraction", ctx.session_id);
            Err(AnalysisError::Cancelled)
        }
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MemoryWorkbook;
    use crate::llm::prompts::SYSTEM_PROMPT_SHEET_LOCATOR;
    use crate::schema::Unit;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Answers by looking for a metric's question in the prompt.
    struct TableModel {
        sheet_map: Value,
        amounts: Vec<(MetricName, Value)>,
        fiscal_year: Option<&'static str>,
        delay: Option<Duration>,
    }

    impl TableModel {
        fn new(sheet_map: Value) -> Self {
            Self {
                sheet_map,
                amounts: Vec::new(),
                fiscal_year: None,
                delay: None,
            }
        }

        fn amount(mut self, metric: MetricName, value: f64, unit: Unit) -> Self {
            self.amounts
                .push((metric, serde_json::to_value(RawExtraction::new(value, unit)).unwrap()));
            self
        }

        fn reply(mut self, metric: MetricName, reply: Value) -> Self {
            self.amounts.push((metric, reply));
            self
        }
    }

    #[async_trait]
    impl LanguageModel for TableModel {
        async fn extract_structured(&self, system: &str, user: &str, _: &Value) -> Result<Value> {
            if system == SYSTEM_PROMPT_SHEET_LOCATOR {
                return Ok(self.sheet_map.clone());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            for (metric, reply) in &self.amounts {
                if user.contains(metric.question()) {
                    return Ok(reply.clone());
                }
            }
            Err(AnalysisError::UpstreamService("rate limited".into()))
        }

        async fn generate_text(&self, _: &str, _: &str) -> Result<String> {
            match self.fiscal_year {
                Some(fy) => Ok(format!("\"{fy}\"")),
                None => Ok(UNKNOWN_ANSWER.to_string()),
            }
        }

        fn model_name(&self) -> &str {
            "table"
        }
    }

    fn workbook() -> MemoryWorkbook {
        MemoryWorkbook::new()
            .with_sheet("P&L", vec![vec!["Revenue from operations", "1,000"]])
            .with_sheet("BS", vec![vec!["Total equity", "70,000"]])
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy::none(),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_workbook_extraction_normalizes_and_marks_absent() {
        let model = TableModel {
            fiscal_year: Some("FY 2023-24"),
            ..TableModel::new(json!({
                "fiscal_year": "P&L",
                "revenue_current_year": "P&L",
                "total_equity": "BS",
                "total_liabilities": null
            }))
        }
        .amount(MetricName::RevenueCurrentYear, 1000.0, Unit::Crore)
        .amount(MetricName::TotalEquity, 70000.0, Unit::Lakh);

        let extractor = MetricExtractor::new(Arc::new(model), &config());
        let ctx = AnalysisContext::new("s1", "Acme Ltd");
        let mut wb = workbook();
        let metrics = extractor.extract_from_workbook(&mut wb, &ctx).await.unwrap();

        assert_eq!(metrics.company_name, "Acme Ltd");
        assert_eq!(metrics.fiscal_year, "FY 2023-24");
        assert_eq!(metrics.revenue_current_year, Some(1000.0));
        assert_eq!(metrics.total_equity, Some(700.0));
        assert_eq!(metrics.total_liabilities, None);
        assert_eq!(metrics.revenue_previous_year, None);
    }

    #[tokio::test]
    async fn test_fiscal_year_falls_back_to_current_year() {
        let model = TableModel::new(json!({ "fiscal_year": "P&L" }));
        let extractor = MetricExtractor::new(Arc::new(model), &config());
        let ctx = AnalysisContext::new("s1", "Acme Ltd");
        let mut wb = workbook();
        let metrics = extractor.extract_from_workbook(&mut wb, &ctx).await.unwrap();

        assert_eq!(metrics.fiscal_year, current_year_label());
        assert_eq!(metrics.absent_metrics().len(), MetricName::NUMERIC.len());
    }

    #[tokio::test]
    async fn test_progress_events_are_reported() {
        let model = TableModel::new(json!({ "revenue_current_year": "P&L" }))
            .amount(MetricName::RevenueCurrentYear, 150.0, Unit::Lakh);
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let extractor = MetricExtractor::new(Arc::new(model), &config()).with_progress(tx);
        let ctx = AnalysisContext::new("s1", "Acme Ltd");
        let mut wb = workbook();
        let metrics = extractor.extract_from_workbook(&mut wb, &ctx).await.unwrap();
        drop(extractor);

        assert_eq!(metrics.revenue_current_year, Some(1.5));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&ExtractionEvent::Starting { metrics: 11 }));
        assert!(events.contains(&ExtractionEvent::MetricExtracted {
            metric: MetricName::RevenueCurrentYear
        }));
        assert_eq!(events.last(), Some(&ExtractionEvent::Success { absent: 10 }));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_without_partial_set() {
        let model = TableModel {
            delay: Some(Duration::from_secs(30)),
            ..TableModel::new(json!({ "revenue_current_year": "P&L" }))
        };
        let extractor = MetricExtractor::new(Arc::new(model), &config());
        let ctx = AnalysisContext::new("s1", "Acme Ltd");
        let token = ctx.cancellation().clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let mut wb = workbook();
        let result = extractor.extract_from_workbook(&mut wb, &ctx).await;
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
    }

    #[tokio::test]
    async fn test_failed_metric_requests_degrade_only_that_metric() {
        let model = TableModel::new(json!({
            "revenue_current_year": "P&L",
            "revenue_previous_year": "P&L",
            "total_equity": "BS",
            "total_liabilities": "BS"
        }))
        .amount(MetricName::RevenueCurrentYear, 1000.0, Unit::Crore)
        .amount(MetricName::RevenuePreviousYear, 800.0, Unit::Crore)
        .reply(MetricName::TotalEquity, json!({ "value": "twelve", "unit": "crore" }));
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let extractor = MetricExtractor::new(Arc::new(model), &config()).with_progress(tx);
        let ctx = AnalysisContext::new("s1", "Acme Ltd");
        let mut wb = workbook();

        let metrics = extractor.extract_from_workbook(&mut wb, &ctx).await.unwrap();
        drop(extractor);

        assert_eq!(metrics.revenue_current_year, Some(1000.0));
        assert_eq!(metrics.revenue_previous_year, Some(800.0));
        assert_eq!(metrics.total_equity, None);
        assert_eq!(metrics.total_liabilities, None);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        for failed in [MetricName::TotalEquity, MetricName::TotalLiabilities] {
            assert!(events.iter().any(|event| matches!(
                event,
                ExtractionEvent::MetricAbsent { metric, .. } if *metric == failed
            )));
        }
        assert_eq!(events.last(), Some(&ExtractionEvent::Success { absent: 9 }));
    }

    #[test]
    fn test_metric_failures_keep_cancellation() {
        let err = as_metric_failure(MetricName::TotalEquity, AnalysisError::Cancelled);
        assert!(matches!(err, AnalysisError::Cancelled));

        let err = as_metric_failure(
            MetricName::TotalEquity,
            AnalysisError::UpstreamService("timeout".into()),
        );
        assert!(!err.is_fatal());
    }
}
