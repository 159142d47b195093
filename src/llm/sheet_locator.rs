use std::sync::Arc;

use log::{info, warn};

use crate::config::RetryPolicy;
use crate::error::Result;
use crate::llm::model::{request_structured, LanguageModel};
use crate::llm::prompts::{sheet_locator_prompt, SYSTEM_PROMPT_SHEET_LOCATOR};
use crate::schema::{MetricName, SheetMap};

/// Classifies workbook sheets: which sheet holds which metric.
pub struct SheetLocator {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl SheetLocator {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// Builds the [`SheetMap`] for a workbook from its sheet names alone.
    ///
    /// Proposals naming a sheet that does not exist are dropped, so every
    /// assigned sheet can be read afterwards. An upstream failure is returned
    /// as-is: without a map no spreadsheet metric can be extracted.
    pub async fn locate(&self, sheet_names: &[String]) -> Result<SheetMap> {
        if sheet_names.is_empty() {
            warn!("Workbook has no sheets; every metric will be absent");
            return Ok(SheetMap::default());
        }

        let prompt = sheet_locator_prompt(sheet_names, &metric_guide());
        let proposed: SheetMap = request_structured(
            self.model.as_ref(),
            &self.retry,
            SYSTEM_PROMPT_SHEET_LOCATOR,
            &prompt,
        )
        .await?;

        for metric in MetricName::EXTRACTED {
            if let Some(sheet) = proposed.sheet_for(metric) {
                if !sheet_names
                    .iter()
                    .any(|name| name.trim().eq_ignore_ascii_case(sheet.trim()))
                {
                    warn!("Sheet locator proposed unknown sheet '{sheet}' for {metric}");
                }
            }
        }

        let map = proposed.restricted_to(sheet_names);
        info!(
            "Located {} sheet(s) for {} metric(s); unmapped: {:?}",
            map.assigned_sheets().len(),
            MetricName::EXTRACTED.len() - map.unmapped().len(),
            map.unmapped()
        );
        Ok(map)
    }
}

fn metric_guide() -> String {
    MetricName::EXTRACTED
        .iter()
        .map(|m| format!("- {} ({}): {}", m, m.statement(), m.question()))
        .collect::<Vec<_>>()
        .join("\n")
}
