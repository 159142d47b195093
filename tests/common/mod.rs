#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use financial_risk_pipeline::llm::prompts::*;
use financial_risk_pipeline::*;
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Language model double that answers from a fixed script.
///
/// Metric requests are matched by the metric's question appearing in the
/// prompt; unscripted metrics get a `null` value.
pub struct ScriptedModel {
    pub sheet_map: Value,
    pub amounts: Vec<(MetricName, f64, Unit)>,
    pub fiscal_year: Option<String>,
    pub risk_report: Value,
    pub narrative: String,
    pub answer: String,
    /// Calls that fail with a transient upstream error before any succeeds.
    pub transient_failures: AtomicU32,
    pub calls: AtomicU32,
    pub prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self {
            sheet_map: json!({}),
            amounts: Vec::new(),
            fiscal_year: None,
            risk_report: default_risk_report(),
            narrative: default_narrative().to_string(),
            answer: "The document does not state it.".to_string(),
            transient_failures: AtomicU32::new(0),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedModel {
    pub fn amount(mut self, metric: MetricName, value: f64, unit: Unit) -> Self {
        self.amounts.push((metric, value, unit));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_transient_failure(&self) -> bool {
        self.transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn record(&self, prompt: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if self.take_transient_failure() {
            return Err(AnalysisError::UpstreamService("429 rate limited".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn extract_structured(&self, system: &str, user: &str, _schema: &Value) -> Result<Value> {
        self.record(user)?;
        if system == SYSTEM_PROMPT_SHEET_LOCATOR {
            return Ok(self.sheet_map.clone());
        }
        if system == SYSTEM_PROMPT_RISK_ANALYZER {
            return Ok(self.risk_report.clone());
        }
        let reply = self
            .amounts
            .iter()
            .find(|(metric, _, _)| user.contains(metric.question()))
            .map(|(_, value, unit)| json!({ "value": value, "unit": unit }))
            .unwrap_or_else(|| json!({ "value": null, "unit": "none" }));
        Ok(reply)
    }

    async fn generate_text(&self, system: &str, user: &str) -> Result<String> {
        self.record(user)?;
        if system == SYSTEM_PROMPT_SHORT_ANSWER {
            return Ok(self.fiscal_year.clone().unwrap_or_else(|| "UNKNOWN".into()));
        }
        if system == SYSTEM_PROMPT_NARRATIVE {
            return Ok(self.narrative.clone());
        }
        Ok(self.answer.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Bag-of-words embedder over hashed lowercase tokens.
pub struct HashEmbedder {
    pub dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimension: 64 }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimension];
                for token in text
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    let mut hasher = DefaultHasher::new();
                    token.hash(&mut hasher);
                    vector[(hasher.finish() as usize) % self.dimension] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "hash-bow"
    }
}

pub fn default_risk_report() -> Value {
    json!({
        "overall_risk_score": 22,
        "financial": [{
            "title": "Moderate leverage",
            "level": "Low",
            "description": "debt_to_equity_ratio of 0.71 is comfortable",
            "recommendation": "Keep borrowing below equity"
        }],
        "operational": [],
        "market": [{
            "title": "Growth concentration",
            "level": "Medium",
            "description": "revenue_growth_percent of 25.0 may not persist",
            "recommendation": "Diversify revenue streams"
        }],
        "compliance": [],
        "mitigation_recommendations": [
            "Maintain liquidity buffers",
            "Review capital allocation quarterly",
            "Hedge key input costs"
        ]
    })
}

pub fn default_narrative() -> &'static str {
    "## Financial Summary\nRevenue grew 25% to ₹1,000 crore.\n\n\
     ## Key Risks & Opportunities\nLeverage is modest at 0.71.\n\n\
     ## Strategic Recommendations\nInvest surplus operating cash of ₹20 crore a month."
}

/// The ten numeric figures of the reference scenario, in mixed units.
pub fn reference_amounts(model: ScriptedModel) -> ScriptedModel {
    model
        .amount(MetricName::RevenueCurrentYear, 1000.0, Unit::Crore)
        .amount(MetricName::RevenuePreviousYear, 80_000.0, Unit::Lakh)
        .amount(MetricName::ProfitAfterTaxCurrentYear, 100.0, Unit::Crore)
        .amount(MetricName::ProfitAfterTaxPreviousYear, 6_000.0, Unit::Lakh)
        .amount(MetricName::TotalLiabilities, 5_000_000_000.0, Unit::None)
        .amount(MetricName::CashReserves, 20_000_000.0, Unit::Thousand)
        .amount(MetricName::NetCashFromOperations, 240.0, Unit::Crore)
        .amount(MetricName::TotalCurrentAssets, 600.0, Unit::Crore)
        .amount(MetricName::TotalCurrentLiabilities, 300.0, Unit::Crore)
        .amount(MetricName::TotalEquity, 700.0, Unit::Crore)
}

pub fn test_config(index_path: std::path::PathBuf) -> PipelineConfig {
    PipelineConfig {
        index_path,
        retry: RetryPolicy::none(),
        ..PipelineConfig::default()
    }
}
