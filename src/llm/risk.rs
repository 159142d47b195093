use std::sync::Arc;

use log::{info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::RetryPolicy;
use crate::error::{AnalysisError, Result};
use crate::kpi::KpiSet;
use crate::llm::model::{request_structured, LanguageModel};
use crate::llm::prompts::{kpi_prompt, SYSTEM_PROMPT_RISK_ANALYZER};

pub const MAX_RISK_SCORE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskItem {
    #[schemars(description = "Short name of the risk")]
    pub title: String,

    #[schemars(description = "Severity: Low, Medium or High")]
    pub level: RiskLevel,

    #[schemars(description = "What the risk is, citing the KPI name and value that motivated it")]
    pub description: String,

    #[schemars(description = "Concrete action that addresses this risk")]
    pub recommendation: String,
}

/// Board-level risk assessment derived from a [`KpiSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskReport {
    #[schemars(
        description = "Integer from 0 (minimal risk) to 100 (severe risk)",
        range(min = 0, max = 100)
    )]
    pub overall_risk_score: u8,

    #[serde(default)]
    #[schemars(description = "Risks to solvency, liquidity, profitability and leverage")]
    pub financial: Vec<RiskItem>,

    #[serde(default)]
    #[schemars(description = "Risks to operations, cash generation and execution")]
    pub operational: Vec<RiskItem>,

    #[serde(default)]
    #[schemars(description = "Risks from demand, competition and growth trends")]
    pub market: Vec<RiskItem>,

    #[serde(default)]
    #[schemars(description = "Regulatory, reporting and governance risks")]
    pub compliance: Vec<RiskItem>,

    #[schemars(description = "Three to four concise, board-level mitigation recommendations")]
    pub mitigation_recommendations: Vec<String>,
}

impl RiskReport {
    pub fn items(&self) -> impl Iterator<Item = &RiskItem> {
        self.financial
            .iter()
            .chain(&self.operational)
            .chain(&self.market)
            .chain(&self.compliance)
    }

    pub fn highest_level(&self) -> Option<RiskLevel> {
        self.items().map(|item| item.level).max()
    }
}

/// Intermediate shape so an out-of-range score can be clamped rather than
/// rejected.
#[derive(Deserialize, JsonSchema)]
struct RiskReportReply {
    #[schemars(
        description = "Integer from 0 (minimal risk) to 100 (severe risk)",
        range(min = 0, max = 100)
    )]
    overall_risk_score: f64,

    #[serde(default)]
    #[schemars(description = "Risks to solvency, liquidity, profitability and leverage")]
    financial: Vec<RiskItem>,

    #[serde(default)]
    #[schemars(description = "Risks to operations, cash generation and execution")]
    operational: Vec<RiskItem>,

    #[serde(default)]
    #[schemars(description = "Risks from demand, competition and growth trends")]
    market: Vec<RiskItem>,

    #[serde(default)]
    #[schemars(description = "Regulatory, reporting and governance risks")]
    compliance: Vec<RiskItem>,

    #[schemars(description = "Three to four concise, board-level mitigation recommendations")]
    mitigation_recommendations: Vec<String>,
}

impl From<RiskReportReply> for RiskReport {
    fn from(reply: RiskReportReply) -> Self {
        let score = if reply.overall_risk_score.is_finite() {
            reply
                .overall_risk_score
                .round()
                .clamp(0.0, f64::from(MAX_RISK_SCORE)) as u8
        } else {
            MAX_RISK_SCORE
        };
        RiskReport {
            overall_risk_score: score,
            financial: reply.financial,
            operational: reply.operational,
            market: reply.market,
            compliance: reply.compliance,
            mitigation_recommendations: reply.mitigation_recommendations,
        }
    }
}

pub struct RiskAnalyzer {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl RiskAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// Turns KPIs into a categorized risk report. Any failure after retries
    /// is an `UpstreamService` error; no partial report is returned.
    pub async fn analyze(&self, company_name: &str, kpis: &KpiSet) -> Result<RiskReport> {
        let prompt = kpi_prompt(company_name, &kpis.to_pretty_json()?);
        let reply: RiskReportReply = request_structured(
            self.model.as_ref(),
            &self.retry,
            SYSTEM_PROMPT_RISK_ANALYZER,
            &prompt,
        )
        .await
        .map_err(|e| match e {
            AnalysisError::UpstreamService(_) => e,
            other => AnalysisError::UpstreamService(format!("risk analysis failed: {other}")),
        })?;

        if !(0.0..=f64::from(MAX_RISK_SCORE)).contains(&reply.overall_risk_score) {
            warn!(
                "Risk score {} outside 0-{}; clamping",
                reply.overall_risk_score, MAX_RISK_SCORE
            );
        }
        let report = RiskReport::from(reply);

        let mitigations = report.mitigation_recommendations.len();
        if !(3..=4).contains(&mitigations) {
            warn!("Risk report has {mitigations} mitigation recommendations, expected 3 to 4");
        }
        if report.items().next().is_none() {
            warn!("Risk report for '{company_name}' lists no risk items");
        }

        info!(
            "Risk report for '{}': score {}, {} item(s)",
            company_name,
            report.overall_risk_score,
            report.items().count()
        );
        Ok(report)
    }
}
