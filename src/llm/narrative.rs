use std::sync::Arc;

use log::{info, warn};

use crate::config::RetryPolicy;
use crate::error::{AnalysisError, Result};
use crate::kpi::KpiSet;
use crate::llm::model::{request_text, LanguageModel};
use crate::llm::prompts::{kpi_prompt, SYSTEM_PROMPT_NARRATIVE};

/// Required level-2 headings, in order.
pub const NARRATIVE_SECTIONS: [&str; 3] = [
    "Financial Summary",
    "Key Risks & Opportunities",
    "Strategic Recommendations",
];

/// Currency symbols that count only when an amount follows them.
const CURRENCY_SYMBOLS: [&str; 3] = ["$", "€", "£"];

/// Whole words naming a currency or scale other than ₹ crore.
const NON_CRORE_WORDS: [&str; 5] = ["USD", "EUR", "GBP", "million", "billion"];

pub struct NarrativeGenerator {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl NarrativeGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// Markdown briefing with the three [`NARRATIVE_SECTIONS`].
    pub async fn summarize(&self, company_name: &str, kpis: &KpiSet) -> Result<String> {
        let prompt = kpi_prompt(company_name, &kpis.to_pretty_json()?);
        let text = request_text(
            self.model.as_ref(),
            &self.retry,
            SYSTEM_PROMPT_NARRATIVE,
            &prompt,
        )
        .await
        .map_err(|e| match e {
            AnalysisError::UpstreamService(_) => e,
            other => AnalysisError::UpstreamService(format!("narrative generation failed: {other}")),
        })?;

        let check = NarrativeCheck::of(&text);
        if !check.missing.is_empty() {
            warn!("Narrative is missing sections: {:?}", check.missing);
        } else if !check.ordered {
            warn!("Narrative sections are out of order");
        }
        if !check.non_crore_units.is_empty() {
            warn!(
                "Narrative mentions non-crore units: {:?}",
                check.non_crore_units
            );
        }

        info!("Narrative for '{}': {} chars", company_name, text.len());
        Ok(text.trim().to_string())
    }
}

/// Structural check of a generated narrative. Informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeCheck {
    pub missing: Vec<&'static str>,
    pub ordered: bool,
    /// Currency symbols, codes or scale words other than ₹ crore.
    pub non_crore_units: Vec<&'static str>,
}

impl NarrativeCheck {
    pub fn of(markdown: &str) -> Self {
        let headings: Vec<String> = markdown
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("##") && !line.starts_with("###"))
            .map(|line| line.trim_start_matches('#').trim().to_lowercase())
            .collect();

        let positions: Vec<Option<usize>> = NARRATIVE_SECTIONS
            .iter()
            .map(|section| {
                let wanted = section.to_lowercase();
                headings.iter().position(|h| h.starts_with(&wanted))
            })
            .collect();

        let missing = NARRATIVE_SECTIONS
            .iter()
            .zip(&positions)
            .filter(|(_, pos)| pos.is_none())
            .map(|(section, _)| *section)
            .collect();

        let found: Vec<usize> = positions.iter().flatten().copied().collect();
        let ordered = found.windows(2).all(|w| w[0] < w[1]);

        let symbols = CURRENCY_SYMBOLS
            .iter()
            .copied()
            .filter(|symbol| precedes_amount(markdown, symbol));
        let words = NON_CRORE_WORDS
            .iter()
            .copied()
            .filter(|word| contains_word(markdown, word));
        let non_crore_units = symbols.chain(words).collect();

        Self {
            missing,
            ordered,
            non_crore_units,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.missing.is_empty() && self.ordered && self.non_crore_units.is_empty()
    }
}

/// `$12` or `$ 12`, but not `$x$` math or a stray dollar sign.
fn precedes_amount(text: &str, symbol: &str) -> bool {
    text.match_indices(symbol).any(|(at, _)| {
        text[at + symbol.len()..]
            .trim_start_matches(' ')
            .starts_with(|c: char| c.is_ascii_digit())
    })
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::compute_kpis;
    use crate::schema::MetricSet;
    use async_trait::async_trait;
    use serde_json::Value;

    const GOOD: &str = "## Financial Summary\nRevenue grew 25% to ₹1,000 crore.\n\n\
                        ## Key Risks & Opportunities\nLeverage is modest.\n\n\
                        ## Strategic Recommendations\nKeep investing.\n";

    struct TextModel(&'static str);

    #[async_trait]
    impl LanguageModel for TextModel {
        async fn extract_structured(&self, _: &str, _: &str, _: &Value) -> Result<Value> {
            unreachable!()
        }

        async fn generate_text(&self, system: &str, user: &str) -> Result<String> {
            assert_eq!(system, SYSTEM_PROMPT_NARRATIVE);
            assert!(user.contains("\"runway_months\": \"infinite\""));
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "text"
        }
    }

    #[test]
    fn test_check_accepts_three_ordered_sections() {
        let check = NarrativeCheck::of(GOOD);
        assert!(check.is_well_formed(), "{check:?}");
    }

    #[test]
    fn test_check_flags_missing_and_misordered() {
        let check = NarrativeCheck::of("## Strategic Recommendations\nx\n## Financial Summary\ny");
        assert_eq!(check.missing, vec!["Key Risks & Opportunities"]);
        assert!(!check.ordered);

        let check = NarrativeCheck::of("## Financial Summary\nRevenue of $12 million");
        assert_eq!(check.non_crore_units, vec!["$", "million"]);
    }

    #[test]
    fn test_check_ignores_dollar_signs_without_amounts() {
        let check = NarrativeCheck::of(
            "## Financial Summary\nGrowth $g$ exceeds the $\\beta$ term on ₹1,000 crore.\n\
             A millionaire founder holds 10%.",
        );
        assert!(check.non_crore_units.is_empty(), "{check:?}");

        let check = NarrativeCheck::of("Cash of € 40 and EUR exposure");
        assert_eq!(check.non_crore_units, vec!["€", "EUR"]);
    }

    #[tokio::test]
    async fn test_summarize_returns_trimmed_markdown() {
        let generator = NarrativeGenerator::new(Arc::new(TextModel(GOOD)), RetryPolicy::none());
        let kpis = compute_kpis(&MetricSet::new("Acme", "FY24"));
        let text = generator.summarize("Acme", &kpis).await.unwrap();
        assert!(text.starts_with("## Financial Summary"));
        assert!(text.ends_with("Keep investing."));
    }

    #[tokio::test]
    async fn test_empty_narrative_is_upstream_failure() {
        let generator = NarrativeGenerator::new(Arc::new(TextModel("   ")), RetryPolicy::none());
        let kpis = compute_kpis(&MetricSet::new("Acme", "FY24"));
        let result = generator.summarize("Acme", &kpis).await;
        assert!(matches!(result, Err(AnalysisError::UpstreamService(_))));
    }
}
