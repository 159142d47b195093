use std::sync::Arc;

use log::debug;

use crate::config::RetryPolicy;
use crate::error::Result;
use crate::kpi::KpiSet;
use crate::llm::model::{request_text, LanguageModel};
use crate::llm::prompts::{assistant_prompt, SYSTEM_PROMPT_ASSISTANT};
use crate::retrieval::RetrievalEngine;

pub struct DocumentAssistant {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl DocumentAssistant {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// Ask a free-form question about an indexed document.
    ///
    /// # Arguments
    /// * `question` - The user's question
    /// * `retrieval` - Engine over the document's semantic index
    /// * `kpis` - KPIs computed earlier in the session, if any
    pub async fn ask(
        &self,
        question: &str,
        retrieval: &RetrievalEngine,
        kpis: Option<&KpiSet>,
    ) -> Result<String> {
        let context = retrieval.context_for(question).await?;
        let kpis_json = kpis.map(KpiSet::to_pretty_json).transpose()?;
        debug!(
            "Answering question with {} chars of context (kpis: {})",
            context.len(),
            kpis_json.is_some()
        );

        let answer = request_text(
            self.model.as_ref(),
            &self.retry,
            SYSTEM_PROMPT_ASSISTANT,
            &assistant_prompt(question, &context, kpis_json.as_deref()),
        )
        .await?;
        Ok(answer.trim().to_string())
    }
}
