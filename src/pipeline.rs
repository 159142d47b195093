use std::path::Path;
use std::sync::Arc;

use log::info;
use serde::Serialize;
use tokio::sync::mpsc::Sender;

use crate::config::PipelineConfig;
use crate::document::{load_pdf_pages, open_workbook, DocumentKind};
use crate::error::{AnalysisError, Result};
use crate::kpi::{compute_kpis, KpiSet};
use crate::llm::{
    DocumentAssistant, ExtractionEvent, LanguageModel, MetricExtractor, NarrativeGenerator,
    RiskAnalyzer, RiskReport,
};
use crate::retrieval::{Embedder, RetrievalEngine, SemanticIndex, TextSplitter};
use crate::schema::MetricSet;
use crate::session::{AnalysisContext, InMemoryKpiStore, KpiStore};

/// Output of the extraction half: the normalized metrics and their KPIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentAnalysis {
    pub metrics: MetricSet,
    pub kpis: KpiSet,
}

/// Output of the reporting half, produced from stored KPIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub risk_report: RiskReport,
    pub narrative: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub metrics: MetricSet,
    pub kpis: KpiSet,
    pub risk_report: RiskReport,
    pub narrative: String,
}

/// Document in, risk report and narrative out.
///
/// The two halves can run in separate requests: [`analyze_document`] stores
/// the KPIs under the session id and [`assess`] picks them up later without
/// re-running extraction.
///
/// [`analyze_document`]: FinancialAnalysisPipeline::analyze_document
/// [`assess`]: FinancialAnalysisPipeline::assess
pub struct FinancialAnalysisPipeline {
    model: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KpiStore>,
    config: PipelineConfig,
    progress: Option<Sender<ExtractionEvent>>,
}

impl FinancialAnalysisPipeline {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn KpiStore>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            embedder,
            store,
            config,
            progress: None,
        })
    }

    pub fn with_in_memory_store(
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        config: PipelineConfig,
    ) -> Result<Self> {
        Self::new(model, embedder, Arc::new(InMemoryKpiStore::new()), config)
    }

    pub fn with_progress(mut self, progress: Sender<ExtractionEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KpiStore> {
        &self.store
    }

    /// Builds and persists the semantic index for a PDF at the configured
    /// `index_path`.
    pub async fn prepare_index(&self, pdf_path: &Path) -> Result<SemanticIndex> {
        if DocumentKind::detect(pdf_path)? != DocumentKind::Pdf {
            return Err(AnalysisError::UnsupportedFormat(format!(
                "{} is not a PDF; only PDFs need an index",
                pdf_path.display()
            )));
        }

        let path = pdf_path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || load_pdf_pages(&path))
            .await
            .map_err(|e| AnalysisError::DocumentLoad {
                path: pdf_path.to_path_buf(),
                reason: format!("pdf load task failed: {e}"),
            })??;

        let splitter = TextSplitter::from_config(&self.config);
        let index = SemanticIndex::build(
            &pages,
            &splitter,
            self.embedder.as_ref(),
            &self.config.retry,
        )
        .await?;
        index.save(&self.config.index_path)?;

        info!(
            "Indexed {} ({} pages, {} chunks)",
            pdf_path.display(),
            pages.len(),
            index.entries.len()
        );
        Ok(index)
    }

    /// Runs the metric extractor in the mode matching the document type.
    pub async fn extract_metrics(
        &self,
        document: &Path,
        ctx: &AnalysisContext,
    ) -> Result<MetricSet> {
        let kind = DocumentKind::detect(document)?;
        let extractor = self.extractor();

        if !kind.is_tabular() {
            let retrieval = self.retrieval().await?;
            return extractor.extract_from_text(&retrieval, ctx).await;
        }

        let path = document.to_path_buf();
        let mut workbook = tokio::task::spawn_blocking(move || open_workbook(&path))
            .await
            .map_err(|e| AnalysisError::DocumentLoad {
                path: document.to_path_buf(),
                reason: format!("workbook load task failed: {e}"),
            })??;
        extractor
            .extract_from_workbook(workbook.as_mut(), ctx)
            .await
    }

    /// Extracts metrics, computes KPIs and stores them for the session.
    pub async fn analyze_document(
        &self,
        document: &Path,
        ctx: &AnalysisContext,
    ) -> Result<DocumentAnalysis> {
        info!(
            "Analyzing {} for session '{}'",
            document.display(),
            ctx.session_id
        );
        let metrics = self.extract_metrics(document, ctx).await?;
        let kpis = compute_kpis(&metrics);
        self.store.put(&ctx.session_id, kpis.clone());
        info!(
            "Stored KPIs for session '{}' ({} absent metric(s))",
            ctx.session_id,
            metrics.absent_metrics().len()
        );
        Ok(DocumentAnalysis { metrics, kpis })
    }

    /// Risk report and narrative for the session's stored KPIs, generated
    /// concurrently.
    pub async fn assess(&self, ctx: &AnalysisContext) -> Result<Assessment> {
        let kpis = self
            .store
            .get(&ctx.session_id)
            .ok_or_else(|| AnalysisError::SessionNotFound(ctx.session_id.clone()))?;

        let analyzer = RiskAnalyzer::new(self.model.clone(), self.config.retry.clone());
        let generator = NarrativeGenerator::new(self.model.clone(), self.config.retry.clone());

        let (risk_report, narrative) = tokio::join!(
            analyzer.analyze(&ctx.company_name, &kpis),
            generator.summarize(&ctx.company_name, &kpis)
        );

        Ok(Assessment {
            risk_report: risk_report?,
            narrative: narrative?,
        })
    }

    pub async fn run(&self, document: &Path, ctx: &AnalysisContext) -> Result<PipelineReport> {
        let analysis = self.analyze_document(document, ctx).await?;
        let assessment = self.assess(ctx).await?;
        Ok(PipelineReport {
            metrics: analysis.metrics,
            kpis: analysis.kpis,
            risk_report: assessment.risk_report,
            narrative: assessment.narrative,
        })
    }

    /// Free-form question about the indexed PDF, using the session's KPIs
    /// when they exist.
    pub async fn ask(&self, question: &str, ctx: &AnalysisContext) -> Result<String> {
        let retrieval = self.retrieval().await?;
        let kpis = self.store.get(&ctx.session_id);
        DocumentAssistant::new(self.model.clone(), self.config.retry.clone())
            .ask(question, &retrieval, kpis.as_ref())
            .await
    }

    async fn retrieval(&self) -> Result<RetrievalEngine> {
        RetrievalEngine::open(&self.config.index_path, self.embedder.clone(), &self.config).await
    }

    fn extractor(&self) -> MetricExtractor {
        let extractor = MetricExtractor::new(self.model.clone(), &self.config);
        match &self.progress {
            Some(tx) => extractor.with_progress(tx.clone()),
            None => extractor,
        }
    }
}
