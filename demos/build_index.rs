use dotenv::dotenv;
use financial_risk_pipeline::{FinancialAnalysisPipeline, GeminiClient, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let pdf_path: PathBuf = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: build_index <annual_report.pdf>"))?
        .into();

    let config = PipelineConfig::from_env()?;
    let client = Arc::new(GeminiClient::from_env(&config)?);
    let pipeline =
        FinancialAnalysisPipeline::with_in_memory_store(client.clone(), client, config)?;

    println!("📄 Indexing {}...", pdf_path.display());
    let index = pipeline.prepare_index(&pdf_path).await?;

    println!(
        "✅ Wrote {} chunks ({}-dim, {}) to {}",
        index.entries.len(),
        index.dimension,
        index.model,
        pipeline.config().index_path.display()
    );
    Ok(())
}
