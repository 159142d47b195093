use dotenv::dotenv;
use financial_risk_pipeline::{
    AnalysisContext, DocumentKind, ExtractionEvent, FinancialAnalysisPipeline, GeminiClient,
    PipelineConfig, SemanticIndex,
};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    let mut args = std::env::args().skip(1);
    let document: PathBuf = args
        .next()
        .ok_or("usage: analyze_report <document> [company name]")?
        .into();
    let company = args.next().unwrap_or_else(|| "Demo Company".to_string());

    let config = PipelineConfig::from_env()?;
    let client = Arc::new(GeminiClient::from_env(&config)?);

    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let pipeline =
        FinancialAnalysisPipeline::with_in_memory_store(client.clone(), client, config)?
            .with_progress(tx);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ExtractionEvent::Starting { metrics } => println!("🚀 Extracting {metrics} metrics"),
                ExtractionEvent::LocatingSheets { sheets } => {
                    println!("🗂️  Classifying {sheets} sheets")
                }
                ExtractionEvent::MetricExtracted { metric } => println!("   ✓ {metric}"),
                ExtractionEvent::MetricAbsent { metric, reason } => {
                    println!("   ✗ {metric}: {reason}")
                }
                ExtractionEvent::Success { absent } => println!("✅ Done ({absent} absent)"),
                ExtractionEvent::Failed { reason } => println!("❌ {reason}"),
                ExtractionEvent::SheetsLocated { .. } => {}
            }
        }
    });

    let is_pdf = DocumentKind::detect(&document)? == DocumentKind::Pdf;
    if is_pdf && !SemanticIndex::exists(&pipeline.config().index_path) {
        println!("📄 No index yet, building one...");
        pipeline.prepare_index(&document).await?;
    }

    let ctx = AnalysisContext::new("demo", company);
    let report = pipeline.run(&document, &ctx).await?;

    println!("\n📊 Metrics (₹ crore)\n{}", serde_json::to_string_pretty(&report.metrics)?);
    println!("\n📈 KPIs\n{}", report.kpis.to_pretty_json()?);
    println!(
        "\n⚠️  Risk score: {}/100\n{}",
        report.risk_report.overall_risk_score,
        serde_json::to_string_pretty(&report.risk_report)?
    );
    println!("\n📝 Narrative\n{}", report.narrative);

    if !is_pdf {
        return Ok(());
    }

    println!("\n🤖 Ask questions about the report (type 'quit' to exit).");
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let question = input.trim();

        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("quit") || question.eq_ignore_ascii_case("exit") {
            break;
        }

        match pipeline.ask(question, &ctx).await {
            Ok(answer) => println!("\n{answer}\n"),
            Err(e) => eprintln!("❌ {e}"),
        }
    }
    Ok(())
}
