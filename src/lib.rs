//! # Financial Risk Pipeline
//!
//! A library for turning a company's financial document (PDF annual report or
//! spreadsheet workbook) into normalized metrics, derived KPIs, a categorized
//! risk report and a board-level narrative.
//!
//! ## Core Concepts
//!
//! - **MetricSet**: The fixed 11-field record extracted from a document, every amount in crore
//! - **Unit Normalization**: Lakh, thousand and plain-rupee figures are rescaled to crore
//! - **KpiSet**: Eight ratios derived from a MetricSet; undefined ratios are `None`, never errors
//! - **SheetMap**: For workbooks, which sheet holds which metric
//! - **LanguageModel**: The pluggable capability that reads text; the pipeline never parses prose itself
//!
//! ## Example
//!
//! ```rust
//! use financial_risk_pipeline::*;
//!
//! let mut metrics = MetricSet::new("Acme Ltd", "FY 2023-24");
//! metrics.revenue_current_year = Some(1000.0);
//! metrics.revenue_previous_year = Some(800.0);
//! metrics.net_cash_from_operations = Some(-120.0);
//! metrics.cash_reserves = Some(50.0);
//!
//! let kpis = compute_kpis(&metrics);
//! assert_eq!(kpis.revenue_growth_percent, Some(25.0));
//! assert_eq!(kpis.monthly_burn_rate, 10.0);
//! assert_eq!(kpis.runway_months, Runway::Months(5.0));
//! assert_eq!(kpis.debt_to_equity_ratio, None);
//! ```
//!
//! With the `gemini` feature, `GeminiClient` provides both the language model
//! and the embedder for [`FinancialAnalysisPipeline`].

pub mod config;
pub mod document;
pub mod error;
pub mod kpi;
pub mod llm;
pub mod normalizer;
pub mod pipeline;
pub mod retrieval;
pub mod schema;
pub mod session;
pub mod utils;

pub use config::{PipelineConfig, RetryPolicy};
pub use document::{
    load_pdf_pages, open_workbook, rows_to_csv, CalamineWorkbook, CsvWorkbook, DocumentKind,
    MemoryWorkbook, Workbook,
};
pub use error::{AnalysisError, Result};
pub use kpi::{compute_kpis, KpiSet, Runway};
pub use llm::*;
pub use normalizer::{normalize, normalize_present};
pub use pipeline::*;
pub use retrieval::{Embedder, IndexEntry, Passage, RetrievalEngine, SemanticIndex, TextSplitter};
pub use schema::*;
pub use session::{AnalysisContext, InMemoryKpiStore, KpiStore};
pub use utils::*;
