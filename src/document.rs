use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use log::debug;

use crate::error::{AnalysisError, Result};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

const SPREADSHEET_MIME_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/vnd.ms-excel.sheet.macroenabled.12",
    "application/vnd.ms-excel.sheet.binary.macroenabled.12",
    "application/vnd.oasis.opendocument.spreadsheet",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Workbook,
    Csv,
}

impl DocumentKind {
    /// Classifies a document by MIME type, falling back to the extension.
    /// Anything that is not a PDF or a spreadsheet is rejected.
    pub fn detect(path: &Path) -> Result<Self> {
        let mime = mime_guess::from_path(path)
            .first_raw()
            .map(|m| m.to_ascii_lowercase());

        match mime.as_deref() {
            Some("application/pdf") => return Ok(DocumentKind::Pdf),
            Some("text/csv") => return Ok(DocumentKind::Csv),
            Some(m) if SPREADSHEET_MIME_TYPES.contains(&m) => return Ok(DocumentKind::Workbook),
            _ => {}
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
            Ok(DocumentKind::Workbook)
        } else {
            Err(AnalysisError::UnsupportedFormat(format!(
                "{} (expected a PDF or a spreadsheet)",
                path.display()
            )))
        }
    }

    pub fn is_tabular(self) -> bool {
        !matches!(self, DocumentKind::Pdf)
    }
}

/// Extracts text from a PDF, one string per page.
pub fn load_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let pages = pdf_extract::extract_text_by_pages(path).map_err(|e| {
        AnalysisError::DocumentLoad {
            path: path.to_path_buf(),
            reason: format!("pdf extract failed: {e}"),
        }
    })?;
    debug!("Extracted {} pages from {}", pages.len(), path.display());
    Ok(pages)
}

/// Read access to a tabular source document.
pub trait Workbook: Send {
    fn list_sheets(&self) -> Vec<String>;

    /// Rows of the named sheet, each cell rendered as trimmed text.
    fn read_sheet(&mut self, name: &str) -> Result<Vec<Vec<String>>>;
}

/// Opens the workbook or CSV file at `path`.
pub fn open_workbook(path: &Path) -> Result<Box<dyn Workbook>> {
    match DocumentKind::detect(path)? {
        DocumentKind::Workbook => Ok(Box::new(CalamineWorkbook::open(path)?)),
        DocumentKind::Csv => Ok(Box::new(CsvWorkbook::open(path)?)),
        DocumentKind::Pdf => Err(AnalysisError::UnsupportedFormat(format!(
            "{} is a PDF, not a workbook",
            path.display()
        ))),
    }
}

/// Excel and OpenDocument workbooks.
pub struct CalamineWorkbook {
    path: PathBuf,
    sheets: Sheets<std::io::BufReader<std::fs::File>>,
}

impl CalamineWorkbook {
    pub fn open(path: &Path) -> Result<Self> {
        let sheets = open_workbook_auto(path).map_err(|e| AnalysisError::DocumentLoad {
            path: path.to_path_buf(),
            reason: format!("unable to open workbook: {e}"),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }
}

impl Workbook for CalamineWorkbook {
    fn list_sheets(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    fn read_sheet(&mut self, name: &str) -> Result<Vec<Vec<String>>> {
        let range = self
            .sheets
            .worksheet_range(name)
            .map_err(|e| AnalysisError::DocumentLoad {
                path: self.path.clone(),
                reason: format!("unable to read sheet '{name}': {e}"),
            })?;

        Ok(range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect())
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        _ => cell.to_string().trim().to_string(),
    }
}

/// A CSV file exposed as a single-sheet workbook named after the file stem.
pub struct CsvWorkbook {
    sheet_name: String,
    rows: Vec<Vec<String>>,
}

impl CsvWorkbook {
    pub fn open(path: &Path) -> Result<Self> {
        let load_err = |e: csv::Error| AnalysisError::DocumentLoad {
            path: path.to_path_buf(),
            reason: format!("unable to read csv: {e}"),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(load_err)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(load_err)?;
            let values: Vec<String> = record.iter().map(|v| v.trim().to_string()).collect();
            if values.iter().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(values);
        }

        let sheet_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Sheet1")
            .to_string();

        Ok(Self { sheet_name, rows })
    }
}

impl Workbook for CsvWorkbook {
    fn list_sheets(&self) -> Vec<String> {
        vec![self.sheet_name.clone()]
    }

    fn read_sheet(&mut self, name: &str) -> Result<Vec<Vec<String>>> {
        if name == self.sheet_name {
            Ok(self.rows.clone())
        } else {
            Err(AnalysisError::DocumentLoad {
                path: PathBuf::from(&self.sheet_name),
                reason: format!("no sheet named '{name}'"),
            })
        }
    }
}

/// Workbook held in memory, keeping sheet order.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    order: Vec<String>,
    sheets: BTreeMap<String, Vec<Vec<String>>>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet<R, C>(mut self, name: &str, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect::<Vec<String>>())
            .collect();
        if !self.sheets.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.sheets.insert(name.to_string(), rows);
        self
    }
}

impl Workbook for MemoryWorkbook {
    fn list_sheets(&self) -> Vec<String> {
        self.order.clone()
    }

    fn read_sheet(&mut self, name: &str) -> Result<Vec<Vec<String>>> {
        self.sheets
            .get(name)
            .cloned()
            .ok_or_else(|| AnalysisError::DocumentLoad {
                path: PathBuf::from("<memory>"),
                reason: format!("no sheet named '{name}'"),
            })
    }
}

/// Renders sheet rows as CSV text for use as model context.
pub fn rows_to_csv(rows: &[Vec<String>]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| AnalysisError::IoError(e.into()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AnalysisError::IoError(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
