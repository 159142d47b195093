use std::collections::BTreeSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The closed set of fields in a [`MetricSet`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    CompanyName,
    FiscalYear,
    RevenueCurrentYear,
    RevenuePreviousYear,
    ProfitAfterTaxCurrentYear,
    ProfitAfterTaxPreviousYear,
    TotalLiabilities,
    CashReserves,
    NetCashFromOperations,
    TotalCurrentAssets,
    TotalCurrentLiabilities,
    TotalEquity,
}

impl MetricName {
    /// The metrics read from the source document. `CompanyName` is supplied by
    /// the caller and never extracted.
    pub const EXTRACTED: [MetricName; 11] = [
        MetricName::FiscalYear,
        MetricName::RevenueCurrentYear,
        MetricName::RevenuePreviousYear,
        MetricName::ProfitAfterTaxCurrentYear,
        MetricName::ProfitAfterTaxPreviousYear,
        MetricName::TotalLiabilities,
        MetricName::CashReserves,
        MetricName::NetCashFromOperations,
        MetricName::TotalCurrentAssets,
        MetricName::TotalCurrentLiabilities,
        MetricName::TotalEquity,
    ];

    pub const NUMERIC: [MetricName; 10] = [
        MetricName::RevenueCurrentYear,
        MetricName::RevenuePreviousYear,
        MetricName::ProfitAfterTaxCurrentYear,
        MetricName::ProfitAfterTaxPreviousYear,
        MetricName::TotalLiabilities,
        MetricName::CashReserves,
        MetricName::NetCashFromOperations,
        MetricName::TotalCurrentAssets,
        MetricName::TotalCurrentLiabilities,
        MetricName::TotalEquity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricName::CompanyName => "company_name",
            MetricName::FiscalYear => "fiscal_year",
            MetricName::RevenueCurrentYear => "revenue_current_year",
            MetricName::RevenuePreviousYear => "revenue_previous_year",
            MetricName::ProfitAfterTaxCurrentYear => "profit_after_tax_current_year",
            MetricName::ProfitAfterTaxPreviousYear => "profit_after_tax_previous_year",
            MetricName::TotalLiabilities => "total_liabilities",
            MetricName::CashReserves => "cash_reserves",
            MetricName::NetCashFromOperations => "net_cash_from_operations",
            MetricName::TotalCurrentAssets => "total_current_assets",
            MetricName::TotalCurrentLiabilities => "total_current_liabilities",
            MetricName::TotalEquity => "total_equity",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, MetricName::CompanyName | MetricName::FiscalYear)
    }

    /// Retrieval query and extraction question for this metric.
    pub fn question(self) -> &'static str {
        match self {
            MetricName::CompanyName => "What is the name of the company that published this report?",
            MetricName::FiscalYear => {
                "What is the fiscal year mentioned on the cover of the Annual Report?"
            }
            MetricName::RevenueCurrentYear => {
                "What is the 'Revenue from operations' for the current fiscal year?"
            }
            MetricName::RevenuePreviousYear => {
                "What is the 'Revenue from operations' for the previous fiscal year?"
            }
            MetricName::ProfitAfterTaxCurrentYear => {
                "What is the 'Profit / (loss) for the year' for the current fiscal year?"
            }
            MetricName::ProfitAfterTaxPreviousYear => {
                "What is the 'Profit / (loss) for the year' for the previous fiscal year?"
            }
            MetricName::TotalLiabilities => {
                "What is the value for 'Total liabilities' on the CONSOLIDATED Balance Sheet for the current year?"
            }
            MetricName::CashReserves => {
                "What is the CONSOLIDATED cash and cash equivalents balance as of the end of the current fiscal year?"
            }
            MetricName::NetCashFromOperations => {
                "What is the value for 'Net cash generated from / (used in) operating activities' for the current fiscal year?"
            }
            MetricName::TotalCurrentAssets => {
                "What is the value for 'Total current assets' on the Consolidated Balance Sheet for the current fiscal year?"
            }
            MetricName::TotalCurrentLiabilities => {
                "What is the value for 'Total current liabilities' on the Consolidated Balance Sheet for the current fiscal year?"
            }
            MetricName::TotalEquity => {
                "What is the value for 'Total equity' on the Consolidated Balance Sheet for the current fiscal year?"
            }
        }
    }

    /// Short statement category, used when classifying workbook sheets.
    pub fn statement(self) -> &'static str {
        match self {
            MetricName::CompanyName | MetricName::FiscalYear => "Cover / General Information",
            MetricName::RevenueCurrentYear
            | MetricName::RevenuePreviousYear
            | MetricName::ProfitAfterTaxCurrentYear
            | MetricName::ProfitAfterTaxPreviousYear => "Profit & Loss Statement",
            MetricName::TotalLiabilities
            | MetricName::TotalCurrentAssets
            | MetricName::TotalCurrentLiabilities
            | MetricName::TotalEquity => "Balance Sheet",
            MetricName::CashReserves | MetricName::NetCashFromOperations => "Cash Flow Statement",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Crore,
    Lakh,
    Thousand,
    #[default]
    None,
}

/// A single value as read from the document, before unit normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawExtraction {
    #[schemars(
        description = "The numerical value extracted from the text, ignoring commas and currency symbols. Amounts in parentheses like (971) or described as a loss are negative. Null if the value is not present in the context."
    )]
    pub value: Option<f64>,

    #[serde(default)]
    #[schemars(
        description = "The unit associated with the value: crore, lakh, thousand, or none if no unit is stated."
    )]
    pub unit: Unit,
}

impl RawExtraction {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self {
            value: Some(value),
            unit,
        }
    }
}

/// The normalized financial record. Every numeric field is in crores or `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub company_name: String,
    pub fiscal_year: String,
    pub revenue_current_year: Option<f64>,
    pub revenue_previous_year: Option<f64>,
    pub profit_after_tax_current_year: Option<f64>,
    pub profit_after_tax_previous_year: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub cash_reserves: Option<f64>,
    pub net_cash_from_operations: Option<f64>,
    pub total_current_assets: Option<f64>,
    pub total_current_liabilities: Option<f64>,
    pub total_equity: Option<f64>,
}

impl MetricSet {
    pub fn new(company_name: impl Into<String>, fiscal_year: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            fiscal_year: fiscal_year.into(),
            revenue_current_year: None,
            revenue_previous_year: None,
            profit_after_tax_current_year: None,
            profit_after_tax_previous_year: None,
            total_liabilities: None,
            cash_reserves: None,
            net_cash_from_operations: None,
            total_current_assets: None,
            total_current_liabilities: None,
            total_equity: None,
        }
    }

    pub fn numeric(&self, metric: MetricName) -> Option<f64> {
        match metric {
            MetricName::CompanyName | MetricName::FiscalYear => None,
            MetricName::RevenueCurrentYear => self.revenue_current_year,
            MetricName::RevenuePreviousYear => self.revenue_previous_year,
            MetricName::ProfitAfterTaxCurrentYear => self.profit_after_tax_current_year,
            MetricName::ProfitAfterTaxPreviousYear => self.profit_after_tax_previous_year,
            MetricName::TotalLiabilities => self.total_liabilities,
            MetricName::CashReserves => self.cash_reserves,
            MetricName::NetCashFromOperations => self.net_cash_from_operations,
            MetricName::TotalCurrentAssets => self.total_current_assets,
            MetricName::TotalCurrentLiabilities => self.total_current_liabilities,
            MetricName::TotalEquity => self.total_equity,
        }
    }

    /// Stores a crore value for a numeric metric. Text metrics are ignored.
    pub fn set_numeric(&mut self, metric: MetricName, value: Option<f64>) {
        let slot = match metric {
            MetricName::CompanyName | MetricName::FiscalYear => return,
            MetricName::RevenueCurrentYear => &mut self.revenue_current_year,
            MetricName::RevenuePreviousYear => &mut self.revenue_previous_year,
            MetricName::ProfitAfterTaxCurrentYear => &mut self.profit_after_tax_current_year,
            MetricName::ProfitAfterTaxPreviousYear => &mut self.profit_after_tax_previous_year,
            MetricName::TotalLiabilities => &mut self.total_liabilities,
            MetricName::CashReserves => &mut self.cash_reserves,
            MetricName::NetCashFromOperations => &mut self.net_cash_from_operations,
            MetricName::TotalCurrentAssets => &mut self.total_current_assets,
            MetricName::TotalCurrentLiabilities => &mut self.total_current_liabilities,
            MetricName::TotalEquity => &mut self.total_equity,
        };
        *slot = value;
    }

    pub fn absent_metrics(&self) -> Vec<MetricName> {
        MetricName::NUMERIC
            .iter()
            .copied()
            .filter(|m| self.numeric(*m).is_none())
            .collect()
    }
}

/// Assignment of each extracted metric to the workbook sheet that holds it.
///
/// Built once per workbook by the sheet locator and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SheetMap {
    #[serde(default)]
    #[schemars(description = "Sheet containing the fiscal year or reporting period, or null")]
    fiscal_year: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing current-year revenue from operations (usually the Profit & Loss sheet), or null")]
    revenue_current_year: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing previous-year revenue from operations (usually the Profit & Loss sheet), or null")]
    revenue_previous_year: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing current-year profit after tax (usually the Profit & Loss sheet), or null")]
    profit_after_tax_current_year: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing previous-year profit after tax (usually the Profit & Loss sheet), or null")]
    profit_after_tax_previous_year: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing total liabilities (usually the Balance Sheet), or null")]
    total_liabilities: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing closing cash and cash equivalents, or null")]
    cash_reserves: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing net cash from operating activities (usually the Cash Flow sheet), or null")]
    net_cash_from_operations: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing total current assets (usually the Balance Sheet), or null")]
    total_current_assets: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing total current liabilities (usually the Balance Sheet), or null")]
    total_current_liabilities: Option<String>,

    #[serde(default)]
    #[schemars(description = "Sheet containing total equity (usually the Balance Sheet), or null")]
    total_equity: Option<String>,
}

impl SheetMap {
    pub fn from_assignments<I, S>(assignments: I) -> Self
    where
        I: IntoIterator<Item = (MetricName, S)>,
        S: Into<String>,
    {
        let mut map = SheetMap::default();
        for (metric, sheet) in assignments {
            if let Some(slot) = map.slot_mut(metric) {
                *slot = Some(sheet.into());
            }
        }
        map
    }

    pub fn sheet_for(&self, metric: MetricName) -> Option<&str> {
        let slot = match metric {
            MetricName::CompanyName => return None,
            MetricName::FiscalYear => &self.fiscal_year,
            MetricName::RevenueCurrentYear => &self.revenue_current_year,
            MetricName::RevenuePreviousYear => &self.revenue_previous_year,
            MetricName::ProfitAfterTaxCurrentYear => &self.profit_after_tax_current_year,
            MetricName::ProfitAfterTaxPreviousYear => &self.profit_after_tax_previous_year,
            MetricName::TotalLiabilities => &self.total_liabilities,
            MetricName::CashReserves => &self.cash_reserves,
            MetricName::NetCashFromOperations => &self.net_cash_from_operations,
            MetricName::TotalCurrentAssets => &self.total_current_assets,
            MetricName::TotalCurrentLiabilities => &self.total_current_liabilities,
            MetricName::TotalEquity => &self.total_equity,
        };
        slot.as_deref()
    }

    /// Distinct sheets referenced by the map.
    pub fn assigned_sheets(&self) -> BTreeSet<&str> {
        MetricName::EXTRACTED
            .iter()
            .filter_map(|m| self.sheet_for(*m))
            .collect()
    }

    pub fn unmapped(&self) -> Vec<MetricName> {
        MetricName::EXTRACTED
            .iter()
            .copied()
            .filter(|m| self.sheet_for(*m).is_none())
            .collect()
    }

    /// Drops assignments to sheets that are not in `sheet_names`. Matching is
    /// case-insensitive and whitespace-trimmed; kept entries use the workbook's
    /// spelling.
    pub fn restricted_to(mut self, sheet_names: &[String]) -> Self {
        for metric in MetricName::EXTRACTED {
            if let Some(slot) = self.slot_mut(metric) {
                *slot = slot.take().and_then(|proposed| {
                    let wanted = proposed.trim();
                    sheet_names
                        .iter()
                        .find(|name| name.trim().eq_ignore_ascii_case(wanted))
                        .cloned()
                });
            }
        }
        self
    }

    fn slot_mut(&mut self, metric: MetricName) -> Option<&mut Option<String>> {
        match metric {
            MetricName::CompanyName => None,
            MetricName::FiscalYear => Some(&mut self.fiscal_year),
            MetricName::RevenueCurrentYear => Some(&mut self.revenue_current_year),
            MetricName::RevenuePreviousYear => Some(&mut self.revenue_previous_year),
            MetricName::ProfitAfterTaxCurrentYear => Some(&mut self.profit_after_tax_current_year),
            MetricName::ProfitAfterTaxPreviousYear => {
                Some(&mut self.profit_after_tax_previous_year)
            }
            MetricName::TotalLiabilities => Some(&mut self.total_liabilities),
            MetricName::CashReserves => Some(&mut self.cash_reserves),
            MetricName::NetCashFromOperations => Some(&mut self.net_cash_from_operations),
            MetricName::TotalCurrentAssets => Some(&mut self.total_current_assets),
            MetricName::TotalCurrentLiabilities => Some(&mut self.total_current_liabilities),
            MetricName::TotalEquity => Some(&mut self.total_equity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_serialize_snake_case() {
        let json = serde_json::to_string(&MetricName::ProfitAfterTaxCurrentYear).unwrap();
        assert_eq!(json, "\"profit_after_tax_current_year\"");
        for metric in MetricName::EXTRACTED {
            let json = serde_json::to_string(&metric).unwrap();
            assert_eq!(json.trim_matches('"'), metric.as_str());
        }
    }

    #[test]
    fn test_extracted_excludes_company_name() {
        assert_eq!(MetricName::EXTRACTED.len(), 11);
        assert!(!MetricName::EXTRACTED.contains(&MetricName::CompanyName));
        assert!(MetricName::NUMERIC.iter().all(|m| m.is_numeric()));
    }

    #[test]
    fn test_raw_extraction_schema_and_defaults() {
        let schema = serde_json::to_string(&schemars::schema_for!(RawExtraction)).unwrap();
        assert!(schema.contains("value"));
        assert!(schema.contains("lakh"));

        let raw: RawExtraction = serde_json::from_str(r#"{"value": -971.0}"#).unwrap();
        assert_eq!(raw.unit, Unit::None);
        assert_eq!(raw.value, Some(-971.0));
    }

    #[test]
    fn test_metric_set_accessors() {
        let mut set = MetricSet::new("Acme", "FY24");
        assert_eq!(set.absent_metrics().len(), 10);

        set.set_numeric(MetricName::TotalEquity, Some(700.0));
        set.set_numeric(MetricName::FiscalYear, Some(1.0));
        assert_eq!(set.total_equity, Some(700.0));
        assert_eq!(set.numeric(MetricName::TotalEquity), Some(700.0));
        assert_eq!(set.fiscal_year, "FY24");
        assert!(!set.absent_metrics().contains(&MetricName::TotalEquity));
    }

    #[test]
    fn test_sheet_map_restricted_to_known_sheets() {
        let map = SheetMap::from_assignments([
            (MetricName::RevenueCurrentYear, "profit & loss"),
            (MetricName::TotalEquity, "Imaginary Sheet"),
        ]);
        let sheets = vec!["Profit & Loss".to_string(), "Balance Sheet".to_string()];
        let map = map.restricted_to(&sheets);

        assert_eq!(
            map.sheet_for(MetricName::RevenueCurrentYear),
            Some("Profit & Loss")
        );
        assert_eq!(map.sheet_for(MetricName::TotalEquity), None);
        assert_eq!(map.unmapped().len(), 10);
        assert_eq!(map.assigned_sheets().len(), 1);
    }

    #[test]
    fn test_sheet_map_deserializes_partial_response() {
        let map: SheetMap =
            serde_json::from_str(r#"{"total_equity": "BS", "cash_reserves": null}"#).unwrap();
        assert_eq!(map.sheet_for(MetricName::TotalEquity), Some("BS"));
        assert_eq!(map.sheet_for(MetricName::CashReserves), None);
        assert_eq!(map.sheet_for(MetricName::CompanyName), None);
    }
}
