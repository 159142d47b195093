use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::schema::MetricSet;
use crate::utils::round2;

pub const INFINITE_RUNWAY: &str = "infinite";

/// Months of cash left at the current burn rate.
///
/// Serializes as a plain number, or as the string `"infinite"` when the
/// company is not burning cash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Runway {
    Months(f64),
    Infinite,
}

impl Runway {
    pub fn months(&self) -> Option<f64> {
        match self {
            Runway::Months(m) => Some(*m),
            Runway::Infinite => None,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Runway::Infinite)
    }
}

impl fmt::Display for Runway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runway::Months(m) => write!(f, "{:.2} months", m),
            Runway::Infinite => f.write_str(INFINITE_RUNWAY),
        }
    }
}

impl Serialize for Runway {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Runway::Months(m) => serializer.serialize_f64(*m),
            Runway::Infinite => serializer.serialize_str(INFINITE_RUNWAY),
        }
    }
}

impl<'de> Deserialize<'de> for Runway {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RunwayVisitor;

        impl<'de> Visitor<'de> for RunwayVisitor {
            type Value = Runway;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number of months or the string \"infinite\"")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Runway, E> {
                Ok(Runway::Months(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Runway, E> {
                Ok(Runway::Months(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Runway, E> {
                Ok(Runway::Months(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Runway, E> {
                if v.eq_ignore_ascii_case(INFINITE_RUNWAY) || v.eq_ignore_ascii_case("inf") {
                    Ok(Runway::Infinite)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(RunwayVisitor)
    }
}

/// The eight ratios derived from a [`MetricSet`]. `None` means the ratio is
/// undefined for the inputs (a guarded division).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSet {
    pub revenue_growth_percent: Option<f64>,
    pub profit_margin_percent: Option<f64>,
    pub monthly_net_cash_flow: f64,
    pub monthly_burn_rate: f64,
    pub runway_months: Runway,
    pub current_ratio: Option<f64>,
    pub debt_to_equity_ratio: Option<f64>,
    pub return_on_equity_percent: Option<f64>,
}

impl KpiSet {
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Derives the KPI set. Never fails: an absent input counts as 0, a
/// non-positive (or, for equity, zero) denominator maps the ratio to `None`
/// and a zero burn rate maps to [`Runway::Infinite`].
pub fn compute_kpis(m: &MetricSet) -> KpiSet {
    let amount = |v: Option<f64>| v.unwrap_or(0.0);
    let ratio = |numerator: Option<f64>, denominator: f64| round2(amount(numerator) / denominator);

    let revenue = amount(m.revenue_current_year);
    let previous_revenue = amount(m.revenue_previous_year);
    let equity = amount(m.total_equity);

    let revenue_growth_percent = (previous_revenue > 0.0)
        .then(|| round2((revenue - previous_revenue) / previous_revenue * 100.0));

    let profit_margin_percent = (revenue > 0.0)
        .then(|| round2(amount(m.profit_after_tax_current_year) / revenue * 100.0));

    let monthly_net_cash_flow = round2(amount(m.net_cash_from_operations) / 12.0);
    let monthly_burn_rate = if monthly_net_cash_flow < 0.0 {
        monthly_net_cash_flow.abs()
    } else {
        0.0
    };

    let runway_months = if monthly_burn_rate > 0.0 {
        Runway::Months(ratio(m.cash_reserves, monthly_burn_rate))
    } else {
        Runway::Infinite
    };

    let current_liabilities = amount(m.total_current_liabilities);
    let current_ratio = (current_liabilities > 0.0)
        .then(|| ratio(m.total_current_assets, current_liabilities));

    let debt_to_equity_ratio = (equity != 0.0).then(|| ratio(m.total_liabilities, equity));

    let return_on_equity_percent = (equity != 0.0)
        .then(|| round2(amount(m.profit_after_tax_current_year) / equity * 100.0));

    KpiSet {
        revenue_growth_percent,
        profit_margin_percent,
        monthly_net_cash_flow,
        monthly_burn_rate,
        runway_months,
        current_ratio,
        debt_to_equity_ratio,
        return_on_equity_percent,
    }
}
