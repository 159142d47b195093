use chrono::{Datelike, Local};

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Fallback fiscal year label when the document does not state one.
pub fn current_year_label() -> String {
    Local::now().year().to_string()
}

/// Strips markdown fences and surrounding chatter from a model reply that is
/// supposed to be a JSON object or array.
pub fn clean_json_output(raw: &str) -> String {
    let obj = raw.find('{').zip(raw.rfind('}'));
    let arr = raw.find('[').zip(raw.rfind(']'));

    let span = match (obj, arr) {
        (Some(o), Some(a)) => Some(if a.0 < o.0 { a } else { o }),
        (Some(o), None) => Some(o),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    };

    match span {
        Some((start, end)) if end > start => raw[start..=end].to_string(),
        _ => raw.trim().to_string(),
    }
}

/// Trims whitespace and wrapping quotes from a short free-text answer.
pub fn clean_text_answer(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(14.285714), 14.29);
        assert_eq!(round2(0.714285), 0.71);
        assert_eq!(round2(-10.0), -10.0);
    }

    #[test]
    fn test_clean_json_output_strips_fences() {
        let raw = "```json\n{\"value\": 12114, \"unit\": \"crore\"}\n```";
        assert_eq!(clean_json_output(raw), "{\"value\": 12114, \"unit\": \"crore\"}");
    }

    #[test]
    fn test_clean_json_output_prefers_outermost() {
        let raw = "Here: [{\"a\": 1}] done";
        assert_eq!(clean_json_output(raw), "[{\"a\": 1}]");
        assert_eq!(clean_json_output("  no json  "), "no json");
    }

    #[test]
    fn test_clean_text_answer() {
        assert_eq!(clean_text_answer("  \"FY 2023-24\"\n"), "FY 2023-24");
    }

    #[test]
    fn test_current_year_label_is_numeric() {
        let label = current_year_label();
        assert_eq!(label.len(), 4);
        assert!(label.parse::<i32>().is_ok());
    }
}
