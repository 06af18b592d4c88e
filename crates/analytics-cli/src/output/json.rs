//! JSON output formatting.

use serde::Serialize;

/// Format a report as JSON.
///
/// If `compact` is true, outputs minified JSON without whitespace.
pub fn format_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhis_analytics_core::{ReplicationReport, Watermark};

    fn report() -> ReplicationReport {
        ReplicationReport {
            table: "analytics_rs_relationship".to_string(),
            source: "relationship".to_string(),
            rows: 12,
            duration_ms: 4,
        }
    }

    #[test]
    fn test_json_pretty() {
        let json = format_json(&[report()], false).unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("analytics_rs_relationship"));
    }

    #[test]
    fn test_json_compact() {
        let json = format_json(&Watermark::unset(), true).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.starts_with("{\"nextFullUpdate\":\"1970-01-01T00:00:00"));
    }
}
