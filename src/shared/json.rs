/// Pretty-prints a serialized-arguments string when it parses as JSON.
/// Invalid input is returned unchanged so the operator always sees the raw
/// text the engine would receive.
pub fn format_json(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

pub fn validate_json(raw: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting_preserves_the_parsed_value() {
        let raw = r#"{"q":"weather","limit":3}"#;
        let formatted = format_json(raw);
        let reparsed: serde_json::Value = serde_json::from_str(&formatted).unwrap();
        let original: serde_json::Value = serde_json::from_str(raw).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn invalid_input_is_flagged_and_passed_through() {
        let raw = "{not json";
        assert!(!validate_json(raw));
        assert_eq!(format_json(raw), raw);
    }
}
