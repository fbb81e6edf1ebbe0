//! Tolerant decoding of the model's JSON answer.
//!
//! The prompt asks for a bare JSON object, but models regularly wrap it in a
//! markdown fence or pad it with whitespace. Both are stripped before strict
//! decoding; anything else comes back as a [`ParseError`].

use serde_json::Value;

use super::SynthesisResult;

/// JSON keys the model is asked to fill for one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFields {
    pub summary: &'static str,
    pub value_proposition: &'static str,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("missing string field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` is empty")]
    EmptyField(&'static str),
}

/// Remove a surrounding markdown code fence and its language tag, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    body.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .trim_end_matches("```")
        .trim()
}

pub fn parse(raw: &str, fields: OutputFields) -> Result<SynthesisResult, ParseError> {
    let cleaned = strip_code_fences(raw);
    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(ParseError::NotAnObject)?;

    let field = |key: &'static str| -> Result<String, ParseError> {
        let text = object
            .get(key)
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingField(key))?
            .trim();
        if text.is_empty() {
            return Err(ParseError::EmptyField(key));
        }
        Ok(text.to_string())
    };

    Ok(SynthesisResult {
        summary: field(fields.summary)?,
        value_proposition: field(fields.value_proposition)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: OutputFields = OutputFields {
        summary: "basic_info",
        value_proposition: "why_work_with_us",
    };

    const BARE: &str = r#"{"basic_info":"Acme builds rockets.","why_work_with_us":"They ship."}"#;

    #[test]
    fn test_fenced_padded_and_bare_parse_identically() {
        let expected = parse(BARE, FIELDS).unwrap();
        let variants = [
            format!("```json\n{}\n```", BARE),
            format!("```\n{}\n```", BARE),
            format!("   \n\t{}  \n\n", BARE),
            format!("\n```json {} ```\n", BARE),
            format!("```Json\n{}\n```", BARE),
            format!("```jsonc\n{}\n```", BARE),
            format!("```JSON\n{}", BARE),
        ];
        for raw in &variants {
            assert_eq!(parse(raw, FIELDS).unwrap(), expected, "input: {raw:?}");
        }
        assert_eq!(expected.summary, "Acme builds rockets.");
        assert_eq!(expected.value_proposition, "They ship.");
    }

    #[test]
    fn test_malformed_text_is_typed_error() {
        let err = parse("Sure! Here is the JSON you asked for:", FIELDS).unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));

        let err = parse("```json\n{\"basic_info\": \"cut off", FIELDS).unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn test_non_object_rejected() {
        assert_eq!(parse("[1, 2, 3]", FIELDS).unwrap_err(), ParseError::NotAnObject);
    }

    #[test]
    fn test_missing_and_empty_fields() {
        assert_eq!(
            parse(r#"{"basic_info":"x"}"#, FIELDS).unwrap_err(),
            ParseError::MissingField("why_work_with_us")
        );
        assert_eq!(
            parse(r#"{"basic_info":"  ","why_work_with_us":"y"}"#, FIELDS).unwrap_err(),
            ParseError::EmptyField("basic_info")
        );
        assert_eq!(
            parse(r#"{"basic_info":42,"why_work_with_us":"y"}"#, FIELDS).unwrap_err(),
            ParseError::MissingField("basic_info")
        );
    }
}
