//! Prompt templates and answer parsing for the LLM oracle.
//!
//! Every tier gets the same shape of conversation: a system prompt naming the
//! tier's vocabulary and the answer format, and a user prompt listing the
//! grounding set followed by the raw search term.

use std::collections::HashSet;

use serde_json::Value;
use tariff_cascade::{OracleError, Tier};

/// Tier vocabulary used in prompts.
fn vocabulary(tier: Tier) -> (&'static str, &'static str) {
    match tier {
        Tier::Top => ("section", "Roman numeral such as \"IV\""),
        Tier::Group => ("chapter", "two-digit code such as \"02\""),
        Tier::Subgroup => ("heading", "four-digit code such as \"0201\""),
        Tier::Leaf => ("subheading", "six-digit code such as \"020130\""),
    }
}

/// System prompt for `tier`.
pub fn system_prompt(tier: Tier) -> String {
    let (unit, code_shape) = vocabulary(tier);
    format!(
        r#"You are a customs classification expert working with the Harmonized System nomenclature.

You will receive a list of candidate {unit}s, one per line as `code: description`, and a product description.
Select every candidate {unit} under which the product could be classified. Each code is a {code_shape}.

Rules:
- Only return codes that appear in the candidate list.
- Return the most likely {unit} first.
- If no candidate fits, return an empty list.

Answer with JSON only, in exactly this form:
{{"codes": ["<code>", "..."]}}"#
    )
}

/// User prompt listing `candidates` as `(code, description)` pairs.
pub fn user_prompt(tier: Tier, term: &str, candidates: &[(String, String)]) -> String {
    let (unit, _) = vocabulary(tier);
    let mut prompt = format!("## Candidate {unit}s\n\n");
    for (code, description) in candidates {
        if description.is_empty() {
            prompt.push_str(&format!("{code}\n"));
        } else {
            prompt.push_str(&format!("{code}: {description}\n"));
        }
    }
    prompt.push_str(&format!("\n## Product\n\n{term}"));
    prompt
}

/// Extract the selected codes from a model answer.
///
/// Accepts `{"codes": [...]}` or a bare JSON array, optionally inside a
/// fenced code block or surrounded by prose. Codes are trimmed, empty codes
/// dropped and duplicates collapsed to their first occurrence.
pub fn parse_codes(content: &str) -> Result<Vec<String>, OracleError> {
    let body = strip_code_fence(content.trim());
    let value = parse_json(body).ok_or_else(|| {
        OracleError::MalformedResponse(format!("no JSON answer in: {}", truncate(content, 200)))
    })?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("codes") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => {
                return Err(OracleError::MalformedResponse(
                    "answer object has no \"codes\" array".into(),
                ))
            }
            Some(other) => {
                return Err(OracleError::MalformedResponse(format!(
                    "\"codes\" is not an array: {other}"
                )))
            }
        },
        other => {
            return Err(OracleError::MalformedResponse(format!(
                "unexpected answer: {other}"
            )))
        }
    };

    let raw: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    Ok(normalize_codes(raw))
}

/// Trim, drop empties, keep first occurrence of each code.
pub fn normalize_codes(codes: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    codes
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

fn strip_code_fence(content: &str) -> &str {
    let Some(start) = content.find("```") else {
        return content;
    };
    let after = &content[start + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the first newline.
    let after = match after.find('\n') {
        Some(nl) if after[..nl].chars().all(|c| c.is_ascii_alphanumeric()) => &after[nl + 1..],
        _ => after,
    };
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}

fn parse_json(body: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }
    // Prose around the JSON: try the outermost object, then the outermost array.
    [('{', '}'), ('[', ']')].into_iter().find_map(|(open, close)| {
        let start = body.find(open)?;
        let end = body.rfind(close)?;
        (end > start)
            .then(|| serde_json::from_str::<Value>(&body[start..=end]).ok())
            .flatten()
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_uses_tier_vocabulary() {
        assert!(system_prompt(Tier::Top).contains("candidate sections"));
        assert!(system_prompt(Tier::Leaf).contains("six-digit"));
        assert!(system_prompt(Tier::Group).contains(r#"{"codes": ["#));
    }

    #[test]
    fn user_prompt_lists_candidates_then_term() {
        let prompt = user_prompt(
            Tier::Group,
            "frozen beef",
            &[
                ("01".into(), "Live animals".into()),
                ("02".into(), String::new()),
            ],
        );
        assert!(prompt.contains("01: Live animals\n"));
        assert!(prompt.contains("02\n"));
        assert!(prompt.ends_with("frozen beef"));
        assert!(prompt.find("01:").unwrap() < prompt.find("frozen beef").unwrap());
    }

    #[test]
    fn parses_codes_object() {
        assert_eq!(
            parse_codes(r#"{"codes": ["02", "16"]}"#).unwrap(),
            vec!["02", "16"]
        );
    }

    #[test]
    fn parses_fenced_block() {
        let answer = "Here you go:\n```json\n{\"codes\": [\"IV\"]}\n```\n";
        assert_eq!(parse_codes(answer).unwrap(), vec!["IV"]);
    }

    #[test]
    fn parses_bare_array_and_numbers() {
        assert_eq!(parse_codes("[\"0201\", 202]").unwrap(), vec!["0201", "202"]);
    }

    #[test]
    fn parses_json_inside_prose() {
        let answer = r#"The best match is {"codes": ["I"]} based on the description."#;
        assert_eq!(parse_codes(answer).unwrap(), vec!["I"]);
    }

    #[test]
    fn empty_list_is_no_match_not_error() {
        assert!(parse_codes(r#"{"codes": []}"#).unwrap().is_empty());
    }

    #[test]
    fn codes_are_normalized() {
        assert_eq!(
            parse_codes(r#"{"codes": [" 02 ", "", "02", "16"]}"#).unwrap(),
            vec!["02", "16"]
        );
    }

    #[test]
    fn prose_without_json_is_malformed() {
        let err = parse_codes("I think it is chapter two.").unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }

    #[test]
    fn object_without_codes_is_malformed() {
        let err = parse_codes(r#"{"answer": "02"}"#).unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }
}
