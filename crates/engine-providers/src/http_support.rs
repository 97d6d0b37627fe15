//! Shared HTTP response handling for provider adapters.
//!
//! Every adapter hits the same three outcomes after a request completes:
//! auth failure, rate limiting, or some other non-2xx status. Centralizing
//! the mapping keeps each adapter's request code focused on endpoint shape.

use engine_core::error::EngineError;
use reqwest::Response;

/// Maps a completed HTTP response to `Ok(response)` on success or the
/// appropriate [`EngineError`] variant, reading `Retry-After` for 429s.
pub async fn check_response(provider: &str, response: Response) -> Result<Response, EngineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 401 || status.as_u16() == 403 {
        let body = response.text().await.unwrap_or_default();
        return Err(EngineError::auth(provider, truncate_for_log(&body)));
    }

    if status.as_u16() == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(EngineError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs,
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(EngineError::protocol(
        provider,
        format!("unexpected status {status}: {}", truncate_for_log(&body)),
    ))
}

/// Object keys masked by [`redact_pii`], matched case-insensitively.
const PII_KEYS: &[&str] = &[
    "email",
    "phone",
    "phone_number",
    "first_name",
    "last_name",
    "display_name",
    "name",
    "address",
    "street_address",
    "ssn",
    "dob",
    "date_of_birth",
    "birth_date",
    "card_number",
    "credit_card",
];

fn redact_pii(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if PII_KEYS.iter().any(|pii| pii.eq_ignore_ascii_case(key)) {
                    *v = serde_json::Value::String("[REDACTED]".to_string());
                } else {
                    redact_pii(v);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                redact_pii(item);
            }
        }
        _ => {}
    }
}

/// PII-redacted sample of a failing payload for logging (§7: "logged with
/// PII-redacted sample payload"). Bodies that parse as JSON have known
/// PII-bearing fields masked before truncation; bodies that don't parse are
/// truncated as-is, since there's no structure to redact against.
fn truncate_for_log(body: &str) -> String {
    const MAX: usize = 200;

    let redacted = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(mut value) => {
            redact_pii(&mut value);
            serde_json::to_string(&value).unwrap_or_else(|_| body.to_string())
        }
        Err(_) => body.to_string(),
    };

    if redacted.chars().count() <= MAX {
        redacted
    } else {
        format!("{}…", redacted.chars().take(MAX).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_for_log_leaves_short_body_untouched() {
        assert_eq!(truncate_for_log("short body"), "short body");
    }

    #[test]
    fn truncate_for_log_truncates_long_body() {
        let long = "x".repeat(500);
        let truncated = truncate_for_log(&long);
        assert!(truncated.chars().count() <= 201);
    }

    #[test]
    fn truncate_for_log_redacts_email_in_json_body() {
        let body = r#"{"email":"runner@example.com","bib":"42"}"#;
        let truncated = truncate_for_log(body);
        assert!(!truncated.contains("runner@example.com"));
        assert!(truncated.contains("[REDACTED]"));
        assert!(truncated.contains("\"bib\":\"42\""));
    }

    #[test]
    fn truncate_for_log_redacts_pii_inside_nested_arrays() {
        let body = r#"{"entries":[{"first_name":"Jordan","last_name":"Lee"}]}"#;
        let truncated = truncate_for_log(body);
        assert!(!truncated.contains("Jordan"));
        assert!(!truncated.contains("Lee"));
    }
}
