//! Directive extraction from assistant text

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Matches one directive tag; the payload may span lines
static DIRECTIVE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<HA_COMMAND>(.*?)</HA_COMMAND>").expect("valid regex"));

/// A decoded home-control directive
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Directive {
    /// Service identifier, `domain/service` or `domain.service`
    pub service: String,

    /// Target entity
    #[serde(default)]
    pub entity_id: Option<String>,

    /// Extra service parameters
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl Directive {
    /// Split the service identifier, `None` when it is not dispatchable
    #[must_use]
    pub fn service_call(&self) -> Option<ServiceCall> {
        ServiceCall::parse(&self.service)
    }

    /// Request body: the entity id followed by any extra data
    #[must_use]
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        if let Some(entity_id) = &self.entity_id {
            body.insert("entity_id".to_string(), Value::String(entity_id.clone()));
        }
        if let Some(data) = &self.data {
            body.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Value::Object(body)
    }
}

/// A service identifier split into namespace and action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCall {
    /// Service domain, e.g. `light`
    pub domain: String,
    /// Action within the domain, e.g. `turn_on`
    pub service: String,
}

impl ServiceCall {
    /// Split on `/` when present, otherwise on `.`
    ///
    /// Splits once; both halves must be non-empty.
    #[must_use]
    pub fn parse(identifier: &str) -> Option<Self> {
        let separator = if identifier.contains('/') { '/' } else { '.' };
        let (domain, service) = identifier.trim().split_once(separator)?;
        let (domain, service) = (domain.trim(), service.trim());
        if domain.is_empty() || service.is_empty() {
            return None;
        }

        Some(Self {
            domain: domain.to_string(),
            service: service.to_string(),
        })
    }
}

/// Raw payload strings between directive tags, in source order
#[must_use]
pub fn candidates(text: &str) -> Vec<&str> {
    DIRECTIVE_REGEX
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .collect()
}

/// Decode one payload, `None` if it is not a valid directive
#[must_use]
pub fn decode(payload: &str) -> Option<Directive> {
    match serde_json::from_str::<Directive>(payload) {
        Ok(directive) => Some(directive),
        Err(e) => {
            tracing::debug!(error = %e, payload, "skipping malformed directive");
            None
        }
    }
}

/// Every well-formed directive in `text`, in source order
#[must_use]
pub fn extract_directives(text: &str) -> Vec<Directive> {
    candidates(text).into_iter().filter_map(decode).collect()
}

/// Remove every directive tag and trim the result
#[must_use]
pub fn clean_response(text: &str) -> String {
    DIRECTIVE_REGEX.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_valid_directives_in_order() {
        let text = concat!(
            r#"<HA_COMMAND>{"service": "light/turn_on", "entity_id": "light.kitchen"}</HA_COMMAND>"#,
            r"<HA_COMMAND>{not json</HA_COMMAND>",
            r#"<HA_COMMAND>{"service": "switch.turn_off", "entity_id": "switch.fan"}</HA_COMMAND>"#,
            "All set."
        );

        let directives = extract_directives(text);
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].entity_id.as_deref(), Some("light.kitchen"));
        assert_eq!(directives[1].entity_id.as_deref(), Some("switch.fan"));
    }

    #[test]
    fn test_candidates_span_lines() {
        let text = "<HA_COMMAND>\n{\"service\": \"light/toggle\"}\n</HA_COMMAND>";
        assert_eq!(candidates(text), vec![r#"{"service": "light/toggle"}"#]);
    }

    #[test]
    fn test_missing_service_is_malformed() {
        assert!(decode(r#"{"entity_id": "light.kitchen"}"#).is_none());
        assert!(decode("[]").is_none());
    }

    #[test]
    fn test_clean_response_strips_only_tags() {
        let text = r#"<HA_COMMAND>{"service": "light/turn_on"}</HA_COMMAND>Done."#;
        assert_eq!(clean_response(text), "Done.");
        assert_eq!(clean_response("  Is that all?  "), "Is that all?");
        assert_eq!(
            clean_response("<HA_COMMAND>{}</HA_COMMAND>\n<HA_COMMAND>x</HA_COMMAND>"),
            ""
        );
    }

    #[test]
    fn test_service_call_separators() {
        let slash = ServiceCall::parse("light/turn_on").unwrap();
        assert_eq!(slash.domain, "light");
        assert_eq!(slash.service, "turn_on");

        let dot = ServiceCall::parse("climate.set_temperature").unwrap();
        assert_eq!(dot.domain, "climate");
        assert_eq!(dot.service, "set_temperature");

        // Slash wins when both appear
        let both = ServiceCall::parse("media_player/volume.set").unwrap();
        assert_eq!(both.service, "volume.set");
    }

    #[test]
    fn test_service_call_rejects_unsplittable() {
        assert!(ServiceCall::parse("turn_on").is_none());
        assert!(ServiceCall::parse("light/").is_none());
        assert!(ServiceCall::parse("/turn_on").is_none());
    }

    #[test]
    fn test_service_call_splits_on_first_separator() {
        let call = ServiceCall::parse("a.b.c").unwrap();
        assert_eq!(call.domain, "a");
        assert_eq!(call.service, "b.c");

        let call = ServiceCall::parse("script/turn_on/x").unwrap();
        assert_eq!(call.domain, "script");
        assert_eq!(call.service, "turn_on/x");
    }

    #[test]
    fn test_payload_merges_data_after_entity() {
        let directive = decode(
            r#"{"service": "light/turn_on", "entity_id": "light.desk", "data": {"brightness": 128}}"#,
        )
        .unwrap();

        assert_eq!(
            directive.payload(),
            serde_json::json!({"entity_id": "light.desk", "brightness": 128})
        );
    }
}
