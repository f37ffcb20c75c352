//! Lenient extraction of structured data from completion replies.
//!
//! Replies are free text that may carry a JSON document, either in a
//! ```` ```json ```` fenced block or inline in prose. Fenced blocks are
//! preferred. Inline text is scanned for the first balanced `{...}` or
//! `[...]` region that decodes and looks like a payload.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use bomwright_core::types::BomItem;

use crate::catalog::{arm_region_name, normalize_service_name};
use crate::error::PayloadError;

const DEFAULT_QUANTITY: f64 = 1.0;
const DEFAULT_HOURS_PER_MONTH: f64 = 730.0;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)\s*(.*?)```").expect("Invalid fenced-block regex")
});

// =============================================================================
// Wire shapes
// =============================================================================

/// A BOM line as it appears in a reply, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawBomItem {
    #[serde(rename = "serviceName", alias = "service_name", default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(rename = "armRegionName", alias = "arm_region_name", default)]
    pub arm_region_name: Option<String>,
    #[serde(alias = "hoursPerMonth", default)]
    pub hours_per_month: Option<f64>,
}

impl RawBomItem {
    /// Check required fields and fill defaults.
    ///
    /// Returns `None` when the service name, SKU or region is missing or
    /// blank, or when a numeric field is negative or not finite.
    pub fn validate(self) -> Option<BomItem> {
        let service_name = normalize_service_name(non_blank(self.service_name)?.as_str());
        let sku = non_blank(self.sku)?;
        let region = non_blank(self.region)?;

        let quantity = self.quantity.unwrap_or(DEFAULT_QUANTITY);
        if !quantity.is_finite() || quantity <= 0.0 {
            return None;
        }
        let hours_per_month = self.hours_per_month.unwrap_or(DEFAULT_HOURS_PER_MONTH);
        if !hours_per_month.is_finite() || hours_per_month < 0.0 {
            return None;
        }

        let arm_region_name =
            non_blank(self.arm_region_name).unwrap_or_else(|| arm_region_name(&region));

        Some(BomItem {
            service_name,
            sku,
            quantity,
            region,
            arm_region_name,
            hours_per_month,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Items(Vec<RawBomItem>),
    Document(WireDocument),
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    #[serde(alias = "requirements_summary", default)]
    requirements: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    bom_items: Vec<RawBomItem>,
}

/// Decoded content of a structured block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionPayload {
    pub done: bool,
    pub requirements: Option<String>,
    pub items: Vec<RawBomItem>,
}

impl From<WirePayload> for CompletionPayload {
    fn from(wire: WirePayload) -> Self {
        match wire {
            WirePayload::Items(items) => CompletionPayload {
                items,
                ..Default::default()
            },
            WirePayload::Document(doc) => CompletionPayload {
                done: doc.done,
                requirements: doc.requirements,
                items: doc.bom_items,
            },
        }
    }
}

/// Result of looking for a structured block in a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// No structured block was found.
    Absent,
    /// A fenced block was present but did not decode.
    Malformed(String),
    Payload(CompletionPayload),
}

// =============================================================================
// Extraction
// =============================================================================

pub fn extract(text: &str) -> Extracted {
    let mut fenced_error = None;
    for caps in FENCED_JSON.captures_iter(text) {
        let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        match serde_json::from_str::<WirePayload>(body) {
            Ok(wire) => return Extracted::Payload(wire.into()),
            Err(e) => {
                fenced_error.get_or_insert_with(|| e.to_string());
            }
        }
    }
    if let Some(err) = fenced_error {
        return Extracted::Malformed(err);
    }

    for (start, _) in text.match_indices(['{', '[']) {
        let Some(end) = balanced_end(text, start) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text[start..=end]) else {
            continue;
        };
        if !has_payload_shape(&value) {
            continue;
        }
        if let Ok(wire) = serde_json::from_value::<WirePayload>(value) {
            return Extracted::Payload(wire.into());
        }
    }
    Extracted::Absent
}

const DOCUMENT_KEYS: [&str; 4] = ["bom_items", "done", "requirements", "requirements_summary"];

/// Inline JSON counts only if it carries a known document key, or is a
/// non-empty list of objects naming a service.
fn has_payload_shape(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(map) => DOCUMENT_KEYS.iter().any(|k| map.contains_key(*k)),
        serde_json::Value::Array(items) => {
            !items.is_empty()
                && items.iter().all(|item| {
                    item.as_object().is_some_and(|obj| {
                        obj.contains_key("serviceName") || obj.contains_key("service_name")
                    })
                })
        }
        _ => false,
    }
}

/// Byte index of the bracket closing the one at `start`, skipping over
/// string literals.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Validated BOM items carried by a reply.
///
/// A reply without any structured block yields no items. A fenced block
/// that fails to decode is an error.
pub fn extract_bom_items(text: &str) -> Result<Vec<BomItem>, PayloadError> {
    match extract(text) {
        Extracted::Absent => Ok(Vec::new()),
        Extracted::Malformed(err) => Err(PayloadError::Malformed(err)),
        Extracted::Payload(payload) => {
            let total = payload.items.len();
            let items: Vec<BomItem> = payload
                .items
                .into_iter()
                .filter_map(RawBomItem::validate)
                .collect();
            if items.len() < total {
                tracing::debug!(
                    dropped = total - items.len(),
                    "Skipped BOM items missing required fields"
                );
            }
            Ok(items)
        }
    }
}

/// Completion state announced by a conversational reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnCompletion {
    pub done: bool,
    pub requirements: Option<String>,
}

/// Read the `done` flag and requirements summary from a reply.
///
/// Anything that is not a decodable structured block means "not done".
pub fn parse_completion(text: &str) -> TurnCompletion {
    match extract(text) {
        Extracted::Payload(payload) => TurnCompletion {
            done: payload.done,
            requirements: payload.requirements,
        },
        _ => TurnCompletion::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_document_with_items() {
        let text = r#"Here is the BOM:
```json
{"bom_items": [{"serviceName": "App Service", "sku": "P1v2", "quantity": 2, "region": "East US", "armRegionName": "eastus", "hours_per_month": 730}]}
```
"#;
        let items = extract_bom_items(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].service_name, "App Service");
        assert_eq!(items[0].quantity, 2.0);
    }

    #[test]
    fn test_bare_array_is_accepted() {
        let text = r#"```json
[{"serviceName": "SQL Database", "sku": "S1", "region": "East US"}]
```"#;
        let items = extract_bom_items(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku, "S1");
    }

    #[test]
    fn test_inline_json_in_prose() {
        let text = r#"Sure. {"bom_items": [{"serviceName": "Key Vault", "sku": "Standard", "region": "West Europe"}]} Let me know."#;
        let items = extract_bom_items(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].arm_region_name, "westeurope");
    }

    #[test]
    fn test_inline_scan_skips_unrelated_objects() {
        let text = r#"Settings like {"tier": "basic"} apply. Final: {"bom_items": [{"serviceName": "App Service", "sku": "P1v2", "region": "East US"}]}"#;
        let items = extract_bom_items(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku, "P1v2");
    }

    #[test]
    fn test_inline_completion_after_unrelated_object() {
        let text = r#"Example shape {"x": 1}. {"requirements": "web app", "done": true}"#;
        let completion = parse_completion(text);
        assert!(completion.done);
        assert_eq!(completion.requirements.as_deref(), Some("web app"));
    }

    #[test]
    fn test_unrelated_inline_json_is_absent() {
        assert_eq!(extract(r#"Use {"tier": "basic"} or [1, 2]"#), Extracted::Absent);
        assert_eq!(extract(r#"tags: [{"name": "prod"}]"#), Extracted::Absent);
    }

    #[test]
    fn test_fenced_block_preferred_over_inline() {
        let text = r#"Earlier {"bom_items": [{"serviceName": "Storage", "sku": "LRS", "region": "East US"}]}
```json
{"bom_items": [{"serviceName": "Redis", "sku": "C1", "region": "East US"}]}
```"#;
        let items = extract_bom_items(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].service_name, "Azure Cache for Redis");
    }

    #[test]
    fn test_no_structure_yields_no_items() {
        let items = extract_bom_items("I could not determine any services yet.").unwrap();
        assert!(items.is_empty());
        assert_eq!(extract("plain text"), Extracted::Absent);
    }

    #[test]
    fn test_malformed_fenced_block_is_error() {
        let text = "```json\n{\"bom_items\": [ {\"serviceName\": \n```";
        assert!(matches!(
            extract_bom_items(text),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn test_unbalanced_inline_is_absent() {
        assert_eq!(extract("values look like {oops"), Extracted::Absent);
        assert_eq!(extract("a ] stray { bracket ]"), Extracted::Absent);
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"Result: {"requirements": "use {braces} and [brackets]", "done": true} end"#;
        let completion = parse_completion(text);
        assert!(completion.done);
        assert_eq!(
            completion.requirements.as_deref(),
            Some("use {braces} and [brackets]")
        );
    }

    #[test]
    fn test_items_missing_required_fields_are_dropped() {
        let text = r#"```json
{"bom_items": [
  {"serviceName": "App Service", "sku": "P1v2", "region": "East US"},
  {"serviceName": "", "sku": "S1", "region": "East US"},
  {"serviceName": "SQL Database", "region": "East US"},
  {"serviceName": "Storage", "sku": "LRS"}
]}
```"#;
        let items = extract_bom_items(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].service_name, "App Service");
    }

    #[test]
    fn test_defaults_are_filled() {
        let raw = RawBomItem {
            service_name: Some("web app".to_string()),
            sku: Some(" P1v2 ".to_string()),
            region: Some("East US 2".to_string()),
            ..Default::default()
        };
        let item = raw.validate().unwrap();
        assert_eq!(item.service_name, "App Service");
        assert_eq!(item.sku, "P1v2");
        assert_eq!(item.quantity, 1.0);
        assert_eq!(item.hours_per_month, 730.0);
        assert_eq!(item.arm_region_name, "eastus2");
    }

    #[test]
    fn test_non_positive_quantity_is_rejected() {
        let raw = RawBomItem {
            service_name: Some("App Service".to_string()),
            sku: Some("P1v2".to_string()),
            region: Some("East US".to_string()),
            quantity: Some(0.0),
            ..Default::default()
        };
        assert!(raw.validate().is_none());
    }

    #[test]
    fn test_parse_completion_fenced() {
        let text = r#"```json {"requirements_summary": "Web app with SQL backend in East US", "done": true}```"#;
        let completion = parse_completion(text);
        assert!(completion.done);
        assert_eq!(
            completion.requirements.as_deref(),
            Some("Web app with SQL backend in East US")
        );
    }

    #[test]
    fn test_parse_completion_requirements_key() {
        let completion = parse_completion(r#"{"requirements": "two VMs", "done": true}"#);
        assert!(completion.done);
        assert_eq!(completion.requirements.as_deref(), Some("two VMs"));
    }

    #[test]
    fn test_parse_completion_not_done() {
        assert_eq!(
            parse_completion("What region would you like?"),
            TurnCompletion::default()
        );
        assert!(!parse_completion(r#"{"done": false}"#).done);
    }

    #[test]
    fn test_legacy_phrase_is_not_completion() {
        assert!(!parse_completion("We are done gathering requirements").done);
    }

    #[test]
    fn test_parse_completion_malformed_is_not_done() {
        assert!(!parse_completion("```json\n{\"done\": tru\n```").done);
    }
}
