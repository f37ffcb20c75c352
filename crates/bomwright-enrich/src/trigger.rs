//! Heuristics deciding whether an assistant turn warrants a BOM update.
//!
//! A turn triggers enrichment when its text names a cloud service, a SKU or
//! tier, a concrete region, or a scale figure, when it carries the
//! completion marker, or when the turn number falls on the periodic
//! boundary. The first matching signal wins.

use regex::Regex;
use std::sync::LazyLock;

use bomwright_core::config::EnrichmentConfig;

// =============================================================================
// Compiled regex sets (compiled once, reused across calls)
// =============================================================================

struct TriggerPatterns {
    services: Vec<Regex>,
    skus: Vec<Regex>,
    regions: Vec<Regex>,
    scale: Vec<Regex>,
}

static TRIGGER_PATTERNS: LazyLock<TriggerPatterns> = LazyLock::new(|| {
    let mk = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("Invalid trigger regex"))
            .collect()
    };

    TriggerPatterns {
        services: mk(&[
            r"(?i)\bapp\s+services?\b",
            r"(?i)\bweb\s*apps?\b",
            r"(?i)\bfunctions?\s+apps?\b",
            r"(?i)\bazure\s+functions\b",
            r"(?i)\bvirtual\s+machines?\b",
            r"(?i)\bvms?\b",
            r"(?i)\bkubernetes\b",
            r"(?i)\baks\b",
            r"(?i)\bcontainer\s+(?:apps|instances|registry)\b",
            r"(?i)\bsql\b",
            r"(?i)\bdatabase\b",
            r"(?i)\bcosmos\s*db\b",
            r"(?i)\b(?:mysql|postgres(?:ql)?|mariadb)\b",
            r"(?i)\bredis\b",
            r"(?i)\b(?:blob|storage)\b",
            r"(?i)\bcdn\b",
            r"(?i)\bfront\s+door\b",
            r"(?i)\bapplication\s+gateway\b",
            r"(?i)\bload\s+balancer\b",
            r"(?i)\bvpn\s+gateway\b",
            r"(?i)\bapi\s+management\b",
            r"(?i)\bservice\s+bus\b",
            r"(?i)\bevent\s+(?:hubs?|grid)\b",
            r"(?i)\bkey\s+vault\b",
            r"(?i)\b(?:app(?:lication)?\s+insights|log\s+analytics)\b",
            r"(?i)\bopenai\b",
        ]),
        skus: mk(&[
            r"\b[BSP]\d{1,2}(?:v\d)?\b",
            r"\bStandard_[A-Za-z0-9_]+\b",
            r"\b[DEF]\d{1,2}[a-z]*_v\d\b",
            r"(?i)\b(?:basic|standard|premium)\s+(?:tier|plan|sku)\b",
            r"(?i)\b(?:the\s+)?(?:basic|standard|premium)\s+tier\b",
            r"(?i)\bsku\b",
        ]),
        regions: mk(&[
            r"(?i)\b(?:east|west|central|north\s+central|south\s+central|west\s+central)\s+us(?:\s*[23])?\b",
            r"(?i)\b(?:north|west)\s+europe\b",
            r"(?i)\b(?:uk|france|germany|switzerland|norway)\s+(?:south|west|north|central)\b",
            r"(?i)\b(?:southeast|east)\s+asia\b",
            r"(?i)\b(?:australia|japan|korea|canada|brazil|india)\s+(?:east|west|south|central|southeast)\b",
            r"(?i)\b(?:eastus2?|westus[23]?|centralus|westeurope|northeurope|southeastasia|uksouth)\b",
        ]),
        scale: mk(&[
            r"(?i)\bscal(?:e|es|ed|ing)\b",
            r"(?i)\bautoscal\w*\b",
            r"(?i)\b\d+\s*(?:concurrent\s+)?users\b",
            r"(?i)\b\d+\s*(?:instances?|nodes?|replicas?|vcpus?|cores?)\b",
            r"(?i)\b\d+\s*(?:gb|tb|rps)\b",
            r"(?i)\brequests?\s+per\s+(?:second|minute)\b",
            r"(?i)\bhigh\s+availability\b",
            r"(?i)\bthroughput\b",
        ]),
    }
});

static DONE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"done"\s*:\s*true"#).expect("Invalid done-marker regex"));

// =============================================================================
// Policy
// =============================================================================

/// Why a turn triggered enrichment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerReason {
    Service,
    Sku,
    Region,
    Scale,
    Completion,
    Periodic,
}

/// Decides whether a processed turn schedules enrichment.
#[derive(Clone, Debug)]
pub struct TriggerPolicy {
    periodic_every: u32,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self { periodic_every: 3 }
    }
}

impl TriggerPolicy {
    /// `periodic_every` of zero disables the periodic trigger.
    pub fn new(periodic_every: u32) -> Self {
        Self { periodic_every }
    }

    pub fn from_config(config: &EnrichmentConfig) -> Self {
        Self::new(config.periodic_every)
    }

    pub fn should_trigger(&self, assistant_text: &str, turn_number: u32) -> bool {
        self.reason(assistant_text, turn_number).is_some()
    }

    /// First signal in `assistant_text` or `turn_number` that calls for an update.
    pub fn reason(&self, assistant_text: &str, turn_number: u32) -> Option<TriggerReason> {
        let p = &*TRIGGER_PATTERNS;
        if any_match(&p.services, assistant_text) {
            return Some(TriggerReason::Service);
        }
        if any_match(&p.skus, assistant_text) {
            return Some(TriggerReason::Sku);
        }
        if any_match(&p.regions, assistant_text) {
            return Some(TriggerReason::Region);
        }
        if any_match(&p.scale, assistant_text) {
            return Some(TriggerReason::Scale);
        }
        if DONE_MARKER.is_match(assistant_text) {
            return Some(TriggerReason::Completion);
        }
        if self.is_periodic(turn_number) {
            return Some(TriggerReason::Periodic);
        }
        None
    }

    /// Whether a user message names a cloud service.
    pub fn mentions_services(&self, text: &str) -> bool {
        any_match(&TRIGGER_PATTERNS.services, text)
    }

    fn is_periodic(&self, turn_number: u32) -> bool {
        self.periodic_every > 0 && turn_number > 0 && turn_number % self.periodic_every == 0
    }
}

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}
