//! Prompt construction for conversational turns and enrichment calls.

use bomwright_core::types::{Turn, TurnRole};

use crate::catalog::service_name_hints;

const TURN_INSTRUCTIONS: &str = "\
You are a cloud solutions architect gathering requirements for an Azure deployment.
Ask one focused question at a time about workload, services, regions, scale and budget.
When you have enough information, reply with only a fenced ```json block of the form
{\"requirements\": \"<one paragraph summary>\", \"done\": true}.";

const ENRICHMENT_INSTRUCTIONS: &str = "\
Extract the Azure resources discussed in the conversation below into a bill of materials.
Reply with a fenced ```json block of the form
{\"bom_items\": [{\"serviceName\": \"...\", \"sku\": \"...\", \"quantity\": 1, \"region\": \"...\", \
\"armRegionName\": \"...\", \"hours_per_month\": 730}]}.
Include only services with a known SKU and region. If nothing qualifies, return {\"bom_items\": []}.";

/// Render history entries as a `role: text` transcript.
pub fn transcript(history: &[Turn]) -> String {
    history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
            };
            format!("{speaker}: {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Transcript of the last `count` history entries.
pub fn recent_context(history: &[Turn], count: usize) -> String {
    let start = history.len().saturating_sub(count);
    transcript(&history[start..])
}

/// Prompt for the next assistant reply.
pub fn build_turn_prompt(history: &[Turn], message: &str) -> String {
    let mut prompt = String::from(TURN_INSTRUCTIONS);
    if !history.is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        prompt.push_str(&transcript(history));
    }
    prompt.push_str("\n\nUser: ");
    prompt.push_str(message);
    prompt
}

/// Prompt for one enrichment call. Only the trailing `max_context_chars`
/// characters of `context` are embedded.
pub fn build_enrichment_prompt(context: &str, max_context_chars: usize) -> String {
    format!(
        "{ENRICHMENT_INSTRUCTIONS}\n\n{}\nConversation:\n{}",
        service_name_hints(),
        tail_chars(context, max_context_chars)
    )
}

fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
