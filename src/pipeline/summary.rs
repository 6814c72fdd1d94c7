//! One-line summaries of completed agent outputs.

use crate::models::agent::AgentName;
use crate::models::outputs::AgentOutputs;

/// Summarize the stored output of `agent`, if there is one.
#[must_use]
pub fn summarize(outputs: &AgentOutputs, agent: AgentName) -> Option<String> {
    match agent {
        AgentName::Validator => outputs.validator.as_ref().map(|out| {
            format!(
                "Decision: {} | Quality Score: {}/10",
                out.decision.map_or("UNKNOWN", |d| d.as_str()),
                out.quality_score.unwrap_or(0.0)
            )
        }),
        AgentName::Strategist => outputs.strategist.as_ref().map(|out| {
            format!(
                "Format: {} | Structure: {} | Questions: {}",
                out.recommended_format.as_deref().unwrap_or("text"),
                if out.structure_type.is_empty() {
                    "unknown"
                } else {
                    &out.structure_type
                },
                out.clarifying_questions.len()
            )
        }),
        AgentName::Writer => outputs.writer.as_ref().map(|out| {
            format!(
                "Hooks: {} (best score: {}/10) | Hashtags: {}",
                out.hooks.len(),
                out.best_hook().map_or(0.0, |hook| hook.score),
                out.hashtags.len()
            )
        }),
        AgentName::Visual => outputs.visual.as_ref().map(|out| {
            format!(
                "Slides: {} | Style: {}",
                out.visual_specs.total_slides,
                if out.visual_specs.overall_style.is_empty() {
                    "default"
                } else {
                    &out.visual_specs.overall_style
                }
            )
        }),
        AgentName::Optimizer => outputs.optimizer.as_ref().map(|out| {
            format!(
                "Decision: {} | Quality: {}/10 | Predicted: {}-{} impressions",
                out.decision.map_or("UNKNOWN", |d| d.as_str()),
                out.quality_score.unwrap_or(0.0),
                group_thousands(out.predicted_impressions_min.unwrap_or(0)),
                group_thousands(out.predicted_impressions_max.unwrap_or(0))
            )
        }),
    }
}

/// Format `n` with comma thousands separators.
#[must_use]
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
