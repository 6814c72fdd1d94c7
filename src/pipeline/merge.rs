//! Final post assembly.
//!
//! The terminal `completed` payload and the per-agent outputs describe the
//! same post through several near-synonymous fields (`body` vs
//! `body_content`, a `hook` object vs a hook string vs the writer's hook
//! list, and so on). [`assemble`] resolves each field from the most
//! specific source that has it:
//!
//! 1. `final_post` (or `final_output`) inside the terminal payload
//! 2. top-level fields of the terminal payload
//! 3. the stored writer, visual and optimizer outputs

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::outputs::{AgentOutputs, OptimizerDecision, OptimizerOutput, VisualSpecs};
use crate::models::session::PostFormat;

/// The canonical generated post.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinalPost {
    /// Post format.
    pub format: PostFormat,
    /// Chosen opening line.
    pub hook: String,
    /// Post body.
    pub body: String,
    /// Call-to-action line.
    pub cta: String,
    /// Hashtags without the leading `#`.
    pub hashtags: Vec<String>,
    /// Slide layout for carousels.
    pub visual_specs: Option<VisualSpecs>,
    /// Final quality score, 0 to 10.
    pub quality_score: Option<f64>,
    /// Brand consistency score, 0 to 10.
    pub brand_consistency_score: Option<f64>,
    /// Predicted impressions `(min, max)`.
    pub predicted_impressions: Option<(u64, u64)>,
    /// Predicted engagement rate.
    pub predicted_engagement_rate: Option<f64>,
    /// Optimizer suggestions.
    pub suggestions: Vec<String>,
    /// Optimizer verdict.
    pub optimizer_decision: Option<OptimizerDecision>,
}

impl FinalPost {
    /// Publishable text: hook, body, call-to-action and hashtags.
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = [&self.hook, &self.body, &self.cta]
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .cloned()
            .collect();
        if !self.hashtags.is_empty() {
            parts.push(
                self.hashtags
                    .iter()
                    .map(|tag| format!("#{tag}"))
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        parts.join("\n\n")
    }
}

/// Build the final post from the terminal payload and stored outputs.
#[must_use]
pub fn assemble(result: &Value, outputs: &AgentOutputs, fallback_format: PostFormat) -> FinalPost {
    let post = post_object(result);
    let sources = [post, result];
    let writer = outputs.writer.as_ref();
    let optimizer = outputs.optimizer.as_ref();

    let hook = post
        .get("hook")
        .and_then(hook_text)
        .or_else(|| text(&sources, &["hook_text"]))
        .or_else(|| writer.and_then(|w| w.best_hook()).map(|h| h.text.clone()))
        .unwrap_or_default();

    let body = text(&sources, &["body", "body_content", "content"])
        .or_else(|| writer.map(|w| w.body_content.clone()))
        .unwrap_or_default();

    let cta = text(&sources, &["cta", "call_to_action"])
        .or_else(|| writer.map(|w| w.cta.clone()))
        .unwrap_or_default();

    let hashtags = sources
        .iter()
        .find_map(|src| string_list(src.get("hashtags")?))
        .or_else(|| writer.map(|w| w.hashtags.clone()))
        .unwrap_or_default()
        .into_iter()
        .map(|tag| tag.trim_start_matches('#').to_owned())
        .filter(|tag| !tag.is_empty())
        .collect();

    let format = text(&sources, &["format"])
        .and_then(|raw| PostFormat::parse(&raw).ok())
        .filter(|format| *format != PostFormat::Auto)
        .unwrap_or(fallback_format);

    let visual_specs = sources
        .iter()
        .find_map(|src| {
            let specs = src.get("visual_specs").filter(|v| v.is_object())?;
            serde_json::from_value::<VisualSpecs>(specs.clone()).ok()
        })
        .or_else(|| outputs.visual.as_ref().map(|v| v.visual_specs.clone()));

    let predicted_impressions = sources
        .iter()
        .find_map(|src| impressions(src.get("predicted_impressions")?))
        .or_else(|| optimizer.and_then(OptimizerOutput::predicted_impressions));

    FinalPost {
        format,
        hook,
        body,
        cta,
        hashtags,
        visual_specs,
        quality_score: number(&sources, "quality_score")
            .or_else(|| optimizer.and_then(|o| o.quality_score)),
        brand_consistency_score: number(&sources, "brand_consistency_score")
            .or_else(|| optimizer.and_then(|o| o.brand_consistency_score)),
        predicted_impressions,
        predicted_engagement_rate: number(&sources, "predicted_engagement_rate")
            .or_else(|| optimizer.and_then(|o| o.predicted_engagement_rate)),
        suggestions: sources
            .iter()
            .find_map(|src| string_list(src.get("optimization_suggestions")?))
            .or_else(|| optimizer.map(|o| o.suggestions.clone()))
            .unwrap_or_default(),
        optimizer_decision: optimizer.and_then(|o| o.decision),
    }
}

/// The most specific post object in the payload, or `Null`.
fn post_object(result: &Value) -> &Value {
    static NULL: Value = Value::Null;
    result
        .get("final_post")
        .filter(|v| v.is_object())
        .or_else(|| {
            let output = result.get("final_output").filter(|v| v.is_object())?;
            Some(output.get("final_post").filter(|v| v.is_object()).unwrap_or(output))
        })
        .unwrap_or(&NULL)
}

fn hook_text(hook: &Value) -> Option<String> {
    let text = match hook {
        Value::String(text) => Some(text.clone()),
        Value::Object(obj) => obj.get("text").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    };
    text.filter(|text| !text.trim().is_empty())
}

fn text(sources: &[&Value], keys: &[&str]) -> Option<String> {
    sources.iter().find_map(|src| {
        keys.iter().find_map(|key| {
            src.get(*key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_owned)
        })
    })
}

fn number(sources: &[&Value], key: &str) -> Option<f64> {
    sources.iter().find_map(|src| src.get(key).and_then(Value::as_f64))
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
    )
}

fn impressions(value: &Value) -> Option<(u64, u64)> {
    match value.as_array()?.as_slice() {
        [min, max] => Some((min.as_u64()?, max.as_u64()?)),
        _ => None,
    }
}
