//! Typed agent outputs.
//!
//! Every struct deserializes leniently: missing fields take defaults so a
//! partially populated payload still yields a usable output. Each output is
//! overwritten as a whole when the server redelivers it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::question::ClarifyingQuestion;
use super::session::PostFormat;

/// Validator verdict on the raw idea.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidatorDecision {
    /// Idea is strong enough to continue as-is.
    #[serde(alias = "approve")]
    Approve,
    /// Idea continues with refinement suggestions.
    #[serde(alias = "refine")]
    Refine,
    /// Idea is rejected; the pipeline stops.
    #[serde(alias = "reject")]
    Reject,
    /// Anything else the server sends.
    #[serde(other)]
    Unknown,
}

impl ValidatorDecision {
    /// Wire name of the verdict.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Refine => "REFINE",
            Self::Reject => "REJECT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Optimizer verdict on the draft.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptimizerDecision {
    /// Draft is ready to publish.
    #[serde(alias = "approve")]
    Approve,
    /// Draft was sent back for another writing pass.
    #[serde(alias = "revise")]
    Revise,
    /// Anything else the server sends.
    #[serde(other)]
    Unknown,
}

impl OptimizerDecision {
    /// Wire name of the verdict.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Revise => "REVISE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Output of the validator agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidatorOutput {
    /// Verdict.
    pub decision: Option<ValidatorDecision>,
    /// Idea quality, 0 to 10.
    pub quality_score: Option<f64>,
    /// Brand alignment, 0 to 10.
    pub brand_alignment_score: Option<f64>,
    /// Explanation of the verdict.
    pub reasoning: String,
    /// Concerns raised about the idea.
    pub concerns: Vec<String>,
    /// Suggestions for a stronger idea.
    pub refinement_suggestions: Vec<String>,
}

/// Output of the strategist agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategistOutput {
    /// Recommended format as sent by the server.
    pub recommended_format: Option<String>,
    /// Why that format was chosen.
    pub format_reasoning: String,
    /// Post structure tag (e.g. `story_post`).
    pub structure_type: String,
    /// Hook styles to try.
    pub hook_types: Vec<String>,
    /// Psychological triggers to lean on.
    pub psychological_triggers: Vec<String>,
    /// Voice for the post.
    pub tone: String,
    /// Questions the user must answer before writing starts.
    #[serde(deserialize_with = "super::question::deserialize_questions")]
    pub clarifying_questions: Vec<ClarifyingQuestion>,
}

impl StrategistOutput {
    /// The recommended format, when it names a known format.
    #[must_use]
    pub fn format(&self) -> Option<PostFormat> {
        self.recommended_format
            .as_deref()
            .and_then(|raw| PostFormat::parse(raw).ok())
            .filter(|format| *format != PostFormat::Auto)
    }
}

/// One candidate opening line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HookVariant {
    /// 1-based variant number.
    pub version: u32,
    /// Hook text.
    pub text: String,
    /// Hook style tag.
    pub hook_type: String,
    /// Writer's own score, 0 to 10.
    pub score: f64,
    /// Why the hook should work.
    pub reasoning: String,
}

/// Output of the writer agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WriterOutput {
    /// Hook variants, best first or scored.
    pub hooks: Vec<HookVariant>,
    /// Post body.
    #[serde(alias = "body")]
    pub body_content: String,
    /// Call-to-action line.
    #[serde(alias = "call_to_action")]
    pub cta: String,
    /// Hashtags without the leading `#`.
    pub hashtags: Vec<String>,
    /// Free-form formatting hints.
    pub formatting_metadata: Map<String, Value>,
}

impl WriterOutput {
    /// Highest-scoring hook, first one on ties.
    #[must_use]
    pub fn best_hook(&self) -> Option<&HookVariant> {
        self.hooks.iter().fold(None, |best, hook| match best {
            Some(current) if current.score >= hook.score => Some(current),
            _ => Some(hook),
        })
    }
}

/// One carousel slide.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VisualSlide {
    /// 1-based slide number.
    pub slide_number: u32,
    /// Layout name.
    pub layout: String,
    /// Slide headline.
    pub headline: String,
    /// Optional body copy.
    pub body_text: Option<String>,
    /// Optional image description.
    pub image_description: Option<String>,
    /// Optional notes for the designer.
    pub design_notes: Option<String>,
}

/// Carousel design layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VisualSpecs {
    /// Number of slides.
    pub total_slides: u32,
    /// Slides in order.
    pub slides: Vec<VisualSlide>,
    /// Overall visual style.
    pub overall_style: String,
    /// Palette as hex strings.
    pub color_palette: Vec<String>,
    /// Typography guidance.
    pub typography_notes: Option<String>,
}

/// Output of the visual agent; only produced for carousel posts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VisualOutput {
    /// Slide layout.
    pub visual_specs: VisualSpecs,
    /// Prompts for image generation.
    pub image_prompts: Vec<String>,
}

impl VisualOutput {
    /// Parse either the wrapped `{visual_specs, image_prompts}` shape or bare specs.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("visual_specs").is_some() {
            return serde_json::from_value(value.clone()).ok();
        }
        serde_json::from_value::<VisualSpecs>(value.clone())
            .ok()
            .map(|visual_specs| Self {
                visual_specs,
                image_prompts: Vec::new(),
            })
    }
}

/// Output of the optimizer agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerOutput {
    /// Verdict.
    pub decision: Option<OptimizerDecision>,
    /// Draft quality, 0 to 10.
    pub quality_score: Option<f64>,
    /// Brand consistency, 0 to 10.
    pub brand_consistency_score: Option<f64>,
    /// Formatting problems found.
    pub formatting_issues: Vec<String>,
    /// Improvement suggestions.
    pub suggestions: Vec<String>,
    /// Lower bound of predicted impressions.
    pub predicted_impressions_min: Option<u64>,
    /// Upper bound of predicted impressions.
    pub predicted_impressions_max: Option<u64>,
    /// Predicted engagement rate as a fraction.
    pub predicted_engagement_rate: Option<f64>,
    /// Confidence in the prediction, 0 to 1.
    pub confidence: Option<f64>,
}

impl OptimizerOutput {
    /// Predicted impressions as a `(min, max)` range when both bounds are known.
    #[must_use]
    pub fn predicted_impressions(&self) -> Option<(u64, u64)> {
        Some((self.predicted_impressions_min?, self.predicted_impressions_max?))
    }
}

/// Latest output of every agent; one slot each, never conflated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentOutputs {
    /// Validator slot.
    pub validator: Option<ValidatorOutput>,
    /// Strategist slot.
    pub strategist: Option<StrategistOutput>,
    /// Writer slot.
    pub writer: Option<WriterOutput>,
    /// Visual slot; stays empty for non-carousel posts.
    pub visual: Option<VisualOutput>,
    /// Optimizer slot.
    pub optimizer: Option<OptimizerOutput>,
}
