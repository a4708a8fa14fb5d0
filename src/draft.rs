//! Platform drafts built from a finished run.
//!
//! Drafting never re-runs analysis. It reads the sections of a successful
//! [`WorkflowResult`](crate::context::WorkflowResult) report, packs the
//! parts a writer needs into a [`DraftPackage`], and asks one platform
//! writer for a draft.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::ChatMessage;
use crate::error::{PipelineError, Result};
use crate::events::EventHandler;
use crate::reports::{FacebookPost, LinkedInPost, MicroblogPost, Report, VideoScript};
use crate::stages::prompts::{json_block, render, section};
use crate::stages::{decode, StageParams};

/// Platform family a draft is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformGroup {
    LinkedIn,
    Facebook,
    Microblog,
    Video,
}

impl PlatformGroup {
    pub const ALL: [PlatformGroup; 4] = [
        PlatformGroup::LinkedIn,
        PlatformGroup::Facebook,
        PlatformGroup::Microblog,
        PlatformGroup::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformGroup::LinkedIn => "linkedin",
            PlatformGroup::Facebook => "facebook",
            PlatformGroup::Microblog => "microblog",
            PlatformGroup::Video => "video",
        }
    }

    /// Variants a caller may pick, first one being the default.
    pub fn variants(&self) -> &'static [PlatformVariant] {
        match self {
            PlatformGroup::Microblog => &[
                PlatformVariant::XTwitter,
                PlatformVariant::Bluesky,
                PlatformVariant::Threads,
            ],
            PlatformGroup::Video => &[PlatformVariant::InstagramReels, PlatformVariant::YoutubeShorts],
            PlatformGroup::LinkedIn | PlatformGroup::Facebook => &[],
        }
    }

    pub fn params(&self) -> StageParams {
        match self {
            PlatformGroup::LinkedIn | PlatformGroup::Facebook => StageParams {
                temperature: 0.7,
                max_tokens: 2500,
            },
            PlatformGroup::Microblog => StageParams {
                temperature: 0.8,
                max_tokens: 2000,
            },
            PlatformGroup::Video => StageParams {
                temperature: 0.7,
                max_tokens: 1500,
            },
        }
    }
}

impl fmt::Display for PlatformGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformGroup {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        PlatformGroup::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::Validation(format!("unknown platform '{}'", s)))
    }
}

/// Single post or thread; only microblogs have threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftFormat {
    #[default]
    Post,
    Thread,
}

impl DraftFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftFormat::Post => "post",
            DraftFormat::Thread => "thread",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformVariant {
    XTwitter,
    Bluesky,
    Threads,
    InstagramReels,
    YoutubeShorts,
}

impl PlatformVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformVariant::XTwitter => "x_twitter",
            PlatformVariant::Bluesky => "bluesky",
            PlatformVariant::Threads => "threads",
            PlatformVariant::InstagramReels => "instagram_reels",
            PlatformVariant::YoutubeShorts => "youtube_shorts",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformVariant::XTwitter => "X (Twitter)",
            PlatformVariant::Bluesky => "Bluesky",
            PlatformVariant::Threads => "Threads",
            PlatformVariant::InstagramReels => "Instagram Reels",
            PlatformVariant::YoutubeShorts => "YouTube Shorts",
        }
    }

    /// Characters per post for microblogs.
    pub fn char_limit(&self) -> Option<usize> {
        match self {
            PlatformVariant::XTwitter => Some(280),
            PlatformVariant::Bluesky => Some(300),
            PlatformVariant::Threads => Some(500),
            PlatformVariant::InstagramReels | PlatformVariant::YoutubeShorts => None,
        }
    }
}

impl fmt::Display for PlatformVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated draft target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftTarget {
    pub group: PlatformGroup,
    pub format: DraftFormat,
    pub variant: Option<PlatformVariant>,
}

impl DraftTarget {
    /// Fill defaults and reject combinations the platform does not have.
    pub fn resolve(
        group: PlatformGroup,
        format: Option<DraftFormat>,
        variant: Option<PlatformVariant>,
    ) -> Result<Self> {
        let format = format.unwrap_or_default();
        if format == DraftFormat::Thread && group != PlatformGroup::Microblog {
            return Err(PipelineError::Validation(format!(
                "{} drafts have no thread format",
                group
            )));
        }

        let allowed = group.variants();
        let variant = match variant {
            Some(v) if allowed.contains(&v) => Some(v),
            Some(v) => {
                return Err(PipelineError::Validation(format!(
                    "variant {} does not belong to {}",
                    v, group
                )))
            }
            None => allowed.first().copied(),
        };

        Ok(Self {
            group,
            format,
            variant,
        })
    }
}

/// What a platform writer reads from a finished report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPackage {
    pub extracted_data: Value,
    pub resonance: Value,
    pub depth: Value,
    pub local_context: Value,
    pub popculture: Value,
    pub user_notes: Value,
    pub raw_source_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_angle: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_variant: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improved_version: Option<String>,
}

impl DraftPackage {
    /// Pack the sections of a run report.
    pub fn from_report(report: &Value) -> Self {
        let get = |key: &str| report.get(key).cloned().unwrap_or(Value::Null);
        let nested = |section: &str, field: &str| {
            report
                .get(section)
                .and_then(|s| s.get(field))
                .filter(|v| !crate::reports::is_empty_value(v))
                .cloned()
        };

        Self {
            extracted_data: get("extractor"),
            resonance: get("resonanceHunter"),
            depth: get("anthropologist"),
            local_context: get("localContextualizer"),
            popculture: get("popcultureCurator"),
            user_notes: report
                .get("extractor")
                .and_then(|e| e.get("userNotes"))
                .cloned()
                .unwrap_or(Value::Null),
            raw_source_text: report
                .get("rawSourceText")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            recommended_angle: nested("explorationReport", "recommendedAngle"),
            recommended_variant: nested("developmentReport", "recommendedVariant"),
            improved_version: nested("polishReport", "improvedVersion")
                .and_then(|v| v.as_str().map(str::to_string)),
        }
    }
}

fn writer_template(group: PlatformGroup) -> &'static str {
    match group {
        PlatformGroup::LinkedIn => {
            "# LINKEDIN WRITER\n\nWrite a LinkedIn post for professionals in {locale}: human, not corporate; short paragraphs; a story with a lesson; 3-5 hashtags; end with a reflective question.\n\nAnswer with one JSON object in a ```json block:\n{{\"hook\": \"\", \"body\": \"\", \"cta\": \"\", \"hashtags\": [], \"fullPost\": \"\"}}"
        }
        PlatformGroup::Facebook => {
            "# FACEBOOK WRITER\n\nWrite a Facebook post for a broad audience in {locale}: warm, personal, relatable; medium length; at most two hashtags; close with a question that invites comments.\n\nAnswer with one JSON object in a ```json block:\n{{\"hook\": \"\", \"body\": \"\", \"question\": \"\", \"fullPost\": \"\"}}"
        }
        PlatformGroup::Microblog => {
            "# MICROBLOG WRITER\n\nWrite for {platform} readers in {locale}: sharp, witty, every word working. Format: {format}. Never exceed {limit} characters per post.\n\nAnswer with one JSON object in a ```json block:\n{{\"posts\": [], \"hashtags\": []}}"
        }
        PlatformGroup::Video => {
            "# VIDEO SCRIPTWRITER\n\nWrite a {platform} script for viewers in {locale}: the hook lands in the first three seconds, 30-60 seconds in total, one idea per scene.\n\nAnswer with one JSON object in a ```json block:\n{{\"hook\": \"\", \"scenes\": [{{\"timing\": \"\", \"visual\": \"\", \"voiceover\": \"\", \"onScreenText\": \"\"}}], \"cta\": \"\", \"caption\": \"\", \"hashtags\": []}}"
        }
    }
}

/// System and user messages for a draft call.
pub fn messages(target: &DraftTarget, package: &DraftPackage, audience_locale: &str) -> Vec<ChatMessage> {
    let platform = target.variant.map(|v| v.display_name()).unwrap_or_default();
    let limit = target
        .variant
        .and_then(|v| v.char_limit())
        .map(|l| l.to_string())
        .unwrap_or_default();
    let system = render(
        writer_template(target.group),
        &[
            ("locale", audience_locale),
            ("platform", platform),
            ("format", target.format.as_str()),
            ("limit", limit.as_str()),
        ],
    );

    let mut parts = Vec::new();
    match &package.improved_version {
        Some(text) => parts.push(section("TEXT TO ADAPT", text)),
        None => {
            if let Some(angle) = &package.recommended_angle {
                parts.push(section("CHOSEN ANGLE", &json_block(angle)));
            }
            if let Some(variant) = &package.recommended_variant {
                parts.push(section("CHOSEN VARIANT", &json_block(variant)));
            }
        }
    }
    let material = serde_json::to_value(package).unwrap_or(Value::Null);
    parts.push(section("MATERIAL", &json_block(&material)));

    vec![ChatMessage::system(system), ChatMessage::user(parts.join("\n\n"))]
}

/// Decode a writer's answer into the group's draft shape.
pub fn decode_draft(
    target: &DraftTarget,
    raw: &str,
    events: &Option<Arc<dyn EventHandler>>,
) -> Value {
    let stage = format!("draft:{}", target.group);
    match target.group {
        PlatformGroup::LinkedIn => decode::<LinkedInPost>(&stage, raw, events).to_value(),
        PlatformGroup::Facebook => decode::<FacebookPost>(&stage, raw, events).to_value(),
        PlatformGroup::Microblog => {
            let mut post = decode::<MicroblogPost>(&stage, raw, events);
            if let Some(limit) = target.variant.and_then(|v| v.char_limit()) {
                post.enforce_limit(limit);
            }
            if target.format == DraftFormat::Post {
                post.posts.truncate(1);
            }
            post.normalize();
            post.to_value()
        }
        PlatformGroup::Video => decode::<VideoScript>(&stage, raw, events).to_value(),
    }
}
