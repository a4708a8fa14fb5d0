//! Platform drafts produced after a successful run.
//!
//! Derived fields (`fullPost`, `estimatedLength`, `totalPosts`, ...) are
//! never taken from the model; [`Report::normalize`] recomputes them.

use serde::{Deserialize, Serialize};

use super::lenient::{string, strings};
use super::Report;

/// Join non-empty blocks with a blank line.
fn join_blocks<'a>(blocks: impl IntoIterator<Item = &'a str>) -> String {
    blocks
        .into_iter()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkedInPost {
    #[serde(deserialize_with = "string")]
    pub hook: String,
    #[serde(deserialize_with = "string")]
    pub body: String,
    #[serde(deserialize_with = "string")]
    pub cta: String,
    #[serde(deserialize_with = "strings")]
    pub hashtags: Vec<String>,
    #[serde(deserialize_with = "string")]
    pub full_post: String,
    #[serde(skip_deserializing)]
    pub estimated_length: usize,
}

impl Report for LinkedInPost {
    fn normalize(&mut self) {
        if self.full_post.trim().is_empty() {
            let tags = self.hashtags.join(" ");
            self.full_post = join_blocks([
                self.hook.as_str(),
                self.body.as_str(),
                self.cta.as_str(),
                tags.as_str(),
            ]);
        }
        self.estimated_length = self.full_post.chars().count();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FacebookPost {
    #[serde(deserialize_with = "string")]
    pub hook: String,
    #[serde(deserialize_with = "string")]
    pub body: String,
    /// Closing question that invites comments.
    #[serde(deserialize_with = "string")]
    pub question: String,
    #[serde(deserialize_with = "string")]
    pub full_post: String,
}

impl Report for FacebookPost {
    fn normalize(&mut self) {
        if self.full_post.trim().is_empty() {
            self.full_post = join_blocks([
                self.hook.as_str(),
                self.body.as_str(),
                self.question.as_str(),
            ]);
        }
    }
}

/// A single short post or a thread for X, Bluesky or Threads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MicroblogPost {
    #[serde(deserialize_with = "strings")]
    pub posts: Vec<String>,
    #[serde(deserialize_with = "strings")]
    pub hashtags: Vec<String>,
    #[serde(skip_deserializing)]
    pub is_thread: bool,
    #[serde(skip_deserializing)]
    pub total_posts: usize,
    #[serde(skip_deserializing)]
    pub character_count: usize,
}

impl MicroblogPost {
    /// Cut every post to `limit` characters.
    pub fn enforce_limit(&mut self, limit: usize) {
        for post in &mut self.posts {
            if post.chars().count() > limit {
                *post = post.chars().take(limit).collect();
            }
        }
    }
}

impl Report for MicroblogPost {
    fn normalize(&mut self) {
        self.total_posts = self.posts.len();
        self.is_thread = self.posts.len() > 1;
        self.character_count = self.posts.iter().map(|p| p.chars().count()).sum();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Scene {
    /// e.g. `0-3s`.
    #[serde(deserialize_with = "string")]
    pub timing: String,
    #[serde(deserialize_with = "string")]
    pub visual: String,
    #[serde(deserialize_with = "string")]
    pub voiceover: String,
    #[serde(deserialize_with = "string")]
    pub on_screen_text: String,
}

/// Script for a short vertical video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoScript {
    #[serde(deserialize_with = "string")]
    pub hook: String,
    pub scenes: Vec<Scene>,
    #[serde(deserialize_with = "string")]
    pub cta: String,
    #[serde(deserialize_with = "string")]
    pub caption: String,
    #[serde(deserialize_with = "strings")]
    pub hashtags: Vec<String>,
    /// Spoken words across hook, scenes and call to action.
    #[serde(skip_deserializing)]
    pub word_count: usize,
}

impl Report for VideoScript {
    fn normalize(&mut self) {
        let spoken = std::iter::once(self.hook.as_str())
            .chain(self.scenes.iter().map(|s| s.voiceover.as_str()))
            .chain(std::iter::once(self.cta.as_str()));
        self.word_count = spoken.map(|t| t.split_whitespace().count()).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_linkedin_full_post_assembled() {
        let mut post: LinkedInPost = serde_json::from_value(json!({
            "hook": "Two numbers changed my mind.",
            "body": "The first one...",
            "cta": "What would you add?",
            "hashtags": ["#data", "#work"],
            "estimatedLength": 99999
        }))
        .unwrap();
        post.normalize();
        assert_eq!(
            post.full_post,
            "Two numbers changed my mind.\n\nThe first one...\n\nWhat would you add?\n\n#data #work"
        );
        assert_eq!(post.estimated_length, post.full_post.chars().count());
    }

    #[test]
    fn test_microblog_counts() {
        let mut post = MicroblogPost {
            posts: vec!["one".into(), "two!".into()],
            ..Default::default()
        };
        post.normalize();
        assert!(post.is_thread);
        assert_eq!(post.total_posts, 2);
        assert_eq!(post.character_count, 7);
    }

    #[test]
    fn test_video_word_count() {
        let mut script = VideoScript {
            hook: "Stop scrolling".into(),
            scenes: vec![Scene {
                voiceover: "this costs you three hours".into(),
                ..Default::default()
            }],
            cta: "Follow".into(),
            ..Default::default()
        };
        script.normalize();
        assert_eq!(script.word_count, 8);
    }
}
