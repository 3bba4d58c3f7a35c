//! Assistant Actions
//!
//! Information Hiding:
//! - Prompt wording and sampling parameters per action hidden
//! - Credential resolution (stored key, then environment) internalized
//! - Model output parsing and fallbacks internalized
//! - Summary caching by message fingerprints internalized

pub mod prompts;

use crate::cache::{ChatCacheRecord, ChatCacheStore, ChatSettings, ChatSummary, StoryThread};
use crate::core::llm::{ChatMessage, ClientError, CompletionRequest, LLMClient};
use crate::preferences::{Feature, SettingsStore, UserSettings};
use crate::source::MessageData;
use crate::utils::text::{message_fingerprint, strip_code_fence};
use crate::utils::time::now_millis;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Fingerprints kept per chat; older ones are dropped first
const MAX_FINGERPRINTS: usize = 500;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Feature '{0}' is disabled")]
    FeatureDisabled(&'static str),

    #[error("Chat {0} is excluded by privacy settings")]
    ChatExcluded(String),

    #[error("Failed to parse reply options")]
    MalformedReplies,

    #[error("No messages to summarize")]
    NoMessages,

    #[error("Failed to validate API key")]
    ValidationUnavailable,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResult {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub original_text: String,
    pub translated_text: String,
    pub target_language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub emotion: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneAnalysis {
    pub primary: String,
    #[serde(default)]
    pub confidence: f64,
    /// Usually positive, negative or neutral; other labels are kept as given
    #[serde(default = "neutral")]
    pub sentiment: String,
    #[serde(default)]
    pub emotions: Vec<EmotionScore>,
}

fn neutral() -> String {
    "neutral".to_string()
}

impl ToneAnalysis {
    /// Returned when the model's answer is not usable
    pub fn unknown() -> Self {
        Self {
            primary: "unknown".to_string(),
            confidence: 0.0,
            sentiment: neutral(),
            emotions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyOption {
    pub id: String,
    pub tone: String,
    pub content: String,
    pub is_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplySuggestions {
    pub options: Vec<ReplyOption>,
    /// The message being replied to
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub summary: ChatSummary,
    pub stories: Vec<StoryThread>,
    /// True when served from the cache without calling the model
    pub cached: bool,
}

#[derive(Deserialize)]
struct ReplyDraft {
    tone: String,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDraft {
    summary: String,
    #[serde(default)]
    key_topics: Vec<String>,
    #[serde(default)]
    participants: Vec<String>,
    #[serde(default)]
    stories: Vec<StoryDraft>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryDraft {
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    participants: Vec<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

/// The AI actions, sharing one completion client and the stores
#[derive(Clone)]
pub struct AssistantActions {
    settings: SettingsStore,
    chats: ChatCacheStore,
    client: LLMClient,
    fallback_api_key: Option<String>,
}

impl AssistantActions {
    pub fn new(
        settings: SettingsStore,
        chats: ChatCacheStore,
        client: LLMClient,
        fallback_api_key: Option<String>,
    ) -> Self {
        Self {
            settings,
            chats,
            client,
            fallback_api_key,
        }
    }

    /// Stored key first, environment second
    fn resolve_api_key(&self, settings: &UserSettings) -> Result<String, ActionError> {
        let stored = settings.ai.api_key.trim();
        if !stored.is_empty() {
            return Ok(stored.to_string());
        }
        self.fallback_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .ok_or(ActionError::Client(ClientError::MissingApiKey))
    }

    /// Settings, credential and per-chat overrides for one action, after the
    /// feature and privacy checks
    async fn prepare(
        &self,
        feature: Feature,
        chat_id: Option<&str>,
    ) -> Result<(UserSettings, String, ChatSettings), ActionError> {
        let settings = self.settings.get_settings().await?;
        let api_key = self.resolve_api_key(&settings)?;

        if !settings.ai.enabled_features.is_enabled(feature) {
            return Err(ActionError::FeatureDisabled(feature.name()));
        }

        let chat_settings = match chat_id {
            Some(chat_id) => {
                if settings.is_chat_excluded(chat_id) {
                    return Err(ActionError::ChatExcluded(chat_id.to_string()));
                }
                self.chats.get_chat_settings(chat_id).await?
            }
            None => ChatSettings::new(""),
        };

        Ok((settings, api_key, chat_settings))
    }

    async fn ask(
        &self,
        settings: &UserSettings,
        api_key: &str,
        system: String,
        user: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ActionError> {
        let request = CompletionRequest {
            model: settings.ai.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature,
            max_tokens,
        };
        let response = self.client.complete(&request, api_key).await?;
        Ok(response.content().unwrap_or_default().to_string())
    }

    pub async fn analyze_message(
        &self,
        message: &MessageData,
        chat_id: Option<&str>,
    ) -> Result<TextResult, ActionError> {
        let (settings, api_key, chat) = self.prepare(Feature::Analyze, chat_id).await?;
        let language = chat
            .analysis_language
            .as_deref()
            .unwrap_or(&settings.general.analysis_language);

        let system = prompts::analyze(language, chat.custom_prompt.as_deref());
        let user = prompts::message_with_sender("Analyze this message:", message);
        let content = self.ask(&settings, &api_key, system, user, 0.7, 500).await?;

        tracing::debug!("[AssistantActions] Analyzed message from '{}'", message.sender);
        Ok(TextResult {
            content: non_empty_or(content, "No analysis available"),
        })
    }

    pub async fn translate_message(
        &self,
        message: &MessageData,
        target_language: Option<&str>,
        chat_id: Option<&str>,
    ) -> Result<Translation, ActionError> {
        let (settings, api_key, chat) = self.prepare(Feature::Translate, chat_id).await?;
        let target = target_language
            .filter(|t| !t.is_empty())
            .or(chat.translation_language.as_deref())
            .unwrap_or(&settings.general.translation_language)
            .to_string();

        let system = prompts::translate(&target);
        let translated = self
            .ask(&settings, &api_key, system, message.content.clone(), 0.3, 500)
            .await?;

        Ok(Translation {
            original_text: message.content.clone(),
            translated_text: translated,
            target_language: target,
        })
    }

    pub async fn explain_context(
        &self,
        message: &MessageData,
        chat_id: Option<&str>,
    ) -> Result<TextResult, ActionError> {
        let (settings, api_key, chat) = self.prepare(Feature::ExplainContext, chat_id).await?;
        let language = chat
            .analysis_language
            .as_deref()
            .unwrap_or(&settings.general.analysis_language);

        let system = prompts::explain(language, chat.custom_prompt.as_deref());
        let user = prompts::message_with_sender("Explain the context of this message:", message);
        let content = self.ask(&settings, &api_key, system, user, 0.7, 500).await?;

        Ok(TextResult {
            content: non_empty_or(content, "No explanation available"),
        })
    }

    pub async fn detect_tone(
        &self,
        message: &MessageData,
        chat_id: Option<&str>,
    ) -> Result<ToneAnalysis, ActionError> {
        let (settings, api_key, _) = self.prepare(Feature::DetectTone, chat_id).await?;
        let raw = self
            .ask(&settings, &api_key, prompts::tone(), message.content.clone(), 0.3, 300)
            .await?;

        match serde_json::from_str::<ToneAnalysis>(strip_code_fence(&raw)) {
            Ok(tone) => Ok(tone),
            Err(e) => {
                tracing::warn!("[AssistantActions] Unparseable tone analysis, using fallback: {}", e);
                Ok(ToneAnalysis::unknown())
            }
        }
    }

    pub async fn generate_reply(
        &self,
        message: &MessageData,
        chat_id: Option<&str>,
    ) -> Result<ReplySuggestions, ActionError> {
        let (settings, api_key, chat) = self.prepare(Feature::GenerateReply, chat_id).await?;
        let language = chat
            .reply_language
            .as_deref()
            .unwrap_or(&settings.general.reply_language);

        let system = prompts::reply(language, chat.custom_prompt.as_deref());
        let user = prompts::message_with_sender("Generate replies to this message:", message);
        let raw = self.ask(&settings, &api_key, system, user, 0.8, 600).await?;

        let body = match strip_code_fence(&raw) {
            "" => "[]",
            body => body,
        };
        let drafts: Vec<ReplyDraft> = serde_json::from_str(body).map_err(|e| {
            tracing::warn!("[AssistantActions] Unparseable reply options: {}", e);
            ActionError::MalformedReplies
        })?;

        let options = drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| ReplyOption {
                id: format!("reply-{}", i),
                tone: draft.tone,
                content: draft.content,
                is_selected: i == 0,
            })
            .collect();

        Ok(ReplySuggestions {
            options,
            context: message.content.clone(),
        })
    }

    /// Summarize the most recent messages of a chat and update its story threads.
    /// Served from the cache when every message was already covered.
    pub async fn generate_summary(
        &self,
        chat_id: &str,
        chat_name: &str,
        is_group: bool,
        messages: &[MessageData],
    ) -> Result<ConversationSummary, ActionError> {
        let (settings, api_key, chat) = self.prepare(Feature::GenerateSummary, Some(chat_id)).await?;
        if messages.is_empty() {
            return Err(ActionError::NoMessages);
        }

        let limit = settings.general.message_limit as usize;
        let window = &messages[messages.len().saturating_sub(limit)..];
        let fingerprints: Vec<String> = window
            .iter()
            .map(|m| message_fingerprint(&m.sender, &m.content))
            .collect();

        let record = self.chats.get_record(chat_id).await?;
        if let Some(record) = &record {
            if let Some(summary) = self.chats.get_chat_summary(chat_id).await? {
                if fingerprints.iter().all(|f| record.message_hashes.contains(f)) {
                    self.chats.record_cache_hit().await?;
                    tracing::debug!("[AssistantActions] Summary for '{}' served from cache", chat_id);
                    return Ok(ConversationSummary {
                        summary,
                        stories: record.stories.clone(),
                        cached: true,
                    });
                }
            }
        }
        self.chats.record_cache_miss().await?;

        let language = chat
            .analysis_language
            .as_deref()
            .unwrap_or(&settings.general.analysis_language);
        let system = prompts::summary(language, chat.custom_prompt.as_deref());
        let user = format!("Summarize this conversation:\n\n{}", prompts::transcript(window));
        let raw = self.ask(&settings, &api_key, system, user, 0.5, 800).await?;

        let draft = parse_summary(&raw, window);
        let now = now_millis();
        let summary = ChatSummary {
            chat_id: chat_id.to_string(),
            summary: draft.summary,
            key_topics: draft.key_topics,
            participants: draft.participants,
            message_count: window.len() as u32,
            last_updated: now,
        };

        let existing = record.as_ref().map(|r| r.stories.as_slice()).unwrap_or_default();
        let stories: Vec<StoryThread> = draft
            .stories
            .into_iter()
            .map(|story| build_story(chat_id, story, existing, window.len() as u32, now))
            .collect();

        if settings.privacy.auto_delete_processed_data {
            tracing::debug!("[AssistantActions] Not persisting summary for '{}'", chat_id);
            return Ok(ConversationSummary {
                summary,
                stories,
                cached: false,
            });
        }

        self.chats.save_chat_summary(&summary).await?;
        for story in &stories {
            self.chats.save_story(chat_id, story.clone()).await?;
        }

        let mut record = match self.chats.get_record(chat_id).await? {
            Some(record) => record,
            None => ChatCacheRecord::new(chat_id, now),
        };
        if !chat_name.is_empty() {
            record.chat_name = chat_name.to_string();
        }
        record.is_group = is_group;
        record.last_analyzed = now;
        for fingerprint in fingerprints {
            if !record.message_hashes.contains(&fingerprint) {
                record.message_hashes.push(fingerprint);
            }
        }
        let overflow = record.message_hashes.len().saturating_sub(MAX_FINGERPRINTS);
        record.message_hashes.drain(..overflow);
        self.chats.save_record(&record).await?;

        tracing::info!(
            "[AssistantActions] Summarized {} messages of '{}' into {} stories",
            window.len(),
            chat_id,
            stories.len()
        );
        Ok(ConversationSummary {
            summary,
            stories: record.stories,
            cached: false,
        })
    }

    /// Check a credential against the models endpoint
    pub async fn validate_api_key(&self, api_key: &str) -> Result<(), ActionError> {
        match self.client.validate_api_key(api_key).await {
            Ok(()) => Ok(()),
            Err(ClientError::Network(e)) => {
                tracing::warn!("[AssistantActions] Credential check failed: {}", e);
                Err(ActionError::ValidationUnavailable)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn non_empty_or(content: String, fallback: &str) -> String {
    if content.trim().is_empty() {
        fallback.to_string()
    } else {
        content
    }
}

/// Structured summary, or the raw answer as the summary text
fn parse_summary(raw: &str, window: &[MessageData]) -> SummaryDraft {
    match serde_json::from_str::<SummaryDraft>(strip_code_fence(raw)) {
        Ok(mut draft) => {
            if draft.participants.is_empty() {
                draft.participants = senders(window);
            }
            draft
        }
        Err(e) => {
            tracing::warn!("[AssistantActions] Unstructured summary, keeping raw text: {}", e);
            SummaryDraft {
                summary: non_empty_or(raw.trim().to_string(), "No summary available"),
                key_topics: Vec::new(),
                participants: senders(window),
                stories: Vec::new(),
            }
        }
    }
}

fn senders(window: &[MessageData]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for message in window.iter().filter(|m| !m.is_outgoing) {
        if !names.contains(&message.sender) {
            names.push(message.sender.clone());
        }
    }
    names
}

/// Match an existing story by title so repeated summaries update it in place
fn build_story(
    chat_id: &str,
    draft: StoryDraft,
    existing: &[StoryThread],
    message_count: u32,
    now: i64,
) -> StoryThread {
    let previous = existing
        .iter()
        .find(|s| s.title.to_lowercase() == draft.title.to_lowercase());

    StoryThread {
        id: previous
            .map(|s| s.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        chat_id: chat_id.to_string(),
        title: draft.title,
        summary: draft.summary,
        key_points: draft.key_points,
        participants: draft.participants,
        message_count: previous.map(|s| s.message_count).unwrap_or(0) + message_count,
        created_at: previous.map(|s| s.created_at).unwrap_or(now),
        updated_at: now,
        is_active: draft.is_active,
        topics: draft.topics,
    }
}
