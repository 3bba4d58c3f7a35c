//! Command surface
//!
//! Requests travel as `{"type": "GET_SETTINGS", "payload": {...}}` and every
//! answer is the `{success, data?, error?}` envelope.

use crate::cache::ChatSettings;
use crate::preferences::UserSettings;
use crate::source::MessageData;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRef {
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRef {
    pub chat_id: String,
    pub story_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContextQuery {
    pub chat_id: String,
    #[serde(default)]
    pub chat_name: String,
    #[serde(default)]
    pub is_group: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyPayload {
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub message_data: MessageData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatePayload {
    pub message_data: MessageData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPayload {
    pub chat_id: String,
    #[serde(default)]
    pub chat_name: String,
    #[serde(default)]
    pub is_group: bool,
    pub messages: Vec<MessageData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    GetSettings,
    SaveSettings(Box<UserSettings>),
    /// Partial settings document, deep-merged onto the current settings
    UpdateSettings(Value),
    GetCacheStats,
    ClearCache,
    ClearChatCache(ChatRef),
    ClearChatData(ChatRef),
    GetStories(ChatRef),
    DeleteStory(StoryRef),
    GetChatContext(ChatContextQuery),
    SaveChatSettings(ChatSettings),
    RunCleanup,
    ValidateApiKey(ApiKeyPayload),
    AnalyzeMessage(MessagePayload),
    TranslateMessage(TranslatePayload),
    ExplainContext(MessagePayload),
    DetectTone(MessagePayload),
    GenerateReply(MessagePayload),
    GenerateSummary(SummaryPayload),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetSettings => "GET_SETTINGS",
            Request::SaveSettings(_) => "SAVE_SETTINGS",
            Request::UpdateSettings(_) => "UPDATE_SETTINGS",
            Request::GetCacheStats => "GET_CACHE_STATS",
            Request::ClearCache => "CLEAR_CACHE",
            Request::ClearChatCache(_) => "CLEAR_CHAT_CACHE",
            Request::ClearChatData(_) => "CLEAR_CHAT_DATA",
            Request::GetStories(_) => "GET_STORIES",
            Request::DeleteStory(_) => "DELETE_STORY",
            Request::GetChatContext(_) => "GET_CHAT_CONTEXT",
            Request::SaveChatSettings(_) => "SAVE_CHAT_SETTINGS",
            Request::RunCleanup => "RUN_CLEANUP",
            Request::ValidateApiKey(_) => "VALIDATE_API_KEY",
            Request::AnalyzeMessage(_) => "ANALYZE_MESSAGE",
            Request::TranslateMessage(_) => "TRANSLATE_MESSAGE",
            Request::ExplainContext(_) => "EXPLAIN_CONTEXT",
            Request::DetectTone(_) => "DETECT_TONE",
            Request::GenerateReply(_) => "GENERATE_REPLY",
            Request::GenerateSummary(_) => "GENERATE_SUMMARY",
        }
    }

    /// Requests that reach the completion service
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Request::ValidateApiKey(_)
                | Request::AnalyzeMessage(_)
                | Request::TranslateMessage(_)
                | Request::ExplainContext(_)
                | Request::DetectTone(_)
                | Request::GenerateReply(_)
                | Request::GenerateSummary(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Envelope for a result; `()` and other `null` payloads carry no data
    pub fn from_result<T: Serialize, E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(Value::Null) => Self::ok(),
                Ok(data) => Self {
                    success: true,
                    data: Some(data),
                    error: None,
                },
                Err(e) => Self::failure(format!("Failed to encode response: {}", e)),
            },
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unit_request_without_payload() {
        let request: Request = serde_json::from_value(json!({"type": "GET_CACHE_STATS"})).unwrap();
        assert_eq!(request, Request::GetCacheStats);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"type": "GET_CACHE_STATS"})
        );
    }

    #[test]
    fn test_request_with_camel_case_payload() {
        let request: Request = serde_json::from_value(json!({
            "type": "TRANSLATE_MESSAGE",
            "payload": {
                "messageData": {"sender": "Bob", "content": "Hola", "isOutgoing": false},
                "targetLanguage": "en"
            }
        }))
        .unwrap();

        match &request {
            Request::TranslateMessage(payload) => {
                assert_eq!(payload.message_data.content, "Hola");
                assert_eq!(payload.target_language.as_deref(), Some("en"));
                assert!(payload.chat_id.is_none());
            }
            other => panic!("unexpected request {:?}", other),
        }
        assert!(request.is_remote());
        assert_eq!(request.kind(), "TRANSLATE_MESSAGE");
    }

    #[test]
    fn test_api_key_payload() {
        let request: Request = serde_json::from_value(json!({
            "type": "VALIDATE_API_KEY",
            "payload": {"apiKey": "sk-test"}
        }))
        .unwrap();
        assert_eq!(
            request,
            Request::ValidateApiKey(ApiKeyPayload {
                api_key: "sk-test".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<Request>(json!({"type": "SELF_DESTRUCT"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = Response::from_result::<_, String>(Ok(()));
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"success": true}));

        let data = Response::from_result::<_, String>(Ok(json!({"content": "hi"})));
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"success": true, "data": {"content": "hi"}})
        );

        let failed = Response::from_result::<(), _>(Err("API key not configured"));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"success": false, "error": "API key not configured"})
        );
    }
}
