//! Request dispatch
//!
//! Information Hiding:
//! - Which store or action serves each request hidden behind `dispatch`
//! - Failures of any kind become the error envelope

use crate::actions::AssistantActions;
use crate::api::{Request, Response};
use crate::cache::{CacheMaintenance, ChatCacheStore};
use crate::core::llm::LLMClient;
use crate::preferences::SettingsStore;
use crate::storage::KeyValueStore;
use crate::utils::time::now_millis;
use std::sync::Arc;

/// Stores, maintenance and actions over one storage backend
#[derive(Clone)]
pub struct AssistantService {
    pub settings: SettingsStore,
    pub chats: ChatCacheStore,
    pub maintenance: CacheMaintenance,
    pub actions: AssistantActions,
}

impl AssistantService {
    pub fn new(store: Arc<dyn KeyValueStore>, client: LLMClient, fallback_api_key: Option<String>) -> Self {
        let settings = SettingsStore::new(store.clone());
        let chats = ChatCacheStore::new(store, settings.clone());
        let maintenance = CacheMaintenance::new(chats.clone());
        let actions = AssistantActions::new(settings.clone(), chats.clone(), client, fallback_api_key);
        Self {
            settings,
            chats,
            maintenance,
            actions,
        }
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let kind = request.kind();
        let response = self.handle(request).await;
        match &response.error {
            Some(error) => tracing::warn!("[AssistantService] {} failed: {}", kind, error),
            None => tracing::debug!("[AssistantService] {} succeeded", kind),
        }
        response
    }

    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::GetSettings => Response::from_result(self.settings.get_settings().await),
            Request::SaveSettings(settings) => {
                Response::from_result(self.settings.save_settings(&settings).await)
            }
            Request::UpdateSettings(partial) => {
                Response::from_result(self.settings.update_settings(&partial).await)
            }
            Request::GetCacheStats => Response::from_result(self.chats.get_cache_stats().await),
            Request::ClearCache => Response::from_result(self.chats.clear_all().await),
            Request::ClearChatCache(chat) => {
                Response::from_result(self.chats.clear_record(&chat.chat_id).await)
            }
            Request::ClearChatData(chat) => {
                Response::from_result(self.chats.clear_chat_data(&chat.chat_id).await)
            }
            Request::GetStories(chat) => Response::from_result(self.chats.get_stories(&chat.chat_id).await),
            Request::DeleteStory(story) => Response::from_result(
                self.chats
                    .delete_story(&story.chat_id, &story.story_id)
                    .await
                    .and_then(|deleted| {
                        if deleted {
                            Ok(())
                        } else {
                            Err(anyhow::anyhow!(
                                "Story {} not found in chat {}",
                                story.story_id,
                                story.chat_id
                            ))
                        }
                    }),
            ),
            Request::GetChatContext(query) => Response::from_result(
                self.chats
                    .get_chat_context(&query.chat_id, &query.chat_name, query.is_group)
                    .await,
            ),
            Request::SaveChatSettings(chat_settings) => {
                Response::from_result(self.chats.save_chat_settings(&chat_settings).await)
            }
            Request::RunCleanup => {
                Response::from_result(self.maintenance.perform_cache_cleanup(now_millis()).await)
            }
            Request::ValidateApiKey(payload) => {
                Response::from_result(self.actions.validate_api_key(&payload.api_key).await)
            }
            Request::AnalyzeMessage(payload) => Response::from_result(
                self.actions
                    .analyze_message(&payload.message_data, payload.chat_id.as_deref())
                    .await,
            ),
            Request::TranslateMessage(payload) => Response::from_result(
                self.actions
                    .translate_message(
                        &payload.message_data,
                        payload.target_language.as_deref(),
                        payload.chat_id.as_deref(),
                    )
                    .await,
            ),
            Request::ExplainContext(payload) => Response::from_result(
                self.actions
                    .explain_context(&payload.message_data, payload.chat_id.as_deref())
                    .await,
            ),
            Request::DetectTone(payload) => Response::from_result(
                self.actions
                    .detect_tone(&payload.message_data, payload.chat_id.as_deref())
                    .await,
            ),
            Request::GenerateReply(payload) => Response::from_result(
                self.actions
                    .generate_reply(&payload.message_data, payload.chat_id.as_deref())
                    .await,
            ),
            Request::GenerateSummary(payload) => Response::from_result(
                self.actions
                    .generate_summary(
                        &payload.chat_id,
                        &payload.chat_name,
                        payload.is_group,
                        &payload.messages,
                    )
                    .await,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatRef, StoryRef};
    use crate::cache::test_support::story;
    use crate::core::llm::{ClientError, CompletionRequest, CompletionResponse, CompletionTransport, RetryPolicy};
    use crate::storage::keys;
    use crate::storage::memory::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct OfflineTransport;

    #[async_trait]
    impl CompletionTransport for OfflineTransport {
        async fn send(&self, _request: &CompletionRequest, _api_key: &str) -> Result<CompletionResponse, ClientError> {
            Err(ClientError::Network("offline".to_string()))
        }

        async fn check_credential(&self, _api_key: &str) -> Result<(), ClientError> {
            Err(ClientError::Network("offline".to_string()))
        }
    }

    fn service() -> AssistantService {
        let client = LLMClient::new(Arc::new(OfflineTransport), RetryPolicy::default());
        AssistantService::new(Arc::new(InMemoryStore::new()), client, None)
    }

    #[tokio::test]
    async fn test_get_settings_returns_defaults() {
        let response = service().dispatch(Request::GetSettings).await;
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["general"]["messageLimit"], json!(20));
        assert_eq!(data["ai"]["model"], json!("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let service = service();
        let mut settings = service.settings.get_settings().await.unwrap();
        settings.general.message_limit = 51;

        let response = service.dispatch(Request::SaveSettings(Box::new(settings))).await;
        assert!(!response.success);
        assert!(response.error.unwrap().contains("messageLimit"));
    }

    #[tokio::test]
    async fn test_action_without_key_fails_in_envelope() {
        let request: Request = serde_json::from_value(json!({
            "type": "ANALYZE_MESSAGE",
            "payload": {"messageData": {"sender": "Bob", "content": "hi"}, "chatId": "c1"}
        }))
        .unwrap();

        let response = service().dispatch(request).await;
        assert_eq!(
            response,
            Response::failure("API key not configured")
        );
    }

    #[tokio::test]
    async fn test_story_lifecycle() {
        let service = service();
        service.chats.save_story("c1", story("s1", "c1", 1, true)).await.unwrap();

        let stories = service
            .dispatch(Request::GetStories(ChatRef {
                chat_id: "c1".to_string(),
            }))
            .await;
        assert_eq!(stories.data.unwrap().as_array().unwrap().len(), 1);

        let delete = |story_id: &str| {
            Request::DeleteStory(StoryRef {
                chat_id: "c1".to_string(),
                story_id: story_id.to_string(),
            })
        };
        assert!(service.dispatch(delete("s1")).await.success);
        let missing = service.dispatch(delete("s1")).await;
        assert_eq!(missing.error.as_deref(), Some("Story s1 not found in chat c1"));
    }

    #[tokio::test]
    async fn test_run_cleanup_reports() {
        let response = service().dispatch(Request::RunCleanup).await;
        assert!(response.success);
        assert_eq!(response.data.unwrap()["skipped"], json!(false));
    }

    #[tokio::test]
    async fn test_oversized_cache_budget() {
        let backend = Arc::new(InMemoryStore::new());
        let client = LLMClient::new(Arc::new(OfflineTransport), RetryPolicy::default());
        let service = AssistantService::new(backend.clone(), client, None);

        let rejected = service
            .dispatch(Request::UpdateSettings(json!({"cache": {"maxCacheSize": 17_592_186_044_416u64}})))
            .await;
        assert!(!rejected.success);
        assert!(rejected.error.unwrap().contains("maxCacheSize"));

        // A document written by another writer still sweeps without overflow
        backend
            .set(keys::SETTINGS, json!({"cache": {"maxCacheSize": 17_592_186_044_416u64}}))
            .await
            .unwrap();
        service.chats.save_story("c1", story("s1", "c1", 1, true)).await.unwrap();

        let response = service.dispatch(Request::RunCleanup).await;
        assert!(response.success, "{:?}", response.error);
        assert_eq!(response.data.unwrap()["recordsEvicted"], json!(0));
    }

    #[tokio::test]
    async fn test_tone_respects_excluded_chats() {
        let service = service();
        service
            .dispatch(Request::UpdateSettings(json!({
                "ai": {"apiKey": "sk-test"},
                "privacy": {"excludedChats": ["private@c.us"]}
            })))
            .await;

        let request: Request = serde_json::from_value(json!({
            "type": "DETECT_TONE",
            "payload": {"messageData": {"sender": "Bob", "content": "ugh"}, "chatId": "private@c.us"}
        }))
        .unwrap();
        let response = service.dispatch(request).await;
        assert_eq!(response, Response::failure("Chat private@c.us is excluded by privacy settings"));
    }

    #[tokio::test]
    async fn test_validate_key_offline() {
        let response = service()
            .dispatch(Request::ValidateApiKey(crate::api::ApiKeyPayload {
                api_key: "sk-test".to_string(),
            }))
            .await;
        assert_eq!(response.error.as_deref(), Some("Failed to validate API key"));
    }
}
