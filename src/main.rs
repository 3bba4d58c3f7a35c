use anyhow::{Context, Result};
use chatlens::actions::{ConversationSummary, ReplySuggestions, TextResult, ToneAnalysis, Translation};
use chatlens::api::{
    ApiKeyPayload, ChatRef, MessagePayload, SummaryPayload, TranslatePayload,
};
use chatlens::cache::{CacheStatistics, StoryThread};
use chatlens::cli::{settings_patch, Cli, Commands, MessageArgs, SettingsAction};
use chatlens::preferences::UserSettings;
use chatlens::source::{MessageData, MessageSource, TranscriptSource};
use chatlens::utils::{display, text::format_bytes};
use chatlens::{Assistant, Request, Response, Settings};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::new().context("Failed to load configuration")?;

    // Logs go to stderr so `serve` can own stdout
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let assistant = Assistant::start(&settings).await?;

    let result = match cli.command {
        Commands::Settings { action } => handle_settings(&assistant, action).await,
        Commands::Stats => handle_stats(&assistant).await,
        Commands::Clear { chat } => handle_clear(&assistant, chat).await,
        Commands::Stories { chat } => handle_stories(&assistant, chat).await,
        Commands::ValidateKey { key } => handle_validate(&assistant, key).await,
        Commands::Analyze(args) => handle_text(&assistant, Request::AnalyzeMessage(message_payload(args))).await,
        Commands::Explain(args) => handle_text(&assistant, Request::ExplainContext(message_payload(args))).await,
        Commands::Translate {
            message,
            target_language,
        } => handle_translate(&assistant, message, target_language).await,
        Commands::Tone(args) => handle_tone(&assistant, args).await,
        Commands::Reply(args) => handle_reply(&assistant, args).await,
        Commands::Summarize { transcript, chat } => handle_summarize(&assistant, &transcript, chat).await,
        Commands::Cleanup => handle_cleanup(&assistant).await,
        Commands::Serve => {
            let assistant = Arc::new(assistant);
            let result = handle_serve(assistant.clone()).await;
            return match Arc::try_unwrap(assistant) {
                Ok(assistant) => {
                    assistant.shutdown().await?;
                    result
                }
                Err(_) => result,
            };
        }
    };

    // Shutdown gracefully
    assistant.shutdown().await?;

    if let Err(e) = &result {
        display::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    result
}

/// Payload of a successful response, or its error
fn expect_data<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.success {
        anyhow::bail!(response.error.unwrap_or_else(|| "Unknown error".to_string()));
    }
    serde_json::from_value(response.data.unwrap_or(Value::Null)).context("Unexpected response payload")
}

fn expect_success(response: Response) -> Result<()> {
    if !response.success {
        anyhow::bail!(response.error.unwrap_or_else(|| "Unknown error".to_string()));
    }
    Ok(())
}

fn message_payload(args: MessageArgs) -> MessagePayload {
    MessagePayload {
        message_data: MessageData::text(args.sender, args.text),
        chat_id: args.chat,
    }
}

async fn handle_settings(assistant: &Assistant, action: SettingsAction) -> Result<()> {
    let settings: UserSettings = match action {
        SettingsAction::Show => expect_data(assistant.request(Request::GetSettings).await?)?,
        SettingsAction::Set { path, value } => {
            let patch = settings_patch(&path, &value)?;
            let updated = expect_data(assistant.request(Request::UpdateSettings(patch)).await?)?;
            display::print_success(&format!("Updated {}", path));
            updated
        }
        SettingsAction::ApiKey { key } => {
            let patch = json!({"ai": {"apiKey": key}});
            let updated = expect_data(assistant.request(Request::UpdateSettings(patch)).await?)?;
            display::print_success("API key saved");
            updated
        }
    };

    let mut shown = serde_json::to_value(&settings)?;
    if let Some(key) = shown.pointer_mut("/ai/apiKey") {
        if key.as_str().is_some_and(|k| !k.is_empty()) {
            *key = Value::String("********".to_string());
        }
    }
    display::print_header("Settings");
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

async fn handle_stats(assistant: &Assistant) -> Result<()> {
    let stats: CacheStatistics = expect_data(assistant.request(Request::GetCacheStats).await?)?;

    display::print_header("Cache Statistics");
    display::print_field("Total size", format_bytes(stats.total_size));
    display::print_field("Chats", stats.chat_count);
    display::print_field("Stories", stats.story_count);
    display::print_field("Hits", stats.hits);
    display::print_field("Misses", stats.misses);
    let last_cleanup = chrono::DateTime::from_timestamp_millis(stats.last_cleanup)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| stats.last_cleanup.to_string());
    display::print_field("Last cleanup", last_cleanup);
    Ok(())
}

async fn handle_clear(assistant: &Assistant, chat: Option<String>) -> Result<()> {
    match chat {
        Some(chat_id) => {
            let request = Request::ClearChatCache(ChatRef {
                chat_id: chat_id.clone(),
            });
            expect_success(assistant.request(request).await?)?;
            display::print_success(&format!("Cleared cache for {}", chat_id));
        }
        None => {
            expect_success(assistant.request(Request::ClearCache).await?)?;
            display::print_success("Cache cleared");
        }
    }
    Ok(())
}

async fn handle_stories(assistant: &Assistant, chat_id: String) -> Result<()> {
    let stories: Vec<StoryThread> =
        expect_data(assistant.request(Request::GetStories(ChatRef { chat_id: chat_id.clone() })).await?)?;

    display::print_header(&format!("Stories for {}", chat_id));
    if stories.is_empty() {
        display::print_info("No stories cached");
    }
    print_stories(&stories);
    Ok(())
}

fn print_stories(stories: &[StoryThread]) {
    for story in stories {
        let state = if story.is_active { "active" } else { "closed" };
        display::print_success(&format!("{} ({})", story.title, state));
        println!("  {}", story.summary);
        for point in &story.key_points {
            println!("  - {}", point);
        }
    }
}

async fn handle_validate(assistant: &Assistant, key: String) -> Result<()> {
    let request = Request::ValidateApiKey(ApiKeyPayload { api_key: key });
    expect_success(assistant.request(request).await?)?;
    display::print_success("API key is valid");
    Ok(())
}

async fn handle_text(assistant: &Assistant, request: Request) -> Result<()> {
    display::print_info("Sending request...");
    let result: TextResult = expect_data(assistant.request(request).await?)?;
    println!("\n{}", result.content);
    Ok(())
}

async fn handle_translate(
    assistant: &Assistant,
    args: MessageArgs,
    target_language: Option<String>,
) -> Result<()> {
    let request = Request::TranslateMessage(TranslatePayload {
        message_data: MessageData::text(args.sender, args.text),
        target_language,
        chat_id: args.chat,
    });
    let translation: Translation = expect_data(assistant.request(request).await?)?;

    display::print_field("Language", &translation.target_language);
    println!("\n{}", translation.translated_text);
    Ok(())
}

async fn handle_tone(assistant: &Assistant, args: MessageArgs) -> Result<()> {
    let tone: ToneAnalysis = expect_data(assistant.request(Request::DetectTone(message_payload(args))).await?)?;

    display::print_header("Tone");
    display::print_field("Primary", &tone.primary);
    display::print_field("Sentiment", &tone.sentiment);
    display::print_field("Confidence", format!("{:.0}%", tone.confidence * 100.0));
    for emotion in &tone.emotions {
        display::print_field(&emotion.emotion, format!("{:.2}", emotion.score));
    }
    Ok(())
}

async fn handle_reply(assistant: &Assistant, args: MessageArgs) -> Result<()> {
    let replies: ReplySuggestions =
        expect_data(assistant.request(Request::GenerateReply(message_payload(args))).await?)?;

    display::print_header("Suggested replies");
    for option in &replies.options {
        let marker = if option.is_selected { "*" } else { " " };
        println!("{} [{}] {}", marker, option.tone, option.content);
    }
    Ok(())
}

async fn handle_summarize(assistant: &Assistant, path: &Path, chat: Option<String>) -> Result<()> {
    let source = TranscriptSource::from_file(path).await?;
    let messages = source.extract_visible_messages().await?;
    let chat_id = match chat.or_else(|| source.current_conversation_id()) {
        Some(chat_id) => chat_id,
        None => anyhow::bail!("Transcript has no chat id"),
    };

    display::print_info(&format!("Summarizing {} messages...", messages.len()));
    let request = Request::GenerateSummary(SummaryPayload {
        chat_id,
        chat_name: source.transcript().chat_name.clone(),
        is_group: source.transcript().is_group,
        messages,
    });
    let result: ConversationSummary = expect_data(assistant.request(request).await?)?;

    display::print_header("Summary");
    if result.cached {
        display::print_warning("(from cache, no new messages)");
    }
    println!("{}", result.summary.summary);
    if !result.summary.key_topics.is_empty() {
        display::print_field("Topics", result.summary.key_topics.join(", "));
    }
    if !result.stories.is_empty() {
        display::print_header("Stories");
        print_stories(&result.stories);
    }
    Ok(())
}

async fn handle_cleanup(assistant: &Assistant) -> Result<()> {
    let report = assistant.run_cleanup().await?;
    if report.skipped {
        display::print_warning("Auto-cleanup is disabled in settings; nothing was removed");
        return Ok(());
    }

    display::print_header("Cleanup");
    display::print_field("Stories removed", report.stories_removed);
    display::print_field("Chats expired", report.records_expired);
    display::print_field("Chats evicted", report.records_evicted);
    display::print_field("Cache size", format_bytes(report.total_size_after));
    Ok(())
}

/// One request per stdin line; answers are written as they complete and echo
/// the request's `id` when it has one
async fn handle_serve(assistant: Arc<Assistant>) -> Result<()> {
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut in_flight = JoinSet::new();
    tracing::info!("Serving requests on stdin");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let assistant = assistant.clone();
        let out_tx = out_tx.clone();
        in_flight.spawn(async move {
            let answer = answer_line(&assistant, &line).await;
            let _ = out_tx.send(format!("{}\n", answer)).await;
        });
    }

    while in_flight.join_next().await.is_some() {}
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

async fn answer_line(assistant: &Assistant, line: &str) -> Value {
    let mut raw: Value = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(e) => return envelope(Response::failure(format!("Invalid request: {}", e)), None),
    };
    let id = raw.as_object_mut().and_then(|obj| obj.remove("id"));

    let response = match serde_json::from_value::<Request>(raw) {
        Ok(request) => match assistant.request(request).await {
            Ok(response) => response,
            Err(e) => Response::failure(e.to_string()),
        },
        Err(e) => Response::failure(format!("Invalid request: {}", e)),
    };
    envelope(response, id)
}

fn envelope(response: Response, id: Option<Value>) -> Value {
    let mut value = serde_json::to_value(&response).unwrap_or_else(|_| json!({"success": false}));
    if let (Some(id), Some(obj)) = (id, value.as_object_mut()) {
        obj.insert("id".to_string(), id);
    }
    value
}
