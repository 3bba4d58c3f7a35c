use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chatlens")]
#[command(author, version, about = "AI assistant for chat conversations", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show or change the stored user settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Show cache statistics
    Stats,

    /// Clear the whole cache, or one chat's cached stories
    Clear {
        #[arg(short, long)]
        chat: Option<String>,
    },

    /// List the story threads of a chat
    Stories { chat: String },

    /// Check an API key against the models endpoint
    ValidateKey { key: String },

    /// Analyze a message
    Analyze(MessageArgs),

    /// Translate a message
    Translate {
        #[command(flatten)]
        message: MessageArgs,

        /// Language code, defaults to the chat or global setting
        #[arg(short = 'l', long)]
        target_language: Option<String>,
    },

    /// Explain the context of a message
    Explain(MessageArgs),

    /// Detect tone and sentiment of a message
    Tone(MessageArgs),

    /// Suggest replies to a message
    Reply(MessageArgs),

    /// Summarize a conversation exported as JSON
    Summarize {
        transcript: PathBuf,

        /// Override the chat id stored in the transcript
        #[arg(short, long)]
        chat: Option<String>,
    },

    /// Run one cache cleanup sweep now
    Cleanup,

    /// Answer JSON requests on stdin, one per line, with the cleanup scheduler running
    Serve,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the current settings
    Show,

    /// Set one value by dotted path, e.g. `cache.retentionDays 14`
    Set { path: String, value: String },

    /// Store the API key
    ApiKey { key: String },
}

#[derive(Args)]
pub struct MessageArgs {
    /// Message text
    pub text: String,

    #[arg(short, long, default_value = "Unknown")]
    pub sender: String,

    /// Chat id for per-chat settings and privacy checks
    #[arg(short, long)]
    pub chat: Option<String>,
}
