//! System prompts for each assistant action

use crate::source::MessageData;

/// Display name of a language code as it appears in prompts
pub fn language_name(code: &str) -> String {
    match code {
        "en" => "English".to_string(),
        "ur-roman" => "Roman Urdu (Urdu written in Latin script)".to_string(),
        other => other.to_string(),
    }
}

fn with_custom_instructions(prompt: String, custom: Option<&str>) -> String {
    match custom.map(str::trim).filter(|c| !c.is_empty()) {
        Some(custom) => format!("{}\n\nAdditional instructions for this chat:\n{}", prompt, custom),
        None => prompt,
    }
}

pub fn analyze(language: &str, custom: Option<&str>) -> String {
    let prompt = format!(
        "You are an assistant analyzing chat messages. Give a concise analysis of the message covering:\n\
         1. Key points or main topic\n\
         2. Any implied meaning or context\n\
         3. Things to consider when responding\n\n\
         Respond in {}.\n\
         Keep your response brief and actionable.",
        language_name(language)
    );
    with_custom_instructions(prompt, custom)
}

pub fn translate(target_language: &str) -> String {
    format!(
        "You are a translator. Translate the following message to {}.\n\
         Only provide the translation, no explanations.\n\
         If the message is already in the target language, say so.",
        language_name(target_language)
    )
}

pub fn explain(language: &str, custom: Option<&str>) -> String {
    let prompt = format!(
        "You are an assistant helping a user understand the context of a chat message. Explain:\n\
         1. What the message most likely refers to\n\
         2. Any cultural or contextual references\n\
         3. The implied meaning or subtext\n\n\
         Respond in {}.\n\
         Be concise and helpful.",
        language_name(language)
    );
    with_custom_instructions(prompt, custom)
}

pub fn tone() -> String {
    "Analyze the emotional tone and sentiment of this message. Return a JSON object with:\n\
     {\n  \
       \"primary\": \"main emotional tone (e.g. happy, frustrated, neutral, excited, concerned)\",\n  \
       \"confidence\": 0.0-1.0,\n  \
       \"sentiment\": \"positive|negative|neutral\",\n  \
       \"emotions\": [{\"emotion\": \"name\", \"score\": 0.0-1.0}]\n\
     }\n\
     Only return valid JSON, no other text."
        .to_string()
}

pub fn reply(language: &str, custom: Option<&str>) -> String {
    let prompt = format!(
        "Generate 3 different reply options to this chat message, each with a different tone.\n\
         Return a JSON array with exactly 3 objects:\n\
         [\n  \
           {{\"tone\": \"neutral\", \"content\": \"reply text\"}},\n  \
           {{\"tone\": \"friendly\", \"content\": \"reply text\"}},\n  \
           {{\"tone\": \"professional\", \"content\": \"reply text\"}}\n\
         ]\n\n\
         Guidelines:\n\
         - Keep replies concise and natural\n\
         - Match typical instant-messaging style\n\
         - Respond in {}\n\
         - Only return the JSON array, no other text",
        language_name(language)
    );
    with_custom_instructions(prompt, custom)
}

pub fn summary(language: &str, custom: Option<&str>) -> String {
    let prompt = format!(
        "You summarize chat conversations. Read the transcript and return a JSON object:\n\
         {{\n  \
           \"summary\": \"short overview of the conversation\",\n  \
           \"keyTopics\": [\"topic\"],\n  \
           \"participants\": [\"name\"],\n  \
           \"stories\": [\n    \
             {{\"title\": \"short title\", \"summary\": \"what this thread is about\", \
         \"keyPoints\": [\"point\"], \"participants\": [\"name\"], \"topics\": [\"tag\"], \
         \"isActive\": true}}\n  \
           ]\n\
         }}\n\
         A story is one topical thread within the conversation; mark it inactive when it \
         has clearly concluded.\n\
         Write the text fields in {}.\n\
         Only return valid JSON, no other text.",
        language_name(language)
    );
    with_custom_instructions(prompt, custom)
}

pub fn message_with_sender(intro: &str, message: &MessageData) -> String {
    format!("{}\n\nFrom: {}\nContent: {}", intro, message.sender, message.display_content())
}

/// One line per message, oldest first
pub fn transcript(messages: &[MessageData]) -> String {
    messages
        .iter()
        .filter(|m| !m.is_deleted)
        .map(|m| {
            let sender = if m.is_outgoing { "Me" } else { m.sender.as_str() };
            format!("{}: {}", sender, m.display_content())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
