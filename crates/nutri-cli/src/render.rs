//! Plain-text rendering for the terminal.

use anyhow::{Result, bail};
use nutri_application::BulkOutcome;
use nutri_core::conversation::{Conversation, ConversationSummary, Message, MessageRole, MessageState, Source};
use std::fmt::Write;

pub fn summary_line(summary: &ConversationSummary) -> String {
    let age = summary
        .age_context
        .map(|a| format!("age {a}"))
        .unwrap_or_else(|| "no age".to_string());
    let archived = if summary.archived { " [archived]" } else { "" };
    format!(
        "{}  {}  ({}, {} messages, {}){}",
        summary.id,
        summary.title,
        age,
        summary.message_count,
        summary.updated_at.format("%Y-%m-%d %H:%M"),
        archived
    )
}

pub fn transcript(conversation: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", conversation.title);
    if let Some(age) = conversation.age_context {
        let _ = writeln!(out, "Age: {age}");
    }
    for message in &conversation.messages {
        out.push('\n');
        out.push_str(&message_block(message));
    }
    out
}

fn message_block(message: &Message) -> String {
    let mut out = String::new();
    let who = match message.role {
        MessageRole::User => "You",
        MessageRole::Bot => "Nutri",
    };
    let mut tags = Vec::new();
    if message.versions.len() > 1 {
        tags.push(format!(
            "version {}/{}",
            message.current_version_index,
            message.versions.len()
        ));
    }
    if message.is_edited {
        tags.push("edited".to_string());
    }
    match message.state() {
        MessageState::Pending => tags.push("sending".to_string()),
        MessageState::Regenerating => tags.push("generating".to_string()),
        MessageState::Committed => {}
    }
    let tags = if tags.is_empty() {
        String::new()
    } else {
        format!(" ({})", tags.join(", "))
    };

    let _ = writeln!(out, "[{}] {}{}:", message.id, who, tags);
    let _ = writeln!(out, "{}", message.content);
    out.push_str(&sources(&message.sources));
    out
}

pub fn sources(sources: &[Source]) -> String {
    let mut out = String::new();
    for source in sources {
        match &source.url {
            Some(url) => {
                let _ = writeln!(out, "  - {} <{}>", source.title, url);
            }
            None => {
                let _ = writeln!(out, "  - {}", source.title);
            }
        }
    }
    out
}

pub fn print_bulk(verb: &str, outcome: &BulkOutcome) {
    for id in &outcome.succeeded {
        println!("✅ {verb} {id}");
    }
    for (id, error) in &outcome.failed {
        eprintln!("❌ {id}: {error}");
    }
}

pub fn bulk_result(outcome: BulkOutcome) -> Result<()> {
    if !outcome.is_complete() {
        bail!("{} of {} failed", outcome.failed.len(), outcome.failed.len() + outcome.succeeded.len());
    }
    Ok(())
}
