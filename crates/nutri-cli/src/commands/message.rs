use anyhow::Result;

use super::Session;
use crate::render;

pub async fn send(session: &Session, conversation: Option<&str>, content: &str) -> Result<()> {
    match conversation {
        Some(id) => {
            session.store.select(id).await?;
        }
        None => {
            session.store.new_conversation().await;
        }
    }
    session.ensure_can_send(true).await?;

    let outcome = session.store.send(content).await?;
    if let Some(id) = &outcome.navigate_to {
        println!("New conversation: {id}");
    }
    match outcome.reply.as_deref() {
        Some(reply) => println!("{reply}"),
        None => println!("(no reply)"),
    }
    if let Some(conversation) = session.store.active().await {
        if let Some(bot) = conversation.messages.last() {
            print!("{}", render::sources(&bot.sources));
        }
    }
    Ok(())
}

pub async fn edit(session: &Session, conversation: &str, message_id: &str, content: &str) -> Result<()> {
    session.store.select(conversation).await?;
    session.store.edit_message(message_id, content).await?;
    print_active(session).await;
    Ok(())
}

pub async fn regenerate(session: &Session, conversation: &str, message_id: &str) -> Result<()> {
    session.store.select(conversation).await?;
    session.ensure_can_send(false).await?;
    session.store.regenerate(message_id).await?;
    print_active(session).await;
    Ok(())
}

pub async fn switch_version(
    session: &Session,
    conversation: &str,
    message_id: &str,
    version: usize,
) -> Result<()> {
    session.store.select(conversation).await?;
    if !session.store.switch_version(message_id, version).await? {
        println!("Version {version} is already selected.");
    }
    print_active(session).await;
    Ok(())
}

pub async fn truncate(session: &Session, conversation: &str, message_id: &str) -> Result<()> {
    session.store.select(conversation).await?;
    let removed = session.store.delete_and_following(message_id).await?;
    println!("✅ Removed {removed} message(s).");
    Ok(())
}

async fn print_active(session: &Session) {
    if let Some(conversation) = session.store.active().await {
        print!("{}", render::transcript(&conversation));
    }
}
