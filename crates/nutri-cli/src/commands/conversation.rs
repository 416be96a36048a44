use anyhow::Result;

use super::Session;
use crate::render;

pub async fn list(session: &Session, include_archived: bool) -> Result<()> {
    let summaries = session.store.list(include_archived).await?;
    if summaries.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }
    for summary in &summaries {
        println!("{}", render::summary_line(summary));
    }
    Ok(())
}

pub async fn show(session: &Session, id: &str) -> Result<()> {
    let conversation = session.store.select(id).await?;
    print!("{}", render::transcript(&conversation));
    Ok(())
}

pub async fn rename(session: &Session, id: &str, title: &str) -> Result<()> {
    session.store.rename(id, title).await?;
    println!("✅ Renamed {id}.");
    Ok(())
}

pub async fn archive(session: &Session, ids: &[String]) -> Result<()> {
    let outcome = session.store.archive_many(ids).await;
    render::print_bulk("Archived", &outcome);
    render::bulk_result(outcome)
}

pub async fn unarchive(session: &Session, id: &str) -> Result<()> {
    session.store.unarchive(id).await?;
    println!("✅ Unarchived {id}.");
    Ok(())
}

pub async fn delete(session: &Session, ids: &[String]) -> Result<()> {
    let outcome = session.store.delete_many(ids).await;
    render::print_bulk("Deleted", &outcome);
    render::bulk_result(outcome)
}
