//! `rivet history`: list saved conversations.

use rivet_config::AppConfig;
use rivet_memory::{ConversationRecord, HistoryStore};

pub async fn run(config: &AppConfig, user_id: &str) -> anyhow::Result<()> {
    let store = HistoryStore::new(config.storage.history_dir.clone());
    let records = store.list(user_id).await?;
    print_conversations(&records);
    Ok(())
}

pub fn print_conversations(records: &[ConversationRecord]) {
    if records.is_empty() {
        println!("  No saved conversations.");
        return;
    }

    println!("  Saved conversations:");
    for record in records {
        println!("{}", describe(record));
    }
}

fn describe(record: &ConversationRecord) -> String {
    format!(
        "    {}  {}  {} messages  ({})",
        record.id,
        record.updated.format("%Y-%m-%d %H:%M"),
        record.messages.len(),
        record.model
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_core::message::Role;

    #[test]
    fn describe_line() {
        let mut record = ConversationRecord::new("ana", "gpt-4o-mini");
        record.id = "ana_1".into();
        record.push(Role::User, "hi");
        record.push(Role::Assistant, "hello");
        let line = describe(&record);
        assert!(line.starts_with("    ana_1  "));
        assert!(line.ends_with("2 messages  (gpt-4o-mini)"));
    }
}
