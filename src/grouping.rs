use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::schema::{Conversation, LogEntry};

#[derive(Debug)]
struct ConversationBuffer {
    user_id: Option<String>,
    entries: Vec<LogEntry>,
    last_entry_time: Option<DateTime<Utc>>,
}

impl ConversationBuffer {
    fn new() -> Self {
        Self {
            user_id: None,
            entries: Vec::new(),
            last_entry_time: None,
        }
    }

    fn should_flush(&self, next: &LogEntry, gap: Duration) -> bool {
        if self.entries.is_empty() {
            return false;
        }

        if self.user_id.as_deref() != Some(next.user_id.as_str()) {
            return true;
        }

        // Gap equal to the threshold still belongs to the same conversation
        match self.last_entry_time {
            Some(last) => next.timestamp - last > gap,
            None => false,
        }
    }

    fn add_entry(&mut self, entry: LogEntry) {
        if self.user_id.is_none() {
            self.user_id = Some(entry.user_id.clone());
        }
        self.last_entry_time = Some(entry.timestamp);
        self.entries.push(entry);
    }

    fn take_conversation(&mut self, id: String) -> Option<Conversation> {
        let user_id = self.user_id.take()?;
        self.last_entry_time = None;
        let entries = std::mem::take(&mut self.entries);
        if entries.is_empty() {
            return None;
        }
        Some(Conversation { id, user_id, entries })
    }
}

/// Splits entries into per-user conversations wherever consecutive entries
/// are more than `gap` apart. Entries with equal timestamps keep their
/// arrival order.
pub fn group_conversations(mut entries: Vec<LogEntry>, gap: Duration) -> Vec<Conversation> {
    // `sort_by` is stable
    entries.sort_by(|a, b| {
        a.user_id
            .cmp(&b.user_id)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    let mut conversations = Vec::new();
    let mut buffer = ConversationBuffer::new();
    let next_id = |conversations: &Vec<Conversation>| format!("conv_{}", conversations.len() + 1);

    for entry in entries {
        if buffer.should_flush(&entry, gap) {
            let id = next_id(&conversations);
            conversations.extend(buffer.take_conversation(id));
        }
        buffer.add_entry(entry);
    }
    let id = next_id(&conversations);
    conversations.extend(buffer.take_conversation(id));

    info!(count = conversations.len(), "Grouped into {} conversations", conversations.len());
    conversations
}
