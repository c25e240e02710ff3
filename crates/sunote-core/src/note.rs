use chrono::Utc;

/// A note as stored and as shown to the user.
///
/// `id == 0` means the note was never persisted; the store assigns a fresh id
/// when such a note is upserted. All timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Scheduled time; `None` means the note has no due date.
    pub due_at: Option<i64>,
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Note {
    /// Build a not-yet-persisted note created at `now`.
    pub fn new(title: impl Into<String>, content: impl Into<String>, due_at: Option<i64>, now: i64) -> Self {
        Self {
            id: 0,
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
            due_at,
        }
    }

    /// Empty note standing in for an id that could not be loaded.
    pub(crate) fn placeholder(id: i64, now: i64) -> Self {
        Self {
            id,
            ..Self::new("", "", None, now)
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    /// Single-line preview of the content, at most `max_len` characters.
    pub fn preview(&self, max_len: usize) -> String {
        let normalized: String = self
            .content
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        let trimmed = normalized.trim();

        if trimmed.chars().count() > max_len {
            let cut: String = trimmed.chars().take(max_len).collect();
            format!("{}...", cut)
        } else {
            trimmed.to_string()
        }
    }
}
