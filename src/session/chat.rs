//! 채팅 중계

use super::generate_id;
use crate::error::CommandError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender: String,
    pub is_teacher: bool,
    pub timestamp: DateTime<Utc>,
}

/// 최근 메시지만 유지하는 채팅 로그 (오래된 것부터 제거)
#[derive(Debug)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn post(
        &mut self,
        text: &str,
        sender: &str,
        is_teacher: bool,
        now: DateTime<Utc>,
    ) -> Result<&ChatMessage, CommandError> {
        if text.trim().is_empty() || sender.trim().is_empty() {
            return Err(CommandError::Validation("Chat message needs text and sender".into()));
        }

        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(ChatMessage {
            id: generate_id(),
            text: text.to_string(),
            sender: sender.to_string(),
            is_teacher,
            timestamp: now,
        });

        Ok(self.messages.back().expect("message was just pushed"))
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }
}
