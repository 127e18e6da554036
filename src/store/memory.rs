//! 인메모리 저장소

use super::{PollPatch, PollStore};
use crate::error::StoreError;
use crate::session::Poll;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// 프로세스 메모리에 투표 기록 보관 (poll_id -> Poll)
#[derive(Default)]
pub struct MemoryPollStore {
    polls: DashMap<String, Poll>,
}

impl MemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn create(&self, poll: &Poll) -> Result<(), StoreError> {
        match self.polls.entry(poll.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(poll.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(poll.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, poll_id: &str, patch: PollPatch) -> Result<(), StoreError> {
        let mut poll = self
            .polls
            .get_mut(poll_id)
            .ok_or_else(|| StoreError::NotFound(poll_id.to_string()))?;
        if let Some(is_active) = patch.is_active {
            poll.is_active = is_active;
        }
        if let Some(options) = patch.options {
            poll.options = options;
        }
        Ok(())
    }

    async fn get(&self, poll_id: &str) -> Result<Option<Poll>, StoreError> {
        Ok(self.polls.get(poll_id).map(|p| p.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Poll>, StoreError> {
        let mut polls: Vec<Poll> = self.polls.iter().map(|p| p.value().clone()).collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(polls)
    }

    async fn list_active(&self) -> Result<Vec<Poll>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .collect())
    }
}
