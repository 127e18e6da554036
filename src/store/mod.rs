//! 투표 기록 저장소 어댑터
//!
//! 실시간 상태는 코디네이터가 소유하고, 저장소에는 생성/종료 시점의 스냅샷만
//! 기록한다. 쓰기는 별도 태스크에서 순서대로 처리되며 실패는 로그로만 남는다.

mod memory;

pub use memory::MemoryPollStore;

use crate::error::StoreError;
use crate::session::{Poll, PollOption};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 부분 업데이트 필드
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollPatch {
    pub is_active: Option<bool>,
    pub options: Option<Vec<PollOption>>,
}

#[async_trait]
pub trait PollStore: Send + Sync {
    async fn create(&self, poll: &Poll) -> Result<(), StoreError>;

    async fn update(&self, poll_id: &str, patch: PollPatch) -> Result<(), StoreError>;

    async fn get(&self, poll_id: &str) -> Result<Option<Poll>, StoreError>;

    /// 최신순 전체 목록
    async fn list(&self) -> Result<Vec<Poll>, StoreError>;

    async fn list_active(&self) -> Result<Vec<Poll>, StoreError>;

    async fn mark_inactive(&self, poll_id: &str) -> Result<(), StoreError> {
        self.update(
            poll_id,
            PollPatch {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }
}

pub type SharedStore = Arc<dyn PollStore>;

#[derive(Debug)]
enum Write {
    Create(Poll),
    Update { poll_id: String, patch: PollPatch },
}

/// 저장소 쓰기를 비동기로 위임하는 핸들
#[derive(Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<Write>,
}

impl Persister {
    /// 쓰기 전용 태스크 시작
    pub fn spawn(store: SharedStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Write>();

        tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                match write {
                    Write::Create(poll) => {
                        if let Err(e) = store.create(&poll).await {
                            tracing::warn!(poll_id = %poll.id, error = %e, "Failed to persist new poll");
                        }
                    }
                    Write::Update { poll_id, patch } => {
                        if let Err(e) = store.update(&poll_id, patch).await {
                            tracing::warn!(poll_id = %poll_id, error = %e, "Failed to persist poll update");
                        }
                    }
                }
            }
            tracing::debug!("Persister stopped");
        });

        Self { tx }
    }

    pub fn save(&self, poll: &Poll) {
        self.enqueue(Write::Create(poll.clone()));
    }

    /// 종료 상태와 최종 집계 기록
    pub fn save_ended(&self, poll: &Poll) {
        self.enqueue(Write::Update {
            poll_id: poll.id.clone(),
            patch: PollPatch {
                is_active: Some(false),
                options: Some(poll.options.clone()),
            },
        });
    }

    fn enqueue(&self, write: Write) {
        if self.tx.send(write).is_err() {
            tracing::warn!("Persister is not running, dropping write");
        }
    }
}

/// 이전 프로세스가 남긴 진행 중 투표를 종료 처리
pub async fn retire_orphaned_polls(store: &dyn PollStore) -> Result<usize, StoreError> {
    let orphaned = store.list_active().await?;
    for poll in &orphaned {
        store.mark_inactive(&poll.id).await?;
        tracing::info!(poll_id = %poll.id, "Marked orphaned poll inactive");
    }
    Ok(orphaned.len())
}
