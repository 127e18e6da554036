//! 투표 세션 상태 머신
//!
//! 한 번에 하나의 투표만 진행된다. 종료된 투표는 다음 투표가 생성될 때까지
//! 보관되어 늦게 참여한 연결에도 최종 결과를 보여줄 수 있다.

use super::generate_id;
use crate::error::CommandError;
use crate::protocol::OptionInput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    pub votes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: String,
    pub question: String,
    pub options: Vec<PollOption>,
    pub duration_seconds: u32,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_option_id: Option<String>,
}

impl Poll {
    /// 시계 기준 남은 시간 (초). 틱 수신 여부와 무관하다
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u32 {
        if !self.is_active {
            return 0;
        }
        let elapsed = (now - self.created_at).num_seconds().max(0);
        (i64::from(self.duration_seconds) - elapsed).max(0) as u32
    }

    /// 클라이언트 공개용 사본. 진행 중에는 정답을 숨긴다
    pub fn public_view(&self) -> Poll {
        let mut view = self.clone();
        if view.is_active {
            view.correct_option_id = None;
        }
        view
    }
}

/// 검증 전 투표 생성 요청
#[derive(Debug, Clone)]
pub struct PollDraft {
    pub question: String,
    pub options: Vec<OptionInput>,
    pub duration_seconds: u32,
    pub correct_option_id: Option<String>,
}

impl PollDraft {
    /// 검증 후 새 투표 생성
    pub fn into_poll(self, max_duration_secs: u32, now: DateTime<Utc>) -> Result<Poll, CommandError> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(CommandError::Validation("Question must not be empty".into()));
        }
        if self.options.len() < 2 {
            return Err(CommandError::Validation("A poll needs at least two options".into()));
        }
        if self.duration_seconds == 0 || self.duration_seconds > max_duration_secs {
            return Err(CommandError::Validation(format!(
                "Duration must be between 1 and {max_duration_secs} seconds"
            )));
        }

        let mut seen = HashSet::new();
        let mut options = Vec::with_capacity(self.options.len());
        for (index, input) in self.options.into_iter().enumerate() {
            let text = input.text.trim();
            if text.is_empty() {
                return Err(CommandError::Validation(format!("Option {} has no text", index + 1)));
            }
            let id = input
                .id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| (index + 1).to_string());
            if !seen.insert(id.clone()) {
                return Err(CommandError::Validation(format!("Duplicate option id {id}")));
            }
            options.push(PollOption {
                id,
                text: text.to_string(),
                votes: 0,
            });
        }

        if let Some(correct) = &self.correct_option_id {
            if !seen.contains(correct) {
                return Err(CommandError::Validation(format!(
                    "Correct option {correct} is not one of the options"
                )));
            }
        }

        Ok(Poll {
            id: generate_id(),
            question: question.to_string(),
            options,
            duration_seconds: self.duration_seconds,
            created_at: now,
            is_active: true,
            correct_option_id: self.correct_option_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    NoActivePoll,
    PollActive,
    PollEnded,
}

#[derive(Debug, Default)]
pub struct PollSession {
    current: Option<Poll>,
}

impl PollSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> PollPhase {
        match &self.current {
            None => PollPhase::NoActivePoll,
            Some(poll) if poll.is_active => PollPhase::PollActive,
            Some(_) => PollPhase::PollEnded,
        }
    }

    /// 마지막 투표 (진행 중이거나 종료된)
    pub fn current(&self) -> Option<&Poll> {
        self.current.as_ref()
    }

    pub fn active(&self) -> Option<&Poll> {
        self.current.as_ref().filter(|p| p.is_active)
    }

    /// 새 투표 시작. 진행 중인 투표가 있으면 호출 전에 종료되어야 한다
    pub fn start(&mut self, poll: Poll) -> &Poll {
        debug_assert!(self.active().is_none(), "previous poll must be ended first");
        self.current.insert(poll)
    }

    /// 표 집계. 진행 중인 투표와 id가 다르거나 선택지가 없으면 거부
    pub fn record_vote(&mut self, poll_id: &str, option_id: &str) -> Result<&Poll, CommandError> {
        let poll = self
            .current
            .as_mut()
            .filter(|p| p.is_active && p.id == poll_id)
            .ok_or_else(|| CommandError::StalePoll(poll_id.to_string()))?;

        let option = poll
            .options
            .iter_mut()
            .find(|o| o.id == option_id)
            .ok_or_else(|| CommandError::UnknownOption(option_id.to_string()))?;
        option.votes += 1;
        Ok(poll)
    }

    /// 진행 중 → 종료 전환. 전환이 일어난 경우에만 Some
    pub fn end(&mut self, poll_id: &str) -> Option<&Poll> {
        let poll = self
            .current
            .as_mut()
            .filter(|p| p.is_active && p.id == poll_id)?;
        poll.is_active = false;
        Some(poll)
    }

    #[cfg(test)]
    pub(crate) fn current_mut(&mut self) -> Option<&mut Poll> {
        self.current.as_mut()
    }
}
