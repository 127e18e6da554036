//! 투표 카운트다운 타이머
//!
//! 틱은 코디네이터 큐에 세대(generation) 번호와 함께 들어간다. 취소나 재시작으로
//! 세대가 바뀌면 이미 큐에 들어간 이전 틱은 무시된다.

use super::coordinator::Command;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// 틱 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 이전 세대의 틱
    Stale,
    Remaining(u32),
    Expired,
}

#[derive(Debug, Default)]
pub struct TimerEngine {
    generation: u64,
    remaining: u32,
    running: bool,
    handle: Option<JoinHandle<()>>,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 이전 타이머를 취소하고 새 카운트다운 시작
    pub fn start(&mut self, seconds: u32, interval: Duration, queue: UnboundedSender<Command>) -> u64 {
        self.cancel();
        self.remaining = seconds;
        self.running = true;

        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if queue.send(Command::TimerTick { generation }).is_err() {
                    break;
                }
            }
        }));

        tracing::debug!(generation = generation, seconds = seconds, "Timer started");
        generation
    }

    /// 세대를 올려 큐에 남은 틱을 무효화하고 태스크 중단
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.running = false;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn on_tick(&mut self, generation: u64) -> TickOutcome {
        if !self.running || generation != self.generation {
            return TickOutcome::Stale;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.cancel();
            TickOutcome::Expired
        } else {
            TickOutcome::Remaining(self.remaining)
        }
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
