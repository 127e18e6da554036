//! 실시간 투표 세션

pub mod broadcast;
pub mod chat;
pub mod coordinator;
pub mod poll;
pub mod registry;
pub mod roster;
pub mod timer;

pub use chat::ChatMessage;
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use poll::{Poll, PollOption};
pub use registry::Outbound;
pub use roster::StudentSummary;

use rand::{distributions::Alphanumeric, Rng};

/// 짧은 무작위 식별자 (소문자 영숫자 9자)
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}
