//! 클라이언트-서버 메시지 프로토콜 정의

use crate::session::{ChatMessage, Poll, PollOption, StudentSummary};
use serde::{Deserialize, Serialize};

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    // Connection
    Heartbeat,

    // Roster
    JoinTeacher,
    JoinStudent {
        name: String,
    },
    KickStudent {
        student_id: String,
    },

    // Poll
    CreatePoll {
        question: String,
        options: Vec<OptionInput>,
        duration: u32,
        correct_option_id: Option<String>,
    },
    SubmitAnswer {
        poll_id: String,
        option_id: String,
    },
    EndPoll {
        poll_id: String,
    },

    // Chat
    SendChatMessage {
        text: String,
        sender: String,
        #[serde(default)]
        is_teacher: bool,
    },
}

/// 투표 생성 시 선택지 입력
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionInput {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    // Connection
    Connected { socket_id: String },
    HeartbeatAck,
    Error { code: String, message: String },

    // Roster Events
    StudentsUpdate(Vec<StudentSummary>),
    StudentJoined(StudentSummary),
    StudentLeft { id: String },
    StudentKicked { id: String },
    YouWereKicked,

    // Poll Events
    PollCreated(Poll),
    TimerUpdate { seconds_remaining: u32 },
    PollResults {
        poll_id: String,
        options: Vec<PollOption>,
    },
    PollTimeout {
        poll_id: String,
        correct_option_id: Option<String>,
    },
    PollEnded {
        poll_id: String,
        correct_option_id: Option<String>,
    },

    // Chat
    ChatMessage(ChatMessage),
    ChatHistory(Vec<ChatMessage>),
}
