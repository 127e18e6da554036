//! 에러 타입 정의

use thiserror::Error;

/// 클라이언트 명령 처리 실패
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} is only allowed for {1}s")]
    Forbidden(&'static str, &'static str),

    #[error("Connection has not joined as a {0}")]
    NotJoined(&'static str),

    #[error("A poll is already active")]
    PollAlreadyActive,

    #[error("Poll {0} is not the active poll")]
    StalePoll(String),

    #[error("Option {0} does not exist")]
    UnknownOption(String),

    #[error("Answer already submitted for this poll")]
    AlreadySubmitted,

    #[error("Student {0} not found")]
    UnknownStudent(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl CommandError {
    /// 클라이언트에 전달되는 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Forbidden(..) | Self::NotJoined(_) => "forbidden",
            Self::PollAlreadyActive => "poll_already_active",
            Self::StalePoll(_) => "stale_poll",
            Self::UnknownOption(_) => "unknown_option",
            Self::AlreadySubmitted => "already_submitted",
            Self::UnknownStudent(_) => "unknown_student",
            Self::Registry(_) => "unknown_connection",
        }
    }
}

/// 연결 레지스트리 조회 실패
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Connection {0} not found")]
    NotFound(String),
}

/// 외부 저장소 에러
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Poll {0} not found")]
    NotFound(String),

    #[error("Poll {0} already exists")]
    AlreadyExists(String),
}
