//! 환경 변수 기반 설정 관리

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub poll: PollConfig,
    pub roster: RosterConfig,
    pub chat: ChatConfig,
    pub log_level: String,
}

/// 투표 설정
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub replace_policy: ReplacePolicy,
    pub max_duration_secs: u32,
    pub tick_interval_ms: u64,
}

/// 진행 중인 투표가 있을 때 새 투표 생성 요청을 처리하는 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacePolicy {
    /// 기존 투표를 강제 종료하고 새 투표를 시작
    Replace,
    /// 기존 투표가 끝날 때까지 거부
    Reject,
}

impl FromStr for ReplacePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            _ => Err(()),
        }
    }
}

/// 참가자 관리 설정
#[derive(Debug, Clone)]
pub struct RosterConfig {
    pub kick_grace_ms: u64,
}

/// 채팅 설정
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub capacity: usize,
}

impl PollConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl RosterConfig {
    pub fn kick_grace(&self) -> Duration {
        Duration::from_millis(self.kick_grace_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["*".to_string()],
            poll: PollConfig {
                replace_policy: ReplacePolicy::Replace,
                max_duration_secs: 3600,
                tick_interval_ms: 1000,
            },
            roster: RosterConfig { kick_grace_ms: 500 },
            chat: ChatConfig { capacity: 100 },
            log_level: "info".to_string(),
        }
    }
}

/// 잘못된 값이라 기본값으로 대체된 환경 변수
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidVar {
    pub key: &'static str,
    pub value: String,
}

impl Config {
    /// 환경 변수에서 설정 로드. 로깅 초기화 전에 호출되므로 잘못된 값은 함께 반환한다
    pub fn from_env() -> (Self, Vec<InvalidVar>) {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let mut invalid = Vec::new();

        let port = parse_var("PORT", defaults.port, &mut invalid);
        let replace_policy = parse_var("POLL_REPLACE_POLICY", defaults.poll.replace_policy, &mut invalid);
        let max_duration_secs = parse_var("POLL_MAX_DURATION", defaults.poll.max_duration_secs, &mut invalid);
        let tick_interval_ms = parse_var("TIMER_TICK_MS", defaults.poll.tick_interval_ms, &mut invalid);
        let kick_grace_ms = parse_var("KICK_GRACE_MS", defaults.roster.kick_grace_ms, &mut invalid);
        let capacity = parse_var("CHAT_CAPACITY", defaults.chat.capacity, &mut invalid);

        let config = Self {
            port,
            host: env::var("HOST").unwrap_or(defaults.host),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            poll: PollConfig {
                replace_policy,
                max_duration_secs,
                tick_interval_ms,
            },
            roster: RosterConfig { kick_grace_ms },
            chat: ChatConfig {
                capacity: capacity.max(1),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        (config, invalid)
    }

    /// 모든 출처 허용 여부
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T, invalid: &mut Vec<InvalidVar>) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            invalid.push(InvalidVar { key, value: raw });
            default
        }),
        Err(_) => default,
    }
}
