//! 연결 레지스트리

use crate::error::RegistryError;
use crate::protocol::ServerMessage;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

/// 연결별 송신 큐에 들어가는 항목
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(ServerMessage),
    /// 전송 후 소켓을 닫도록 지시
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

/// 연결 세션 정보
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub role: Option<Role>,
    pub student_name: Option<String>,
    pub has_submitted: bool,
    pub sender: UnboundedSender<Outbound>,
    joined_seq: u64,
}

impl Connection {
    pub fn is_student(&self) -> bool {
        self.role == Some(Role::Student)
    }

    /// 송신 큐에 메시지 적재. 수신 측이 닫혀 있으면 false
    pub fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(Outbound::Event(message)).is_ok()
    }
}

/// 살아있는 연결 목록 (connection_id -> Connection)
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Connection>,
    next_seq: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection_id: &str, sender: UnboundedSender<Outbound>) -> &Connection {
        let connection = Connection {
            id: connection_id.to_string(),
            role: None,
            student_name: None,
            has_submitted: false,
            sender,
            joined_seq: 0,
        };
        match self.connections.entry(connection_id.to_string()) {
            Entry::Occupied(mut slot) => {
                slot.insert(connection);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(connection),
        }
    }

    /// 역할 지정. 학생으로 처음 참여하면 명단 순서가 부여된다.
    /// 제출 여부는 새 투표가 시작될 때만 초기화된다
    pub fn set_role(
        &mut self,
        connection_id: &str,
        role: Role,
        name: Option<String>,
    ) -> Result<&Connection, RegistryError> {
        let seq = self.next_seq;
        let connection = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| RegistryError::NotFound(connection_id.to_string()))?;

        let was_student = connection.is_student();
        connection.role = Some(role);
        match role {
            Role::Student => {
                connection.student_name = name;
                if !was_student {
                    connection.joined_seq = seq;
                    self.next_seq += 1;
                }
            }
            Role::Teacher => {
                connection.student_name = None;
            }
        }
        Ok(connection)
    }

    pub fn remove(&mut self, connection_id: &str) -> Result<Connection, RegistryError> {
        self.connections
            .remove(connection_id)
            .ok_or_else(|| RegistryError::NotFound(connection_id.to_string()))
    }

    pub fn get(&self, connection_id: &str) -> Option<&Connection> {
        self.connections.get(connection_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// 학생 연결 목록 (참여 순서)
    pub fn all_students(&self) -> Vec<&Connection> {
        let mut students: Vec<&Connection> =
            self.connections.values().filter(|c| c.is_student()).collect();
        students.sort_by_key(|c| c.joined_seq);
        students
    }

    pub fn reset_submissions(&mut self) {
        for connection in self.connections.values_mut() {
            connection.has_submitted = false;
        }
    }

    /// 제출 표시. 이미 제출한 경우 false
    pub fn mark_submitted(&mut self, connection_id: &str) -> Result<bool, RegistryError> {
        let connection = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| RegistryError::NotFound(connection_id.to_string()))?;
        if connection.has_submitted {
            return Ok(false);
        }
        connection.has_submitted = true;
        Ok(true)
    }

    /// 학생이 한 명 이상이고 모두 제출했는지
    pub fn all_submitted(&self) -> bool {
        let mut students = self.connections.values().filter(|c| c.is_student()).peekable();
        students.peek().is_some() && students.all(|c| c.has_submitted)
    }
}
