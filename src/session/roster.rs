//! 참가자 명단 관리

use super::broadcast::{to_all, to_role};
use super::registry::{ConnectionRegistry, Role};
use crate::protocol::ServerMessage;
use serde::{Deserialize, Serialize};

/// 명단에 노출되는 학생 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub id: String,
    pub name: String,
}

/// 명단 변경 사유
#[derive(Debug, Clone)]
pub enum RosterChange {
    Joined(StudentSummary),
    Left(String),
    Kicked(String),
}

/// 현재 학생 명단 (참여 순서)
pub fn roster(registry: &ConnectionRegistry) -> Vec<StudentSummary> {
    registry
        .all_students()
        .into_iter()
        .map(|c| StudentSummary {
            id: c.id.clone(),
            name: c.student_name.clone().unwrap_or_default(),
        })
        .collect()
}

/// 명단 변경 알림 후 전체 명단 브로드캐스트
pub fn publish(registry: &ConnectionRegistry, change: RosterChange) {
    match change {
        RosterChange::Joined(student) => {
            tracing::info!(student_id = %student.id, name = %student.name, "Student joined");
            to_role(registry, Role::Teacher, ServerMessage::StudentJoined(student));
        }
        RosterChange::Left(id) => {
            tracing::info!(student_id = %id, "Student left");
            to_role(registry, Role::Teacher, ServerMessage::StudentLeft { id });
        }
        RosterChange::Kicked(id) => {
            tracing::info!(student_id = %id, "Student kicked");
            to_all(registry, ServerMessage::StudentKicked { id });
        }
    }

    to_all(registry, ServerMessage::StudentsUpdate(roster(registry)));
}
