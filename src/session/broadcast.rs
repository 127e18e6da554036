//! 브로드캐스트 / 팬아웃

use super::registry::{ConnectionRegistry, Role};
use crate::protocol::ServerMessage;

/// 모든 연결에 전송
pub fn to_all(registry: &ConnectionRegistry, message: ServerMessage) {
    let mut dropped = 0;
    for connection in registry.iter() {
        if !connection.send(message.clone()) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped = dropped, "Skipped closed connections during broadcast");
    }
}

/// 특정 역할의 연결에만 전송
pub fn to_role(registry: &ConnectionRegistry, role: Role, message: ServerMessage) {
    for connection in registry.iter().filter(|c| c.role == Some(role)) {
        if !connection.send(message.clone()) {
            tracing::debug!(connection_id = %connection.id, role = role.as_str(), "Connection closed, skipped");
        }
    }
}

/// 단일 연결에 전송. 연결이 없거나 닫혀 있으면 false
pub fn to_connection(registry: &ConnectionRegistry, connection_id: &str, message: ServerMessage) -> bool {
    match registry.get(connection_id) {
        Some(connection) => connection.send(message),
        None => {
            tracing::debug!(connection_id = %connection_id, "Target connection not found");
            false
        }
    }
}
