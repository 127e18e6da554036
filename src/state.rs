//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::session::CoordinatorHandle;
use crate::store::SharedStore;
use std::sync::Arc;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 투표 세션 코디네이터 큐
    pub coordinator: CoordinatorHandle,
    /// 투표 기록 저장소 (조회 전용으로 사용)
    pub store: SharedStore,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Arc<Config>, coordinator: CoordinatorHandle, store: SharedStore) -> Self {
        Self {
            coordinator,
            store,
            config,
        }
    }
}
