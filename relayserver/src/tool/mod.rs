//! 릴레이 서버 공통 도구 모듈
//!
//! 에러 타입 등 여러 레이어에서 공유하는 유틸리티를 포함합니다.

/// 에러 타입 정의
///
/// 방 생명주기 위반 및 서버 내부 에러를 체계적으로 분류합니다.
pub mod error;

pub use error::{RelayServerError, RoomError};

/// 현재 Unix 타임스탬프 (초)
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
