//! 공통 에러 처리 시스템
//!
//! 릴레이 서버에서 발생하는 에러를 체계적으로 분류합니다.
//! 방 생명주기 위반(`RoomError`)은 요청한 클라이언트에게 `error` 프레임으로
//! 회신되는 advisory 에러이며, 연결을 끊지 않습니다.

use thiserror::Error;

/// 방 생명주기 에러
///
/// `Display` 문자열이 그대로 클라이언트에게 전달되는 에러 카탈로그입니다.
/// 문구를 바꾸면 프로토콜 호환성이 깨집니다.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// 이미 존재하는 방 ID로 create 요청
    #[error("room already exists")]
    RoomExists { room_id: String },

    /// 존재하지 않는 방으로 join 요청
    #[error("room not found")]
    RoomNotFound { room_id: String },

    /// 정원이 가득 찬 방으로 join 요청
    #[error("room full")]
    RoomFull { room_id: String, capacity: usize },
}

/// 릴레이 서버 내부 에러
///
/// 연결 단위로 격리되는 에러들입니다. 한 연결의 에러가 다른 연결이나
/// 방 상태에 전파되지 않습니다.
#[derive(Debug, Error)]
pub enum RelayServerError {
    /// 연결 관련 에러 (등록되지 않은 연결, 닫힌 송신 큐 등)
    #[error("연결 에러 [연결 {conn_id}]: {message}")]
    Connection { conn_id: u32, message: String },

    /// 직렬화/역직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정 관련 에러
    #[error("설정 에러 [키: {key}]: {message}")]
    Configuration { key: String, message: String },
}

impl RelayServerError {
    /// 연결 에러 생성
    pub fn connection_error(conn_id: u32, message: impl Into<String>) -> Self {
        Self::Connection {
            conn_id,
            message: message.into(),
        }
    }
}
