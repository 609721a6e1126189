//! 릴레이 서버 핸들러 레이어
//!
//! 연결 수명 처리와 인바운드 메시지 디스패치를 담당합니다.

/// 연결 수명 처리 (핸드셰이크, 읽기 루프, 정리)
pub mod connection_handler;

/// 인바운드 메시지 디스패치 (상태 머신 분기)
pub mod message_handler;

pub use connection_handler::ConnectionHandler;
pub use message_handler::MessageHandler;
