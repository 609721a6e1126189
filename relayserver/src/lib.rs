//! # WebSocket 랑데부/릴레이 서버 라이브러리
//!
//! 이름 있는 방에서 소수의 클라이언트를 만나게 하고, 방 멤버 간에
//! 불투명한 JSON 페이로드를 중계하는 WebSocket 서버입니다.
//! 서버는 페이로드를 해석하지 않으므로 WebRTC 시그널링(SDP/ICE)과
//! 실시간 게임 상태 릴레이가 동일한 코드 경로를 사용합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! relayserver
//! ├── config     — 환경변수 기반 설정 (.env 지원)
//! ├── protocol   — 와이어 프로토콜 (type 태그 JSON 메시지)
//! ├── server     — 조립 루트와 accept 루프
//! ├── handler    — 연결 수명 / 메시지 디스패치
//! │   ├── connection_handler
//! │   └── message_handler
//! ├── service    — 핵심 비즈니스 로직
//! │   ├── connection_service  (연결 레지스트리, 생존 상태)
//! │   ├── room_service        (방 생명주기, 역할 할당)
//! │   ├── message_service     (팬아웃 라우팅)
//! │   └── heartbeat_service   (프로브, 강제 종료)
//! └── tool       — 에러 타입, 공용 유틸
//! ```
//!
//! ## 사용 예시
//!
//! ```no_run
//! use relayserver::config::RelayServerConfig;
//! use relayserver::server::RelayServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = RelayServer::new(RelayServerConfig::default());
//!     let listener = server.bind().await?;
//!     server.serve(listener).await
//! }
//! ```

pub mod config;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod service;
pub mod tool;

pub use config::RelayServerConfig;
pub use protocol::{ClientMessage, ServerMessage};
pub use server::RelayServer;
pub use tool::error::{RelayServerError, RoomError};
