//! 릴레이 서버 서비스 레이어
//!
//! 비즈니스 로직과 핵심 기능을 담당하는 서비스들을 정의합니다.
//!
//! # 서비스 구조
//!
//! ```text
//! Service Layer
//! ├── ConnectionService (연결 레지스트리)
//! │   ├── 연결 등록/제거, ID 발급
//! │   ├── 아웃바운드 프레임 큐 적재
//! │   ├── 생존 상태 추적 (Alive / PendingProbe)
//! │   └── 모니터 타이머의 정확히-한-번 취소
//! ├── RoomService (방 생명주기)
//! │   ├── create / join / leave(멱등)
//! │   ├── 도착 순서 기반 역할 할당
//! │   ├── 정원/유일성 불변식
//! │   └── 해체 정책 (WhenEmpty / OnHostLeave)
//! ├── MessageService (메시지 라우팅)
//! │   ├── 릴레이 종류별 팬아웃 (peer-to-peer / room-wide)
//! │   ├── 불투명 페이로드 통과
//! │   └── best-effort 전달, 송신자별 FIFO
//! └── HeartbeatService (생존 모니터링)
//!     ├── 연결별 프로브 태스크
//!     ├── 2회 무응답 시 강제 종료
//!     └── 명시적 종료와 동일한 정리 경로
//! ```
//!
//! # 동시성 모델
//!
//! 모든 서비스 연산은 동기(in-memory)이며 DashMap 엔트리 가드로
//! 직렬화됩니다. 가드를 잡은 채 await하지 않고, 전송은 unbounded 큐
//! 적재로 완료되므로 방 연산이 네트워크 I/O에 블로킹되지 않습니다.

/// 연결 레지스트리 서비스
pub mod connection_service;

/// 하트비트 모니터링 서비스
pub mod heartbeat_service;

/// 메시지 라우팅 서비스
pub mod message_service;

/// 방 생명주기 서비스
pub mod room_service;

pub use connection_service::{ClientConnection, ConnectionService, Liveness, ProbeOutcome};
pub use heartbeat_service::HeartbeatService;
pub use message_service::{MessageService, RelayPolicy};
pub use room_service::{RoomPolicy, RoomService, TeardownPolicy};
