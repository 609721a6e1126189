//! 메시지 디스패치 핸들러
//!
//! 인바운드 프레임을 파싱하고 연결의 암묵적 상태 머신
//! (`Unbound` → `Bound` → `Unbound`)에 따라 방 서비스 또는
//! 메시지 라우터로 분기합니다.
//!
//! 클라이언트/서버 레이스는 정상 동작으로 간주합니다: 상태에 맞지 않는
//! 메시지(Bound 상태의 create, Unbound 상태의 릴레이)는 에러 없이
//! 조용히 무시되고, 생명주기 위반만 advisory `error` 프레임으로 회신됩니다.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::service::{ConnectionService, MessageService, RoomService};

/// 메시지 디스패치 핸들러
pub struct MessageHandler {
    connection_service: Arc<ConnectionService>,
    room_service: Arc<RoomService>,
    message_service: Arc<MessageService>,
}

impl MessageHandler {
    /// 새로운 메시지 핸들러 생성
    pub fn new(
        connection_service: Arc<ConnectionService>,
        room_service: Arc<RoomService>,
        message_service: Arc<MessageService>,
    ) -> Self {
        Self {
            connection_service,
            room_service,
            message_service,
        }
    }

    /// 텍스트 프레임 처리
    ///
    /// 파싱 불가 프레임과 알 수 없는 `type`은 로그 후 폐기하며
    /// 연결은 유지됩니다. 디스패치 루프는 어떤 페이로드로도 중단되지 않습니다.
    pub fn handle_text(&self, conn_id: u32, text: &str) {
        let message = match ClientMessage::from_text(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("연결 {} 잘못된 프레임 폐기: {}", conn_id, e);
                return;
            }
        };

        self.handle_message(conn_id, message);
    }

    /// 파싱된 메시지 디스패치
    pub fn handle_message(&self, conn_id: u32, message: ClientMessage) {
        let bound = self.room_service.room_of(conn_id).is_some();
        debug!(
            "연결 {} {} 메시지 수신 (상태: {})",
            conn_id,
            message.kind(),
            if bound { "Bound" } else { "Unbound" }
        );

        match message {
            ClientMessage::Create { room_id } => {
                if bound {
                    debug!("Bound 상태의 create 무시 (연결 {})", conn_id);
                    return;
                }
                match self.room_service.create(&room_id, conn_id) {
                    Ok(role) => {
                        self.reply(conn_id, &ServerMessage::RoomCreated { room_id, role });
                    }
                    Err(e) => {
                        self.reply(
                            conn_id,
                            &ServerMessage::Error {
                                message: e.to_string(),
                            },
                        );
                    }
                }
            }

            ClientMessage::Join { room_id } => {
                if bound {
                    debug!("Bound 상태의 join 무시 (연결 {})", conn_id);
                    return;
                }
                match self.room_service.join(&room_id, conn_id) {
                    Ok(outcome) => {
                        self.reply(
                            conn_id,
                            &ServerMessage::RoomJoined {
                                room_id,
                                role: outcome.role,
                            },
                        );
                        // 기존 멤버들의 역할을 입장자에게 공개
                        for peer_role in outcome.peer_roles {
                            self.reply(
                                conn_id,
                                &ServerMessage::PeerJoined {
                                    role: Some(peer_role),
                                },
                            );
                        }
                    }
                    Err(e) => {
                        self.reply(
                            conn_id,
                            &ServerMessage::Error {
                                message: e.to_string(),
                            },
                        );
                    }
                }
            }

            // 릴레이 종류: Bound 상태에서만 유효, 아니면 조용히 무시
            relay => {
                if !bound {
                    debug!(
                        "Unbound 상태의 {} 무시 (연결 {})",
                        relay.kind(),
                        conn_id
                    );
                    return;
                }
                self.message_service.relay(conn_id, &relay);
            }
        }
    }

    /// 요청자에게 응답 프레임 전송 (best-effort)
    fn reply(&self, conn_id: u32, message: &ServerMessage) {
        if let Err(e) = self.connection_service.send_to(conn_id, message) {
            debug!("연결 {} 응답 전송 실패: {}", conn_id, e);
        }
    }
}
