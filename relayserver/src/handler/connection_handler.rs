//! 연결 처리 핸들러
//!
//! WebSocket 핸드셰이크 수락, 연결별 읽기 루프와 writer 태스크 구동,
//! 종료 시 정리 경로를 담당합니다. 핸드셰이크 콜백에서 `GET /health`
//! 요청은 업그레이드 없이 200 OK로 응답합니다 (코어 릴레이 로직 외부).

use anyhow::Result;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::handler::message_handler::MessageHandler;
use crate::service::{ConnectionService, HeartbeatService, RoomService};

/// 연결 처리 핸들러
pub struct ConnectionHandler {
    connection_service: Arc<ConnectionService>,
    room_service: Arc<RoomService>,
    heartbeat_service: Arc<HeartbeatService>,
    message_handler: Arc<MessageHandler>,
}

impl ConnectionHandler {
    /// 새로운 연결 핸들러 생성
    pub fn new(
        connection_service: Arc<ConnectionService>,
        room_service: Arc<RoomService>,
        heartbeat_service: Arc<HeartbeatService>,
        message_handler: Arc<MessageHandler>,
    ) -> Self {
        Self {
            connection_service,
            room_service,
            heartbeat_service,
            message_handler,
        }
    }

    /// 새로운 클라이언트 연결 처리
    ///
    /// 연결 수명 전체를 담당합니다: 핸드셰이크 → 등록 → 하트비트 모니터
    /// 시작 → 읽기 루프 → (어떤 종료 경로든) 동일한 정리.
    pub async fn handle_new_connection(&self, stream: TcpStream, addr: String) -> Result<()> {
        let ws_stream =
            match tokio_tungstenite::accept_hdr_async(stream, health_check_callback).await {
                Ok(ws) => ws,
                Err(e) => {
                    // 헬스체크 응답 또는 비정상 핸드셰이크: 연결 단위로 격리
                    debug!("핸드셰이크 미완료 ({}): {}", addr, e);
                    return Ok(());
                }
            };

        let (mut ws_sink, mut ws_reader) = ws_stream.split();

        // 아웃바운드 큐: 방 연산은 큐 적재까지만 담당하고
        // 소켓 기록은 이 연결 전용 writer 태스크가 FIFO로 수행
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let conn_id = self.connection_service.register(addr.clone(), tx);
        info!("✅ 연결 {} 수립 ({})", conn_id, addr);

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if ws_sink.send(frame).await.is_err() {
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        self.heartbeat_service.start_monitor(conn_id);

        // 읽기 루프: 인바운드 이벤트(메시지/Pong/Close/에러)를 순차 디스패치
        while let Some(frame) = ws_reader.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    // 어떤 인바운드 프레임도 생존 신호로 취급
                    self.connection_service.mark_alive(conn_id);
                    self.message_handler.handle_text(conn_id, &text);
                }
                Ok(Message::Pong(_)) => {
                    self.connection_service.mark_alive(conn_id);
                }
                Ok(Message::Ping(payload)) => {
                    self.connection_service.mark_alive(conn_id);
                    self.connection_service.send_pong(conn_id, payload);
                }
                Ok(Message::Close(_)) => {
                    debug!("연결 {} Close 프레임 수신", conn_id);
                    break;
                }
                Ok(other) => {
                    debug!("연결 {} 비텍스트 프레임 폐기: {:?}", conn_id, other.len());
                }
                Err(e) => {
                    // 전송 계층 오류는 정상 종료와 동일하게 처리
                    debug!("연결 {} 수신 오류: {}", conn_id, e);
                    break;
                }
            }
        }

        // 모든 종료 경로(정상 Close, 프로토콜 에러, 소켓 단절)의 공통 정리.
        // 하트비트 타임아웃 경로가 먼저 실행됐어도 각 단계는 멱등.
        self.room_service.leave(conn_id);
        self.connection_service.unregister(conn_id);
        let _ = writer.await;

        info!("연결 {} 해제 완료 ({})", conn_id, addr);
        Ok(())
    }
}

/// 핸드셰이크 콜백: /health는 업그레이드 없이 200 OK로 응답
fn health_check_callback(
    request: &Request,
    response: Response,
) -> std::result::Result<Response, ErrorResponse> {
    if request.uri().path() == "/health" {
        let mut health = ErrorResponse::new(Some("OK".to_string()));
        *health.status_mut() = StatusCode::OK;
        return Err(health);
    }
    Ok(response)
}
