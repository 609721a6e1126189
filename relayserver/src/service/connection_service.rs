//! 연결 서비스
//!
//! 클라이언트 연결 레지스트리와 생존 상태(liveness) 추적을 담당합니다.
//! 아웃바운드 프레임은 연결별 unbounded 큐에 적재되고 전용 writer 태스크가
//! 순서대로 소켓에 기록합니다. 큐 적재는 블로킹/await 없이 완료되므로
//! 방 연산이 네트워크 I/O를 기다리는 일이 없습니다.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::protocol::ServerMessage;
use crate::tool::{current_timestamp, RelayServerError};

/// 연결 생존 상태
///
/// `Alive` → (프로브 전송) → `PendingProbe` → (무응답으로 한 주기 더 경과) → 강제 종료.
/// Pong 또는 임의의 인바운드 프레임 수신 시 `Alive`로 복귀합니다.
/// dead 상태는 별도로 저장하지 않고 레지스트리에서 제거하는 것으로 표현합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    PendingProbe,
}

/// 프로브 틱 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 연결이 이미 레지스트리에 없음 (모니터 종료)
    Missing,
    /// 프로브 전송 완료, 다음 틱에서 응답 확인
    ProbeSent,
    /// 직전 프로브에 응답하지 않음 (강제 종료 대상)
    TimedOut,
}

/// 개별 클라이언트 연결 정보
#[derive(Debug)]
pub struct ClientConnection {
    pub conn_id: u32,
    pub addr: String,
    pub liveness: Liveness,
    pub connected_at: i64,
    outbound: mpsc::UnboundedSender<Message>,
}

impl ClientConnection {
    pub fn new(conn_id: u32, addr: String, outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            conn_id,
            addr,
            liveness: Liveness::Alive,
            connected_at: current_timestamp(),
            outbound,
        }
    }

    /// 아웃바운드 프레임을 송신 큐에 적재합니다.
    fn send_frame(&self, frame: Message) -> Result<(), RelayServerError> {
        self.outbound
            .send(frame)
            .map_err(|_| RelayServerError::connection_error(self.conn_id, "송신 큐가 닫혔습니다"))
    }

    /// 서버 메시지를 JSON 텍스트 프레임으로 직렬화하여 전송합니다.
    pub fn send_message(&self, message: &ServerMessage) -> Result<(), RelayServerError> {
        let text = serde_json::to_string(message)?;
        self.send_frame(Message::Text(text))?;

        debug!("연결 {}에게 {} 프레임 적재", self.conn_id, message.kind());
        Ok(())
    }
}

/// 연결 통계
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub total_connections: u64,
    pub current_connections: u32,
    pub peak_connections: u32,
    pub total_messages: u64,
    pub timeout_disconnections: u64,
}

/// 연결 서비스
///
/// 프로세스 전역 연결 레지스트리입니다. 연결 ID 발급, 메시지 전송,
/// 하트비트 모니터 핸들의 정확히-한-번 취소를 담당합니다.
pub struct ConnectionService {
    connections: DashMap<u32, ClientConnection>,
    monitor_handles: DashMap<u32, JoinHandle<()>>,
    next_conn_id: AtomicU32,
    stats: Mutex<ConnectionStats>,
    server_start_time: Instant,
}

impl ConnectionService {
    /// 새로운 연결 서비스 생성
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            monitor_handles: DashMap::new(),
            next_conn_id: AtomicU32::new(1),
            stats: Mutex::new(ConnectionStats::default()),
            server_start_time: Instant::now(),
        }
    }

    /// 새 연결을 등록하고 연결 ID를 발급합니다.
    pub fn register(&self, addr: String, outbound: mpsc::UnboundedSender<Message>) -> u32 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let connection = ClientConnection::new(conn_id, addr.clone(), outbound);
        self.connections.insert(conn_id, connection);

        self.update_stats(|stats| {
            stats.total_connections += 1;
            stats.current_connections += 1;
            stats.peak_connections = stats.peak_connections.max(stats.current_connections);
        });

        debug!("연결 {} 등록 완료 ({})", conn_id, addr);
        conn_id
    }

    /// 연결의 하트비트 모니터 태스크 핸들을 저장합니다.
    pub fn set_monitor(&self, conn_id: u32, handle: JoinHandle<()>) {
        self.monitor_handles.insert(conn_id, handle);
    }

    /// 연결을 레지스트리에서 제거하고 모니터 타이머를 취소합니다.
    ///
    /// 어떤 경로(정상 종료, 프로토콜 에러, 하트비트 타임아웃)로 호출되든
    /// 제거와 타이머 취소는 정확히 한 번만 수행됩니다.
    pub fn unregister(&self, conn_id: u32) -> bool {
        let removed = self.connections.remove(&conn_id).is_some();

        // 어느 쪽이 먼저 도착하든 핸들은 한 번만 take됨
        if let Some((_, handle)) = self.monitor_handles.remove(&conn_id) {
            handle.abort();
            debug!("연결 {} 하트비트 모니터 취소됨", conn_id);
        }

        if removed {
            self.update_stats(|stats| {
                stats.current_connections = stats.current_connections.saturating_sub(1);
            });
            debug!("연결 {} 제거 완료", conn_id);
        }

        removed
    }

    /// 특정 연결에게 서버 메시지를 전송합니다.
    pub fn send_to(&self, conn_id: u32, message: &ServerMessage) -> Result<(), RelayServerError> {
        let connection = self.connections.get(&conn_id).ok_or_else(|| {
            RelayServerError::connection_error(conn_id, "등록되지 않은 연결입니다")
        })?;

        connection.send_message(message)?;

        self.update_stats(|stats| {
            stats.total_messages += 1;
        });

        Ok(())
    }

    /// Pong 응답 프레임을 전송합니다 (수신한 Ping 페이로드 에코).
    pub fn send_pong(&self, conn_id: u32, payload: Vec<u8>) {
        if let Some(connection) = self.connections.get(&conn_id) {
            if connection.send_frame(Message::Pong(payload)).is_err() {
                debug!("연결 {} Pong 적재 실패 (큐 닫힘)", conn_id);
            }
        }
    }

    /// Close 프레임을 전송합니다 (강제 종료 경로, best-effort).
    pub fn send_close(&self, conn_id: u32) {
        if let Some(connection) = self.connections.get(&conn_id) {
            let _ = connection.send_frame(Message::Close(None));
        }
    }

    /// 생존 상태를 `Alive`로 리셋합니다.
    ///
    /// Pong 수신뿐 아니라 임의의 인바운드 프레임도 생존 신호로 취급합니다.
    pub fn mark_alive(&self, conn_id: u32) {
        if let Some(mut connection) = self.connections.get_mut(&conn_id) {
            connection.liveness = Liveness::Alive;
        }
    }

    /// 하트비트 주기마다 호출되는 프로브 틱 처리
    ///
    /// `Alive`면 `PendingProbe`로 전이 후 Ping 프레임을 전송하고,
    /// 이미 `PendingProbe`면 직전 프로브 무응답이므로 `TimedOut`을 반환합니다.
    pub fn tick_probe(&self, conn_id: u32) -> ProbeOutcome {
        let Some(mut connection) = self.connections.get_mut(&conn_id) else {
            return ProbeOutcome::Missing;
        };

        match connection.liveness {
            Liveness::Alive => {
                connection.liveness = Liveness::PendingProbe;
                if connection.send_frame(Message::Ping(Vec::new())).is_err() {
                    // 송신 큐가 이미 닫힘: writer 종료 경로에서 정리됨
                    warn!("연결 {} 프로브 전송 실패, 모니터 종료", conn_id);
                    return ProbeOutcome::Missing;
                }
                ProbeOutcome::ProbeSent
            }
            Liveness::PendingProbe => ProbeOutcome::TimedOut,
        }
    }

    /// 타임아웃으로 인한 연결 해제를 통계에 기록합니다.
    pub fn record_timeout_disconnection(&self) {
        self.update_stats(|stats| {
            stats.timeout_disconnections += 1;
        });
    }

    /// 연결 등록 여부
    pub fn is_registered(&self, conn_id: u32) -> bool {
        self.connections.contains_key(&conn_id)
    }

    /// 연결의 현재 생존 상태 조회
    pub fn liveness(&self, conn_id: u32) -> Option<Liveness> {
        self.connections.get(&conn_id).map(|c| c.liveness)
    }

    /// 연결 수 조회
    pub fn get_connection_count(&self) -> usize {
        self.connections.len()
    }

    /// 서버 업타임 (초)
    pub fn get_uptime_seconds(&self) -> u64 {
        self.server_start_time.elapsed().as_secs()
    }

    /// 연결 통계 조회
    pub fn get_stats(&self) -> ConnectionStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    fn update_stats<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut ConnectionStats),
    {
        if let Ok(mut stats) = self.stats.lock() {
            update_fn(&mut stats);
        }
    }
}

impl Default for ConnectionService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_test_connection(
        service: &ConnectionService,
    ) -> (u32, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = service.register("127.0.0.1:12345".to_string(), tx);
        (conn_id, rx)
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let service = ConnectionService::new();
        assert_eq!(service.get_connection_count(), 0);

        let (conn_id, _rx) = register_test_connection(&service);
        assert!(service.is_registered(conn_id));
        assert_eq!(service.get_connection_count(), 1);
        assert_eq!(service.liveness(conn_id), Some(Liveness::Alive));

        // 첫 제거만 true, 이후는 멱등
        assert!(service.unregister(conn_id));
        assert!(!service.unregister(conn_id));
        assert_eq!(service.get_connection_count(), 0);

        let stats = service.get_stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.current_connections, 0);
        assert_eq!(stats.peak_connections, 1);
    }

    #[tokio::test]
    async fn test_send_to_delivers_text_frame() {
        let service = ConnectionService::new();
        let (conn_id, mut rx) = register_test_connection(&service);

        let message = ServerMessage::RoomCreated {
            room_id: "room1".to_string(),
            role: "host".to_string(),
        };
        service.send_to(conn_id, &message).unwrap();

        match rx.recv().await.unwrap() {
            Message::Text(text) => {
                let decoded: ServerMessage = serde_json::from_str(&text).unwrap();
                assert_eq!(decoded, message);
            }
            other => panic!("텍스트 프레임이 아님: {:?}", other),
        }

        // 등록되지 않은 연결로는 에러
        assert!(service.send_to(9999, &message).is_err());
    }

    #[tokio::test]
    async fn test_probe_state_machine() {
        let service = ConnectionService::new();
        let (conn_id, mut rx) = register_test_connection(&service);

        // Alive → 프로브 전송 + PendingProbe 전이
        assert_eq!(service.tick_probe(conn_id), ProbeOutcome::ProbeSent);
        assert_eq!(service.liveness(conn_id), Some(Liveness::PendingProbe));
        assert!(matches!(rx.recv().await.unwrap(), Message::Ping(_)));

        // 응답 없이 한 주기 더 → 타임아웃
        assert_eq!(service.tick_probe(conn_id), ProbeOutcome::TimedOut);

        // Pong 수신으로 복귀하면 다시 프로브 가능
        service.mark_alive(conn_id);
        assert_eq!(service.tick_probe(conn_id), ProbeOutcome::ProbeSent);

        // 제거된 연결은 Missing
        service.unregister(conn_id);
        assert_eq!(service.tick_probe(conn_id), ProbeOutcome::Missing);
    }
}
