//! 하트비트 서비스
//!
//! 연결별 모니터 태스크가 고정 간격으로 생존 프로브(Ping)를 보내고,
//! 두 주기 연속 무응답인 연결을 강제 종료합니다. 강제 종료는 명시적
//! 연결 해제와 동일한 정리 경로(방 퇴장 → Close 프레임 → 레지스트리 제거)를
//! 사용하며, 정리와 타이머 취소는 어느 경로가 먼저든 정확히 한 번입니다.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::service::connection_service::{ConnectionService, ProbeOutcome};
use crate::service::room_service::RoomService;

/// 하트비트 통계
#[derive(Debug, Clone, Default)]
pub struct HeartbeatStats {
    pub probes_sent: u64,
    pub timeout_disconnections: u64,
}

/// 하트비트 서비스
pub struct HeartbeatService {
    connection_service: Arc<ConnectionService>,
    room_service: Arc<RoomService>,
    probe_interval: Duration,
    stats: Arc<Mutex<HeartbeatStats>>,
}

impl HeartbeatService {
    /// 새로운 하트비트 서비스 생성
    pub fn new(
        connection_service: Arc<ConnectionService>,
        room_service: Arc<RoomService>,
        probe_interval: Duration,
    ) -> Self {
        Self {
            connection_service,
            room_service,
            probe_interval,
            stats: Arc::new(Mutex::new(HeartbeatStats::default())),
        }
    }

    /// 기준 설정(30초 간격)으로 생성
    pub fn with_default_config(
        connection_service: Arc<ConnectionService>,
        room_service: Arc<RoomService>,
    ) -> Self {
        Self::new(connection_service, room_service, Duration::from_secs(30))
    }

    /// 연결의 생존 모니터를 시작합니다.
    ///
    /// 태스크 핸들은 연결 레지스트리에 저장되어 연결 종료 시
    /// 정확히 한 번 취소됩니다 (타이머 누수 방지).
    pub fn start_monitor(&self, conn_id: u32) {
        let connection_service = self.connection_service.clone();
        let room_service = self.room_service.clone();
        let stats = self.stats.clone();
        let probe_interval = self.probe_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(probe_interval);
            // tokio interval의 즉시 발화 첫 틱은 소거
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match connection_service.tick_probe(conn_id) {
                    ProbeOutcome::Missing => {
                        debug!("연결 {} 모니터 종료 (이미 제거됨)", conn_id);
                        break;
                    }
                    ProbeOutcome::ProbeSent => {
                        if let Ok(mut stats) = stats.lock() {
                            stats.probes_sent += 1;
                        }
                    }
                    ProbeOutcome::TimedOut => {
                        warn!("연결 {} 하트비트 무응답 2회, 강제 종료", conn_id);

                        // 명시적 종료와 동일한 정리 경로
                        room_service.leave(conn_id);
                        connection_service.send_close(conn_id);
                        connection_service.unregister(conn_id);
                        connection_service.record_timeout_disconnection();

                        if let Ok(mut stats) = stats.lock() {
                            stats.timeout_disconnections += 1;
                        }
                        break;
                    }
                }
            }
        });

        self.connection_service.set_monitor(conn_id, handle);
        debug!(
            "연결 {} 하트비트 모니터 시작 ({:?} 간격)",
            conn_id, self.probe_interval
        );
    }

    /// 프로브 간격 조회
    pub fn probe_interval(&self) -> Duration {
        self.probe_interval
    }

    /// 하트비트 통계 조회
    pub fn get_stats(&self) -> HeartbeatStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}

impl Drop for HeartbeatService {
    fn drop(&mut self) {
        info!("하트비트 서비스 종료");
    }
}
