//! 메시지 라우팅 서비스
//!
//! 송신자가 바인딩된 방을 기준으로 릴레이 페이로드의 수신자 집합을 결정하고
//! 전달합니다. 전달은 best-effort, fire-and-forget입니다: 응답 대기나
//! 재시도가 없고, 송신자별 FIFO 순서만 보장됩니다 (연결당 단일 읽기 루프가
//! 순차 디스패치하고 수신 큐가 FIFO이므로 성립).
//!
//! 방이 사라진 뒤 도착한 릴레이는 에러가 아니라 예상되는 레이스이므로
//! 조용히 폐기합니다.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::service::connection_service::ConnectionService;
use crate::service::room_service::RoomService;

/// 릴레이 종류별 팬아웃 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FanOut {
    /// 송신자를 제외한 방 멤버에게 전달 (signal/move/reset/action)
    PeerToPeer,
    /// 방 전체에 전달, 송신자 포함 여부는 에코 설정에 따름 (chat)
    RoomWide,
}

/// 릴레이 정책 설정
#[derive(Debug, Clone)]
pub struct RelayPolicy {
    /// 방 전체 브로드캐스트 시 송신자에게도 에코할지 여부
    pub echo_broadcast: bool,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            echo_broadcast: true,
        }
    }
}

/// 릴레이 통계
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub relayed_messages: u64,
    pub delivered_frames: u64,
    pub dropped_unbound: u64,
    pub failed_deliveries: u64,
}

/// 메시지 라우팅 서비스
pub struct MessageService {
    room_service: Arc<RoomService>,
    connection_service: Arc<ConnectionService>,
    policy: RelayPolicy,
    stats: Mutex<RelayStats>,
}

impl MessageService {
    /// 새로운 메시지 서비스 생성
    pub fn new(
        room_service: Arc<RoomService>,
        connection_service: Arc<ConnectionService>,
        policy: RelayPolicy,
    ) -> Self {
        Self {
            room_service,
            connection_service,
            policy,
            stats: Mutex::new(RelayStats::default()),
        }
    }

    /// 릴레이 페이로드를 방 멤버들에게 전달합니다.
    ///
    /// 송신자가 방에 바인딩되어 있지 않거나 방이 이미 해체된 경우
    /// 조용히 폐기합니다. 전달된 프레임 수를 반환합니다.
    pub fn relay(&self, sender_id: u32, message: &ClientMessage) -> usize {
        let Some((mirrored, fan_out)) = Self::mirror(message) else {
            debug!("릴레이 불가 메시지 종류 폐기: {}", message.kind());
            return 0;
        };

        let Some(room_id) = self.room_service.room_of(sender_id) else {
            debug!(
                "언바운드 연결 {}의 {} 릴레이 폐기 (예상된 레이스)",
                sender_id,
                message.kind()
            );
            self.update_stats(|stats| stats.dropped_unbound += 1);
            return 0;
        };

        let members = self.room_service.members_of(&room_id);
        let mut delivered = 0;
        let mut failed = 0;

        for member in &members {
            let include = match fan_out {
                FanOut::PeerToPeer => member.conn_id != sender_id,
                FanOut::RoomWide => self.policy.echo_broadcast || member.conn_id != sender_id,
            };
            if !include {
                continue;
            }

            match self.connection_service.send_to(member.conn_id, &mirrored) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    // 수신자가 막 닫혔을 수 있음: 건너뛰고 계속
                    warn!("연결 {}에게 릴레이 실패: {}", member.conn_id, e);
                    failed += 1;
                }
            }
        }

        self.update_stats(|stats| {
            stats.relayed_messages += 1;
            stats.delivered_frames += delivered as u64;
            stats.failed_deliveries += failed as u64;
        });

        debug!(
            "방 {} {} 릴레이 완료: {}건 전달",
            room_id,
            message.kind(),
            delivered
        );
        delivered
    }

    /// 인바운드 릴레이 프레임을 원본 필드명을 유지한 아웃바운드 미러와
    /// 팬아웃 정책으로 변환합니다. 페이로드는 해석 없이 그대로 통과합니다.
    fn mirror(message: &ClientMessage) -> Option<(ServerMessage, FanOut)> {
        match message {
            ClientMessage::Signal { data, .. } => Some((
                ServerMessage::Signal { data: data.clone() },
                FanOut::PeerToPeer,
            )),
            ClientMessage::Move { pos } => {
                Some((ServerMessage::Move { pos: pos.clone() }, FanOut::PeerToPeer))
            }
            ClientMessage::Reset => Some((ServerMessage::Reset, FanOut::PeerToPeer)),
            ClientMessage::Action { code } => Some((
                ServerMessage::Action { code: code.clone() },
                FanOut::PeerToPeer,
            )),
            ClientMessage::Chat { sender, message } => Some((
                ServerMessage::Chat {
                    sender: sender.clone(),
                    message: message.clone(),
                },
                FanOut::RoomWide,
            )),
            ClientMessage::Create { .. } | ClientMessage::Join { .. } => None,
        }
    }

    /// 릴레이 통계 조회
    pub fn get_stats(&self) -> RelayStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    fn update_stats<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut RelayStats),
    {
        if let Ok(mut stats) = self.stats.lock() {
            update_fn(&mut stats);
        }
    }
}
