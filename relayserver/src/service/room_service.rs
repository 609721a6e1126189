//! 방 관리 서비스
//!
//! 방 생명주기 상태 머신(create/join/leave)을 담당합니다.
//! 방 맵은 프로세스 전역 공유 상태이며 DashMap 엔트리 가드로 방 단위
//! 직렬화를 보장합니다. 가드를 잡은 상태에서 await하지 않으므로 방 연산은
//! 동일 방에 대한 다른 연산과 원자적으로 완료됩니다.
//!
//! 해체 정책과 역할 재사용 여부는 배포마다 다른 관측 동작이므로
//! 하드코딩하지 않고 `RoomPolicy`로 명시합니다.

use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::protocol::ServerMessage;
use crate::service::connection_service::ConnectionService;
use crate::tool::{current_timestamp, RoomError};

/// 방 해체 정책
///
/// 관측된 배포들은 첫 번째 멤버(host) 퇴장 시 방을 즉시 삭제하는 쪽과
/// 멤버가 0명이 될 때만 삭제하는 쪽으로 갈립니다. 명시적 설정으로 둡니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownPolicy {
    /// 멤버가 0명이 되면 삭제 (기본값). guest 퇴장 후 재입장 허용.
    WhenEmpty,
    /// host(첫 번째 멤버) 퇴장 시 즉시 삭제, 남은 멤버는 퇴거.
    OnHostLeave,
}

/// 방 정책 설정
#[derive(Debug, Clone)]
pub struct RoomPolicy {
    /// 방 정원 (기준값: 2)
    pub capacity: usize,
    /// 해체 정책
    pub teardown: TeardownPolicy,
    /// 퇴장한 멤버의 역할을 이후 입장자가 재사용할 수 있는지 여부
    pub reuse_roles: bool,
    /// 도착 순서별 역할 라벨
    pub role_labels: Vec<String>,
}

impl Default for RoomPolicy {
    fn default() -> Self {
        Self {
            capacity: 2,
            teardown: TeardownPolicy::WhenEmpty,
            reuse_roles: true,
            role_labels: vec!["host".to_string(), "guest".to_string()],
        }
    }
}

/// 방 내 멤버 정보
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub conn_id: u32,
    /// 입장 시점에 도착 순서로 확정되는 역할. 멤버가 남아있는 동안 불변.
    pub role: String,
    /// 방 생성 이후 단조 증가하는 좌석 번호. seat 0 = host.
    pub seat: u32,
    pub joined_at: i64,
}

/// 방 정보
#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    /// 도착 순서를 유지하는 멤버 목록. 0 < len <= capacity 불변식.
    pub members: Vec<RoomMember>,
    /// 다음 입장자의 좌석 번호 (퇴장해도 되돌리지 않음)
    next_seat: u32,
    pub created_at: i64,
}

impl Room {
    fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            members: Vec::new(),
            next_seat: 0,
            created_at: current_timestamp(),
        }
    }
}

/// join 성공 결과
///
/// `peer_roles`는 기존 멤버들의 역할로, 디스패치 레이어가 입장자에게
/// `peerJoined{role}` 프레임으로 공개합니다.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub role: String,
    pub peer_roles: Vec<String>,
}

/// leave 처리 결과 (no-op이면 leave가 None을 반환)
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub room_id: String,
    pub room_removed: bool,
    /// peerDisconnected 알림을 받은 잔류 멤버
    pub notified: Vec<u32>,
    /// 해체 정책에 의해 퇴거(언바인딩)된 멤버
    pub evicted: Vec<u32>,
}

/// 방 통계
#[derive(Debug, Clone, Default)]
pub struct RoomStats {
    pub rooms_created: u64,
    pub rooms_removed: u64,
    pub total_joins: u64,
    pub total_leaves: u64,
}

/// 방 관리 서비스
pub struct RoomService {
    /// 방 맵: room_id -> Room (라이브 방 당 하나)
    rooms: DashMap<String, Room>,
    /// 멤버 -> 방 역참조: conn_id -> room_id (Bound/Unbound 상태의 단일 출처)
    member_room_map: DashMap<u32, String>,
    policy: RoomPolicy,
    connection_service: Arc<ConnectionService>,
    stats: Mutex<RoomStats>,
}

impl RoomService {
    /// 새로운 방 서비스 생성 (시작 시 빈 맵)
    pub fn new(connection_service: Arc<ConnectionService>, policy: RoomPolicy) -> Self {
        Self {
            rooms: DashMap::new(),
            member_room_map: DashMap::new(),
            policy,
            connection_service,
            stats: Mutex::new(RoomStats::default()),
        }
    }

    /// 방 생성
    ///
    /// 동일 ID의 라이브 방이 있으면 `RoomExists`. 성공 시 요청 연결이
    /// 첫 번째 멤버가 되고 할당된 역할을 반환합니다.
    pub fn create(&self, room_id: &str, conn_id: u32) -> Result<String, RoomError> {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(_) => Err(RoomError::RoomExists {
                room_id: room_id.to_string(),
            }),
            Entry::Vacant(vacant) => {
                let mut room = Room::new(room_id);
                let role = self.assign_role(&room);
                room.members.push(RoomMember {
                    conn_id,
                    role: role.clone(),
                    seat: 0,
                    joined_at: current_timestamp(),
                });
                room.next_seat = 1;
                vacant.insert(room);

                self.member_room_map.insert(conn_id, room_id.to_string());
                self.update_stats(|stats| {
                    stats.rooms_created += 1;
                    stats.total_joins += 1;
                });

                info!("✅ 방 {} 생성 완료 (연결 {}, 역할 {})", room_id, conn_id, role);
                Ok(role)
            }
        }
    }

    /// 방 입장
    ///
    /// 부수 효과: 기존 멤버 전원에게 `peerJoined{role: 입장자 역할}`을
    /// 전송합니다. 입장자에 대한 응답(roomJoined)과 기존 멤버 역할 공개는
    /// 반환된 `JoinOutcome`으로 디스패치 레이어가 수행합니다.
    pub fn join(&self, room_id: &str, conn_id: u32) -> Result<JoinOutcome, RoomError> {
        let (role, peers) = {
            let mut room = self.rooms.get_mut(room_id).ok_or_else(|| {
                RoomError::RoomNotFound {
                    room_id: room_id.to_string(),
                }
            })?;

            if room.members.len() >= self.policy.capacity {
                return Err(RoomError::RoomFull {
                    room_id: room_id.to_string(),
                    capacity: self.policy.capacity,
                });
            }

            let role = self.assign_role(&room);
            let peers: Vec<(u32, String)> = room
                .members
                .iter()
                .map(|m| (m.conn_id, m.role.clone()))
                .collect();

            let seat = room.next_seat;
            room.members.push(RoomMember {
                conn_id,
                role: role.clone(),
                seat,
                joined_at: current_timestamp(),
            });
            room.next_seat += 1;

            (role, peers)
        };

        self.member_room_map.insert(conn_id, room_id.to_string());
        self.update_stats(|stats| {
            stats.total_joins += 1;
        });

        // 기존 멤버들에게 새 멤버 입장 알림 (fire-and-forget)
        for (peer_id, _) in &peers {
            let _ = self.connection_service.send_to(
                *peer_id,
                &ServerMessage::PeerJoined {
                    role: Some(role.clone()),
                },
            );
        }

        info!("✅ 연결 {} 방 {} 입장 완료 (역할 {})", conn_id, room_id, role);
        Ok(JoinOutcome {
            role,
            peer_roles: peers.into_iter().map(|(_, r)| r).collect(),
        })
    }

    /// 방 퇴장 (멱등)
    ///
    /// 방에 속하지 않은 연결이면 no-op으로 None을 반환합니다.
    /// 잔류 멤버는 각각 정확히 한 번 `peerDisconnected`를 받습니다.
    /// 해체는 정책에 따릅니다: `WhenEmpty`는 멤버 0명일 때만,
    /// `OnHostLeave`는 host(seat 0) 퇴장 시 잔류 멤버를 퇴거시키며 즉시.
    pub fn leave(&self, conn_id: u32) -> Option<LeaveOutcome> {
        let (_, room_id) = self.member_room_map.remove(&conn_id)?;

        let mut notified = Vec::new();
        let mut evicted = Vec::new();

        if let Some(mut room) = self.rooms.get_mut(&room_id) {
            if let Some(pos) = room.members.iter().position(|m| m.conn_id == conn_id) {
                let leaver = room.members.remove(pos);
                debug!(
                    "연결 {} 방 {} 퇴장 (역할 {}, 좌석 {})",
                    conn_id, room_id, leaver.role, leaver.seat
                );

                if self.policy.teardown == TeardownPolicy::OnHostLeave && leaver.seat == 0 {
                    evicted = room.members.drain(..).map(|m| m.conn_id).collect();
                } else {
                    notified = room.members.iter().map(|m| m.conn_id).collect();
                }
            }
        }

        // 퇴거된 멤버는 언바인딩 후 알림
        for peer_id in &evicted {
            self.member_room_map.remove(peer_id);
        }
        for peer_id in evicted.iter().chain(notified.iter()) {
            let _ = self
                .connection_service
                .send_to(*peer_id, &ServerMessage::PeerDisconnected);
        }

        // 가드 해제와 삭제 사이에 새 멤버가 입장했을 수 있으므로
        // 빈 방일 때만 제거 (remove_if로 원자적 확인)
        let room_removed = self
            .rooms
            .remove_if(&room_id, |_, room| room.members.is_empty())
            .is_some();

        self.update_stats(|stats| {
            stats.total_leaves += 1 + evicted.len() as u64;
            if room_removed {
                stats.rooms_removed += 1;
            }
        });

        if room_removed {
            info!("방 {} 제거됨", room_id);
        }
        if !evicted.is_empty() {
            info!("방 {} 해체: 멤버 {}명 퇴거", room_id, evicted.len());
        }

        Some(LeaveOutcome {
            room_id,
            room_removed,
            notified,
            evicted,
        })
    }

    /// 역할 할당 (결정적, 메시지 내용과 무관)
    ///
    /// 재사용 허용 시 현재 점유되지 않은 가장 앞의 라벨을,
    /// 비허용 시 단조 좌석 번호 위치의 라벨을 사용합니다.
    fn assign_role(&self, room: &Room) -> String {
        if self.policy.reuse_roles {
            for label in &self.policy.role_labels {
                if !room.members.iter().any(|m| &m.role == label) {
                    return label.clone();
                }
            }
        } else if let Some(label) = self.policy.role_labels.get(room.next_seat as usize) {
            return label.clone();
        }

        format!("peer{}", room.next_seat + 1)
    }

    /// 연결이 바인딩된 방 ID 조회 (None = Unbound)
    pub fn room_of(&self, conn_id: u32) -> Option<String> {
        self.member_room_map.get(&conn_id).map(|r| r.value().clone())
    }

    /// 방의 멤버 목록 조회 (도착 순서 유지)
    pub fn members_of(&self, room_id: &str) -> Vec<RoomMember> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    /// 라이브 방 존재 여부
    pub fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// 라이브 방 수 조회
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// 방 통계 조회
    pub fn get_stats(&self) -> RoomStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    fn update_stats<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut RoomStats),
    {
        if let Ok(mut stats) = self.stats.lock() {
            update_fn(&mut stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    fn service_with_policy(policy: RoomPolicy) -> (Arc<ConnectionService>, RoomService) {
        let connection_service = Arc::new(ConnectionService::new());
        let room_service = RoomService::new(connection_service.clone(), policy);
        (connection_service, room_service)
    }

    fn register(
        connection_service: &ConnectionService,
    ) -> (u32, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = connection_service.register("127.0.0.1:0".to_string(), tx);
        (conn_id, rx)
    }

    /// 수신 큐에 쌓인 서버 메시지를 모두 꺼냅니다.
    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<crate::protocol::ServerMessage> {
        let mut received = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Message::Text(text) = frame {
                received.push(serde_json::from_str(&text).unwrap());
            }
        }
        received
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let (connection_service, room_service) = service_with_policy(RoomPolicy::default());
        let (a, _rx_a) = register(&connection_service);
        let (b, _rx_b) = register(&connection_service);

        assert_eq!(room_service.create("room1", a).unwrap(), "host");
        assert_eq!(
            room_service.create("room1", b),
            Err(RoomError::RoomExists {
                room_id: "room1".to_string()
            })
        );
        assert_eq!(room_service.room_count(), 1);
    }

    #[tokio::test]
    async fn test_join_not_found_and_full() {
        let (connection_service, room_service) = service_with_policy(RoomPolicy::default());
        let (a, _rx_a) = register(&connection_service);
        let (b, _rx_b) = register(&connection_service);
        let (c, _rx_c) = register(&connection_service);

        assert!(matches!(
            room_service.join("missing", a),
            Err(RoomError::RoomNotFound { .. })
        ));

        room_service.create("room1", a).unwrap();
        room_service.join("room1", b).unwrap();
        assert!(matches!(
            room_service.join("room1", c),
            Err(RoomError::RoomFull { capacity: 2, .. })
        ));
    }

    /// 역할 할당은 도착 순서에만 의존하는 결정적 동작
    #[tokio::test]
    async fn test_deterministic_roles() {
        let (connection_service, room_service) = service_with_policy(RoomPolicy::default());
        let (a, _rx_a) = register(&connection_service);
        let (b, _rx_b) = register(&connection_service);

        assert_eq!(room_service.create("room1", a).unwrap(), "host");
        let outcome = room_service.join("room1", b).unwrap();
        assert_eq!(outcome.role, "guest");
        assert_eq!(outcome.peer_roles, vec!["host".to_string()]);

        let members = room_service.members_of("room1");
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role, "host");
        assert_eq!(members[0].seat, 0);
        assert_eq!(members[1].role, "guest");
        assert_eq!(members[1].seat, 1);
    }

    /// join은 기존 멤버에게 입장자의 역할과 함께 peerJoined를 보냄
    #[tokio::test]
    async fn test_join_notifies_existing_members() {
        let (connection_service, room_service) = service_with_policy(RoomPolicy::default());
        let (a, mut rx_a) = register(&connection_service);
        let (b, _rx_b) = register(&connection_service);

        room_service.create("room1", a).unwrap();
        room_service.join("room1", b).unwrap();

        let frames = drain(&mut rx_a);
        assert_eq!(
            frames,
            vec![crate::protocol::ServerMessage::PeerJoined {
                role: Some("guest".to_string())
            }]
        );
    }

    /// leave는 멱등: 방에 없는 연결은 no-op
    #[tokio::test]
    async fn test_leave_idempotent() {
        let (connection_service, room_service) = service_with_policy(RoomPolicy::default());
        let (a, _rx_a) = register(&connection_service);

        assert!(room_service.leave(a).is_none());

        room_service.create("room1", a).unwrap();
        assert!(room_service.leave(a).is_some());
        assert!(room_service.leave(a).is_none());
        assert_eq!(room_service.room_count(), 0);
    }

    /// WhenEmpty 정책: guest 퇴장 시 방 유지, host는 정확히 한 번 알림
    #[tokio::test]
    async fn test_guest_leave_when_empty_policy() {
        let (connection_service, room_service) = service_with_policy(RoomPolicy::default());
        let (a, mut rx_a) = register(&connection_service);
        let (b, _rx_b) = register(&connection_service);

        room_service.create("room1", a).unwrap();
        room_service.join("room1", b).unwrap();
        drain(&mut rx_a); // peerJoined 소거

        let outcome = room_service.leave(b).unwrap();
        assert!(!outcome.room_removed);
        assert_eq!(outcome.notified, vec![a]);
        assert!(outcome.evicted.is_empty());

        // host에게 정확히 한 번 peerDisconnected
        let frames = drain(&mut rx_a);
        assert_eq!(
            frames,
            vec![crate::protocol::ServerMessage::PeerDisconnected]
        );

        // 방은 재입장 가능하게 유지됨
        assert!(room_service.contains_room("room1"));
        assert_eq!(room_service.room_of(b), None);
        assert_eq!(room_service.room_of(a), Some("room1".to_string()));
    }

    /// OnHostLeave 정책: host 퇴장 시 방 즉시 해체, 잔류 멤버 퇴거
    #[tokio::test]
    async fn test_host_leave_teardown_policy() {
        let policy = RoomPolicy {
            teardown: TeardownPolicy::OnHostLeave,
            ..RoomPolicy::default()
        };
        let (connection_service, room_service) = service_with_policy(policy);
        let (a, _rx_a) = register(&connection_service);
        let (b, mut rx_b) = register(&connection_service);

        room_service.create("room1", a).unwrap();
        room_service.join("room1", b).unwrap();

        let outcome = room_service.leave(a).unwrap();
        assert!(outcome.room_removed);
        assert_eq!(outcome.evicted, vec![b]);
        assert!(outcome.notified.is_empty());

        // 퇴거된 guest도 정확히 한 번 알림을 받고 언바인딩됨
        let frames = drain(&mut rx_b);
        assert_eq!(
            frames,
            vec![crate::protocol::ServerMessage::PeerDisconnected]
        );
        assert_eq!(room_service.room_of(b), None);
        assert!(!room_service.contains_room("room1"));
    }

    /// OnHostLeave 정책에서도 guest 퇴장은 방을 해체하지 않음
    #[tokio::test]
    async fn test_guest_leave_on_host_leave_policy() {
        let policy = RoomPolicy {
            teardown: TeardownPolicy::OnHostLeave,
            ..RoomPolicy::default()
        };
        let (connection_service, room_service) = service_with_policy(policy);
        let (a, _rx_a) = register(&connection_service);
        let (b, _rx_b) = register(&connection_service);

        room_service.create("room1", a).unwrap();
        room_service.join("room1", b).unwrap();

        let outcome = room_service.leave(b).unwrap();
        assert!(!outcome.room_removed);
        assert!(room_service.contains_room("room1"));
    }

    /// 역할 재사용 설정에 따른 교체 입장자의 역할
    #[tokio::test]
    async fn test_role_reuse_configuration() {
        // reuse_roles = true: 교체 입장자가 guest 라벨을 다시 받음
        let (connection_service, room_service) = service_with_policy(RoomPolicy::default());
        let (a, _rx_a) = register(&connection_service);
        let (b, _rx_b) = register(&connection_service);
        let (c, _rx_c) = register(&connection_service);

        room_service.create("room1", a).unwrap();
        room_service.join("room1", b).unwrap();
        room_service.leave(b);
        assert_eq!(room_service.join("room1", c).unwrap().role, "guest");

        // reuse_roles = false: 좌석 번호가 라벨 목록을 넘어서면 peerN
        let policy = RoomPolicy {
            reuse_roles: false,
            ..RoomPolicy::default()
        };
        let (connection_service, room_service) = service_with_policy(policy);
        let (a, _rx_a) = register(&connection_service);
        let (b, _rx_b) = register(&connection_service);
        let (c, _rx_c) = register(&connection_service);

        room_service.create("room1", a).unwrap();
        room_service.join("room1", b).unwrap();
        room_service.leave(b);
        assert_eq!(room_service.join("room1", c).unwrap().role, "peer3");
    }
}
