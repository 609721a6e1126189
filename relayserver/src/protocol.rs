//! 릴레이 프로토콜 정의
//!
//! 클라이언트와 서버 간 통신을 위한 JSON 텍스트 프레임 프로토콜을 정의합니다.
//!
//! # 프레임 구조
//!
//! 모든 프레임은 UTF-8 JSON 오브젝트이며 `"type"` 필드로 종류를 구분합니다.
//!
//! ```text
//! {"type":"create","roomId":"room1"}
//! {"type":"signal","data":{"sdp":"..."}}
//! {"type":"chat","sender":"A","message":"hello"}
//! ```
//!
//! 릴레이 종류(`signal`/`move`/`reset`/`action`/`chat`)의 페이로드는
//! 서버가 해석하지 않고 `serde_json::Value` 그대로 상대방에게 전달합니다.
//!
//! # 사용 예시
//!
//! ```rust
//! use relayserver::protocol::{ClientMessage, ServerMessage};
//!
//! let inbound = ClientMessage::from_text(r#"{"type":"create","roomId":"room1"}"#)?;
//! let outbound = ServerMessage::RoomCreated {
//!     room_id: "room1".to_string(),
//!     role: "host".to_string(),
//! };
//! let text = outbound.to_text()?;
//! # anyhow::Ok(())
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 클라이언트 → 서버 메시지
///
/// 방 생명주기 요청(`create`/`join`)과 릴레이 요청으로 나뉩니다.
/// 알 수 없는 `type`은 역직렬화 에러가 되며, 디스패치 루프에서
/// 로그 후 무시됩니다 (연결은 유지).
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// 방 생성 요청. 성공 시 요청자가 첫 번째 역할(host)을 받습니다.
    #[serde(rename = "create")]
    Create {
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// 방 입장 요청. 성공 시 다음 역할(guest)을 받습니다.
    #[serde(rename = "join")]
    Join {
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// WebRTC 시그널링 페이로드 릴레이 (peer-to-peer)
    ///
    /// `roomId` 필드는 기존 클라이언트와의 호환을 위해 받기만 하고,
    /// 라우팅은 송신자가 바인딩된 방을 기준으로 합니다.
    #[serde(rename = "signal")]
    Signal {
        #[serde(rename = "roomId", default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        data: Value,
    },

    /// 게임 수 릴레이 (peer-to-peer)
    #[serde(rename = "move")]
    Move { pos: Value },

    /// 게임 리셋 릴레이 (peer-to-peer)
    #[serde(rename = "reset")]
    Reset,

    /// 임의 액션 코드 릴레이 (peer-to-peer)
    #[serde(rename = "action")]
    Action { code: Value },

    /// 채팅 메시지 릴레이 (방 전체)
    #[serde(rename = "chat")]
    Chat { sender: String, message: String },
}

impl ClientMessage {
    /// JSON 텍스트 프레임에서 역직렬화합니다.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// 로깅/통계용 메시지 종류 이름
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Create { .. } => "create",
            ClientMessage::Join { .. } => "join",
            ClientMessage::Signal { .. } => "signal",
            ClientMessage::Move { .. } => "move",
            ClientMessage::Reset => "reset",
            ClientMessage::Action { .. } => "action",
            ClientMessage::Chat { .. } => "chat",
        }
    }

    /// 방 생명주기 요청 여부 (`create`/`join`)
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            ClientMessage::Create { .. } | ClientMessage::Join { .. }
        )
    }
}

/// 서버 → 클라이언트 메시지
///
/// 생명주기 응답/알림과, 원본 필드명을 그대로 유지한 릴레이 미러가 있습니다.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// 방 생성 완료 (요청자에게)
    #[serde(rename = "roomCreated")]
    RoomCreated {
        #[serde(rename = "roomId")]
        room_id: String,
        role: String,
    },

    /// 방 입장 완료 (요청자에게)
    #[serde(rename = "roomJoined")]
    RoomJoined {
        #[serde(rename = "roomId")]
        room_id: String,
        role: String,
    },

    /// 새 멤버 입장 알림. `role`은 알림 대상이 아닌 상대 멤버의 역할입니다.
    #[serde(rename = "peerJoined")]
    PeerJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },

    /// 멤버 퇴장/연결 해제 알림
    #[serde(rename = "peerDisconnected")]
    PeerDisconnected,

    /// advisory 에러 (연결은 유지됨)
    #[serde(rename = "error")]
    Error { message: String },

    /// 릴레이된 시그널링 페이로드
    #[serde(rename = "signal")]
    Signal { data: Value },

    /// 릴레이된 게임 수
    #[serde(rename = "move")]
    Move { pos: Value },

    /// 릴레이된 리셋
    #[serde(rename = "reset")]
    Reset,

    /// 릴레이된 액션 코드
    #[serde(rename = "action")]
    Action { code: Value },

    /// 릴레이된 채팅
    #[serde(rename = "chat")]
    Chat { sender: String, message: String },
}

impl ServerMessage {
    /// JSON 텍스트 프레임으로 직렬화합니다.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 로깅/통계용 메시지 종류 이름
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::RoomCreated { .. } => "roomCreated",
            ServerMessage::RoomJoined { .. } => "roomJoined",
            ServerMessage::PeerJoined { .. } => "peerJoined",
            ServerMessage::PeerDisconnected => "peerDisconnected",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Signal { .. } => "signal",
            ServerMessage::Move { .. } => "move",
            ServerMessage::Reset => "reset",
            ServerMessage::Action { .. } => "action",
            ServerMessage::Chat { .. } => "chat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// 인바운드 프레임 역직렬화 테스트
    #[test]
    fn test_parse_lifecycle_frames() {
        let create = ClientMessage::from_text(r#"{"type":"create","roomId":"room1"}"#).unwrap();
        match create {
            ClientMessage::Create { room_id } => assert_eq!(room_id, "room1"),
            _ => panic!("잘못된 메시지 타입"),
        }

        let join = ClientMessage::from_text(r#"{"type":"join","roomId":"room1"}"#).unwrap();
        assert_eq!(join.kind(), "join");
        assert!(join.is_lifecycle());
    }

    /// 릴레이 프레임의 페이로드가 불투명하게 보존되는지 테스트
    #[test]
    fn test_parse_relay_frames() {
        let signal =
            ClientMessage::from_text(r#"{"type":"signal","data":{"sdp":"v=0"}}"#).unwrap();
        match signal {
            ClientMessage::Signal { room_id, data } => {
                assert_eq!(room_id, None);
                assert_eq!(data, json!({"sdp": "v=0"}));
            }
            _ => panic!("잘못된 메시지 타입"),
        }

        // roomId를 포함하는 기존 클라이언트 형태도 허용
        let with_room = ClientMessage::from_text(
            r#"{"type":"signal","roomId":"room1","data":{"sdp":"v=0"}}"#,
        )
        .unwrap();
        assert!(matches!(
            with_room,
            ClientMessage::Signal { room_id: Some(_), .. }
        ));

        let chat =
            ClientMessage::from_text(r#"{"type":"chat","sender":"A","message":"hi"}"#).unwrap();
        assert_eq!(chat.kind(), "chat");
        assert!(!chat.is_lifecycle());

        let reset = ClientMessage::from_text(r#"{"type":"reset"}"#).unwrap();
        assert!(matches!(reset, ClientMessage::Reset));
    }

    /// 알 수 없는 타입은 역직렬화 에러
    #[test]
    fn test_unknown_type_rejected() {
        assert!(ClientMessage::from_text(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::from_text("not json at all").is_err());
        // 필수 필드 누락도 에러
        assert!(ClientMessage::from_text(r#"{"type":"create"}"#).is_err());
    }

    /// 아웃바운드 프레임 직렬화 형태 테스트
    #[test]
    fn test_server_message_wire_shape() {
        let created = ServerMessage::RoomCreated {
            room_id: "room1".to_string(),
            role: "host".to_string(),
        };
        let value: Value = serde_json::from_str(&created.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "roomCreated");
        assert_eq!(value["roomId"], "room1");
        assert_eq!(value["role"], "host");

        let disconnected = ServerMessage::PeerDisconnected;
        let value: Value = serde_json::from_str(&disconnected.to_text().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "peerDisconnected"}));

        // role 없는 peerJoined는 필드를 생략
        let joined = ServerMessage::PeerJoined { role: None };
        let value: Value = serde_json::from_str(&joined.to_text().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "peerJoined"}));
    }

    /// 릴레이 미러가 원본 필드명을 유지하는지 테스트
    #[test]
    fn test_relay_mirror_field_names() {
        let mirrored = ServerMessage::Move { pos: json!([1, 2]) };
        let value: Value = serde_json::from_str(&mirrored.to_text().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "move", "pos": [1, 2]}));

        let chat = ServerMessage::Chat {
            sender: "A".to_string(),
            message: "hello".to_string(),
        };
        let value: Value = serde_json::from_str(&chat.to_text().unwrap()).unwrap();
        assert_eq!(value["sender"], "A");
        assert_eq!(value["message"], "hello");
    }
}
