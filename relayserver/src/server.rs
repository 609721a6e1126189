//! 릴레이 서버 조립 루트
//!
//! 설정 하나로 모든 서비스를 구성하고 accept 루프를 구동합니다.
//! 방 정원, 해체 정책, 역할 재사용, 하트비트 간격, 브로드캐스트 에코가
//! 전부 `RelayServerConfig`에서 주입되므로 1:1 시그널링부터 N인 방
//! 릴레이까지 동일한 서버 타입으로 동작합니다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::RelayServerConfig;
use crate::handler::{ConnectionHandler, MessageHandler};
use crate::service::{
    ConnectionService, HeartbeatService, MessageService, RelayPolicy, RoomPolicy, RoomService,
};

/// WebSocket 랑데부/릴레이 서버
pub struct RelayServer {
    config: RelayServerConfig,
    connection_service: Arc<ConnectionService>,
    room_service: Arc<RoomService>,
    connection_handler: Arc<ConnectionHandler>,
}

impl RelayServer {
    /// 설정으로부터 서버 구성
    pub fn new(config: RelayServerConfig) -> Self {
        let connection_service = Arc::new(ConnectionService::new());

        let room_policy = RoomPolicy {
            capacity: config.room_capacity,
            teardown: config.teardown_policy,
            reuse_roles: config.reuse_roles,
            ..RoomPolicy::default()
        };
        let room_service = Arc::new(RoomService::new(connection_service.clone(), room_policy));

        let message_service = Arc::new(MessageService::new(
            room_service.clone(),
            connection_service.clone(),
            RelayPolicy {
                echo_broadcast: config.echo_broadcast,
            },
        ));

        let heartbeat_service = Arc::new(HeartbeatService::new(
            connection_service.clone(),
            room_service.clone(),
            Duration::from_secs(config.heartbeat_interval_secs),
        ));

        let message_handler = Arc::new(MessageHandler::new(
            connection_service.clone(),
            room_service.clone(),
            message_service,
        ));

        let connection_handler = Arc::new(ConnectionHandler::new(
            connection_service.clone(),
            room_service.clone(),
            heartbeat_service,
            message_handler,
        ));

        Self {
            config,
            connection_service,
            room_service,
            connection_handler,
        }
    }

    /// 설정된 주소에 리스너를 바인딩합니다.
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.config.bind_address())
            .await
            .with_context(|| format!("리스너 바인딩 실패: {}", self.config.bind_address()))
    }

    /// accept 루프 실행
    ///
    /// 연결별 처리는 개별 태스크로 격리되어 한 연결의 오류가
    /// 서버 전체에 전파되지 않습니다.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            "✅ 릴레이 서버 실행 중: {} (방 정원 {})",
            listener.local_addr()?,
            self.config.room_capacity
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let handler = self.connection_handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler
                            .handle_new_connection(stream, peer_addr.to_string())
                            .await
                        {
                            error!("연결 처리 오류 ({}): {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("연결 수락 실패: {}", e);
                }
            }
        }
    }

    /// 서버 설정 조회
    pub fn config(&self) -> &RelayServerConfig {
        &self.config
    }

    /// 현재 연결 수 조회
    pub fn connection_count(&self) -> usize {
        self.connection_service.get_connection_count()
    }

    /// 현재 방 수 조회
    pub fn room_count(&self) -> usize {
        self.room_service.room_count()
    }
}
