//! 릴레이 서버 메인 진입점
//!
//! 환경변수 (기본값):
//! - `relay_host` (0.0.0.0), `relay_port` (8080)
//! - `room_capacity` (2), `heartbeat_interval_secs` (30)
//! - `teardown_policy` (when_empty | on_host_leave)
//! - `reuse_roles` (true), `echo_broadcast` (true)

use anyhow::Result;
use tracing::{error, info};

use relayserver::config::{validate_config, RelayServerConfig};
use relayserver::server::RelayServer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RelayServerConfig::from_env()?;
    validate_config(&config)?;

    info!("=== 릴레이 서버 시작 ===");
    info!("리스너 주소: {}", config.bind_address());
    info!("방 정원: {}", config.room_capacity);
    info!("하트비트 간격: {}초", config.heartbeat_interval_secs);
    info!("해체 정책: {:?}", config.teardown_policy);
    info!("========================");

    let server = RelayServer::new(config);
    let listener = server.bind().await?;

    tokio::select! {
        result = server.serve(listener) => {
            if let Err(e) = result {
                error!("릴레이 서버 실행 오류: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("종료 시그널 수신, 서버를 중지합니다");
        }
    }

    Ok(())
}
