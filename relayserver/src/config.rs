//! 릴레이 서버 환경 설정 모듈
//!
//! .env 파일과 시스템 환경변수에서 설정을 로드하고 관리합니다.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use crate::service::room_service::TeardownPolicy;

/// 릴레이 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// 리스너 호스트 주소
    pub host: String,
    /// 리스너 포트 번호
    pub port: u16,
    /// 방 정원 (기준값: 2)
    pub room_capacity: usize,
    /// 하트비트 프로브 간격 (초)
    pub heartbeat_interval_secs: u64,
    /// 방 해체 정책
    pub teardown_policy: TeardownPolicy,
    /// 멤버 퇴장 후 역할 재사용 여부
    pub reuse_roles: bool,
    /// 방 전체 브로드캐스트(chat) 시 송신자에게도 에코할지 여부
    pub echo_broadcast: bool,
}

impl RelayServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. .env 파일 (현재/상위 디렉토리)
    /// 2. 시스템 환경변수
    /// 3. 기본값
    pub fn from_env() -> Result<Self> {
        Self::load_env_file();

        let config = Self {
            host: std::env::var("relay_host").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("relay_port")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            room_capacity: std::env::var("room_capacity")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            heartbeat_interval_secs: std::env::var("heartbeat_interval_secs")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            teardown_policy: match std::env::var("teardown_policy").as_deref() {
                Ok("on_host_leave") => TeardownPolicy::OnHostLeave,
                _ => TeardownPolicy::WhenEmpty,
            },
            reuse_roles: std::env::var("reuse_roles")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            echo_broadcast: std::env::var("echo_broadcast")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        };

        info!("릴레이 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 리스너 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = vec![
            ".env",       // 현재 디렉토리
            "../.env",    // 상위 디렉토리
            "../../.env", // 프로젝트 루트
        ];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
        }
    }
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            room_capacity: 2,
            heartbeat_interval_secs: 30,
            teardown_policy: TeardownPolicy::WhenEmpty,
            reuse_roles: true,
            echo_broadcast: true,
        }
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &RelayServerConfig) -> Result<()> {
    if config.port == 0 {
        anyhow::bail!("유효하지 않은 포트 번호: {}", config.port);
    }

    if config.host.is_empty() {
        anyhow::bail!("호스트 주소가 비어있습니다");
    }

    if config.room_capacity < 2 {
        anyhow::bail!("방 정원은 2 이상이어야 합니다: {}", config.room_capacity);
    }

    if config.heartbeat_interval_secs == 0 {
        anyhow::bail!("하트비트 간격은 0이 될 수 없습니다");
    }

    Ok(())
}
