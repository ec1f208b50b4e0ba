//! Matrix 主服务器客户端
//!
//! 登录并通过客户端-服务器 API 获取 TURN 凭据

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{TurnConfig, TurnConfigProvider};
use crate::error::{Result, TesterError};

/// 登录时使用的设备名
const DEVICE_DISPLAY_NAME: &str = "VoIP Tester";

/// 客户端-服务器 API 前缀
const CLIENT_API_PREFIX: &str = "/_matrix/client/r0";

/// 密码登录请求
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "type")]
    login_type: &'a str,
    identifier: UserIdentifier<'a>,
    password: &'a str,
    initial_device_display_name: &'a str,
}

#[derive(Debug, Serialize)]
struct UserIdentifier<'a> {
    #[serde(rename = "type")]
    id_type: &'a str,
    user: &'a str,
}

/// 登录响应
#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Matrix 标准错误体
#[derive(Debug, Default, Deserialize)]
struct MatrixError {
    errcode: Option<String>,
    error: Option<String>,
}

impl MatrixError {
    fn describe(&self, status: StatusCode) -> String {
        format!(
            "{} {} {}",
            self.errcode.as_deref().unwrap_or("?"),
            self.error.as_deref().unwrap_or("?"),
            status.as_u16()
        )
    }
}

/// Matrix 主服务器客户端
pub struct HomeserverClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HomeserverClient {
    /// 创建新的客户端
    pub fn new(homeserver: &str) -> Result<Self> {
        let url = Url::parse(homeserver)
            .map_err(|e| TesterError::HomeserverConnection(format!("{}: {}", homeserver, e)))?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: url.as_str().trim_end_matches('/').to_string(),
            access_token: None,
        })
    }

    /// 当前访问令牌
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, CLIENT_API_PREFIX, path)
    }

    fn token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| TesterError::BadAccessToken("not logged in".to_string()))
    }

    /// 使用用户 ID 和密码登录
    pub async fn login_with_password(&mut self, user_id: &str, password: &str) -> Result<()> {
        let request = LoginRequest {
            login_type: "m.login.password",
            identifier: UserIdentifier {
                id_type: "m.id.user",
                user: user_id,
            },
            password,
            initial_device_display_name: DEVICE_DISPLAY_NAME,
        };

        debug!("登录主服务器: {}", user_id);

        let response = self
            .client
            .post(self.endpoint("/login"))
            .json(&request)
            .send()
            .await
            .map_err(|e| TesterError::HomeserverConnection(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::OK {
            let login: LoginResponse = response.json().await?;
            self.access_token = Some(login.access_token);
            info!("登录成功: {}", user_id);
            return Ok(());
        }

        let error: MatrixError = response.json().await.unwrap_or_default();
        match status {
            StatusCode::FORBIDDEN => Err(TesterError::BadCredentials(
                error.error.unwrap_or_else(|| "403 on /login".to_string()),
            )),
            StatusCode::BAD_REQUEST => Err(TesterError::LoginFailure(
                error.error.unwrap_or_else(|| "400 on /login".to_string()),
            )),
            _ => Err(TesterError::Homeserver(error.describe(status))),
        }
    }

    /// 使用已有访问令牌登录
    ///
    /// 通过 `/account/whoami` 确认令牌可用
    pub async fn login_with_access_token(&mut self, access_token: &str) -> Result<()> {
        self.access_token = Some(access_token.to_string());

        let response = self
            .client
            .get(self.endpoint("/account/whoami"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                TesterError::HomeserverConnection(format!(
                    "Failed to connect for /account/whoami: {}",
                    e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error: MatrixError = response.json().await.unwrap_or_default();
            return Err(TesterError::BadAccessToken(error.describe(status)));
        }

        debug!("访问令牌有效");
        Ok(())
    }
}

#[async_trait]
impl TurnConfigProvider for HomeserverClient {
    async fn get_turn_config(&self) -> Result<TurnConfig> {
        let response = self
            .client
            .get(self.endpoint("/voip/turnServer"))
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(|e| TesterError::HomeserverConnection(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let error: MatrixError = response.json().await.unwrap_or_default();
            return Err(TesterError::TurnCredentials(error.describe(status)));
        }

        let config: TurnConfig = response
            .json()
            .await
            .map_err(|e| TesterError::TurnCredentials(format!("invalid response: {}", e)))?;

        info!("获取到 {} 个 TURN URI", config.uris.len());
        config.ensure_servers()
    }
}
