//! 回声测试服务的 HTTP 接口
//!
//! # API 端点
//!
//! - `GET /health` - 健康检查
//! - `POST /v1/test_me` - 提交单候选 offer，返回 answer

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::{EchoResponder, TestMeRequest, TestMeResponse};
use crate::error::TesterError;

/// 健康检查的固定回复
pub const HEALTH_RESPONSE: &str = "I'm all right! :^)";

type AppState = Arc<EchoResponder>;

/// 构建路由
pub fn router(responder: Arc<EchoResponder>) -> Router {
    // CORS 配置
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/v1/test_me", post(test_me))
        .layer(cors)
        .with_state(responder)
}

/// 健康检查
async fn health_check() -> impl IntoResponse {
    HEALTH_RESPONSE
}

/// 接受 offer 并返回 answer
async fn test_me(
    State(responder): State<AppState>,
    payload: std::result::Result<Json<TestMeRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!("拒绝请求: {}", rejection);
            return (
                StatusCode::BAD_REQUEST,
                "Must send request JSON with an offer",
            )
                .into_response();
        }
    };

    match responder.answer(request).await {
        Ok(answer) => Json(TestMeResponse { answer }).into_response(),
        Err(TesterError::InvalidOffer(reason)) => {
            tracing::info!("拒绝 offer: {}", reason);
            (StatusCode::BAD_REQUEST, reason).into_response()
        }
        Err(e) => {
            tracing::error!("应答失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn serve() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::new(EchoResponder::new()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health() {
        let base = serve().await;
        let body = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, HEALTH_RESPONSE);
    }

    #[tokio::test]
    async fn test_rejects_missing_offer() {
        let base = serve().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/v1/test_me", base))
            .json(&json!({"candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);

        let resp = client
            .post(format!("{}/v1/test_me", base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_rejects_undoctored_offer() {
        let base = serve().await;
        let offer = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host\r\n\
a=candidate:2 1 udp 16777215 203.0.113.7 61234 typ relay\r\n";

        let resp = reqwest::Client::new()
            .post(format!("{}/v1/test_me", base))
            .json(&json!({"offer": {"type": "offer", "sdp": offer}}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        assert_eq!(resp.text().await.unwrap(), "expected 1 candidate, found 2");

        let resp = reqwest::Client::new()
            .post(format!("{}/v1/test_me", base))
            .json(&json!({"offer": {"type": "offer", "sdp": "garbage"}}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }
}
