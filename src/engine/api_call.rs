// ========================================
// api_call アクションのHTTP層
// ========================================

use crate::engine::BoxFuture;
use crate::engine::error::RuntimeError;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// 送信するリクエスト（ボディは常にJSON）
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    /// JSONとして解釈したボディ（空ボディはnull、JSONでないエラー応答は文字列）
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP送信の抽象（テストでは差し替える）
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, RuntimeError>>;
}

/// reqwestによる実装
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout_ms: u64) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                log::warn!("failed to build http client with timeout: {}", e);
                reqwest::Client::new()
            }
        };
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, RuntimeError>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
                .map_err(|e| RuntimeError::transport(format!("{}: {}", request.method, e)))?;

            log::info!("🌐 {} {}", method, request.url);

            let mut builder = self
                .client
                .request(method, &request.url)
                .header(CONTENT_TYPE, "application/json");
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| RuntimeError::transport(e.to_string()))?;
            let status = response.status();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| RuntimeError::transport(e.to_string()))?;

            let body = if bytes.iter().all(u8::is_ascii_whitespace) {
                Value::Null
            } else {
                match serde_json::from_slice(&bytes) {
                    Ok(body) => body,
                    // エラー応答（プロキシのHTMLなど）はテキストのまま渡す
                    Err(_) if !status.is_success() => {
                        Value::String(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Err(e) => {
                        return Err(RuntimeError::transport(format!("invalid JSON response: {}", e)));
                    }
                }
            };

            Ok(ApiResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                body,
            })
        })
    }
}

/// URLのホスト名が許可リストに含まれるか確認する（大文字小文字は区別しない）
pub fn check_domain(url: &str, allowed: &[String]) -> Result<(), RuntimeError> {
    let parsed = Url::parse(url).map_err(|_| RuntimeError::DomainNotAllowed(url.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| RuntimeError::DomainNotAllowed(url.to_string()))?;

    if allowed.iter().any(|d| d.eq_ignore_ascii_case(host)) {
        Ok(())
    } else {
        Err(RuntimeError::DomainNotAllowed(host.to_string()))
    }
}
