// ========================================
// ランタイム設定
// ========================================

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_EVENT_DEPTH: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// api_call が何も指定しないときに許可されるホスト
pub fn default_allowed_domains() -> Vec<String> {
    vec!["localhost".to_string(), "127.0.0.1".to_string()]
}

/// プロジェクトファイルの `runtime` セクション、またはCLI引数から組み立てる設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// emit_event の入れ子がこの深さに達したら打ち切る
    pub max_event_depth: usize,
    pub allowed_domains: Vec<String>,
    pub request_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_event_depth: DEFAULT_MAX_EVENT_DEPTH,
            allowed_domains: default_allowed_domains(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_event_depth(mut self, depth: usize) -> Self {
        self.max_event_depth = depth;
        self
    }

    pub fn allow_domain(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        if !self.allowed_domains.iter().any(|d| d.eq_ignore_ascii_case(&host)) {
            self.allowed_domains.push(host);
        }
        self
    }
}
