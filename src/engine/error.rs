use thiserror::Error;

/// アクション／イベント実行時の失敗の種類
///
/// 呼び出し元には投げずに `RuntimeResult::failure` で文字列として返す。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("InvalidScope: {0}")]
    InvalidScope(String),

    #[error("UnsupportedOperation: {0}")]
    UnsupportedOperation(String),

    #[error("UnsupportedActionType: {0}")]
    UnsupportedActionType(String),

    #[error("DomainNotAllowed: {0}")]
    DomainNotAllowed(String),

    #[error("MaxEventDepthExceeded: depth {depth} reached the limit of {max}")]
    MaxEventDepthExceeded { depth: usize, max: usize },

    #[error("HttpError({status}): {status_text}")]
    HttpError { status: u16, status_text: String },

    /// 評価器の内部エラー（ログに残して握りつぶす）
    #[error("ExpressionEvaluationError: {0}")]
    ExpressionEvaluationError(String),

    #[error("Transport: {0}")]
    Transport(String),
}

impl RuntimeError {
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::ExpressionEvaluationError(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}
