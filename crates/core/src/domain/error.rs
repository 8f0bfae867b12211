use serde::Serialize;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_INVALID_INPUT")]
    InvalidInput,
    #[serde(rename = "E_NOT_FOUND")]
    NotFound,
    #[serde(rename = "E_PROBE_FAILED")]
    ProbeFailed,
    #[serde(rename = "E_METADATA")]
    Metadata,
    #[serde(rename = "E_ENGINE")]
    Engine,
    #[serde(rename = "E_CANCELLED")]
    Cancelled,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

/// アプリケーションエラー（同期APIのエラーペイロード兼用）
///
/// ジョブ実行中のエラーはここには乗らず、Job レコードの `error` に
/// 記録される（非同期実行のため呼び出し元が存在しない）。
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::NotFound,
            message: msg.into(),
        }
    }

    pub fn probe_failed(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ProbeFailed,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
