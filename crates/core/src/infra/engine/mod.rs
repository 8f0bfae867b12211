pub mod profile;
mod simulated;
pub mod ytdlp;

pub use profile::{DownloadProfile, Postprocessing};
pub use simulated::{SimulatedEngine, SimulatedScript};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::domain::media::MediaInfo;
use crate::domain::progress::{CancelToken, ProgressEvent};

/// エンジンへのダウンロード依頼（設定オブジェクト + フックのプロトコル）
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub profile: DownloadProfile,
}

/// エンジンエラー
#[derive(Debug, Clone)]
pub struct EngineError {
    /// エラー種別
    pub kind: EngineErrorKind,
    /// 人間が読める詳細メッセージ
    pub detail: String,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EngineError::{:?}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for EngineError {}

/// エンジンエラー種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineErrorKind {
    /// メタデータ取得（probe / 事前検証）の失敗
    Metadata,
    /// 取得・マージ処理の失敗
    Download,
    /// エンジンが利用不可（バイナリ未検出等）
    NotAvailable,
    /// タイムアウト
    Timeout,
    /// キャンセルトークン観測による中断。真のエラーではない
    Aborted,
}

impl EngineError {
    pub fn metadata(detail: impl Into<String>) -> Self {
        Self { kind: EngineErrorKind::Metadata, detail: detail.into() }
    }

    pub fn download(detail: impl Into<String>) -> Self {
        Self { kind: EngineErrorKind::Download, detail: detail.into() }
    }

    pub fn not_available(detail: impl Into<String>) -> Self {
        Self { kind: EngineErrorKind::NotAvailable, detail: detail.into() }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self { kind: EngineErrorKind::Timeout, detail: detail.into() }
    }

    pub fn aborted() -> Self {
        Self { kind: EngineErrorKind::Aborted, detail: "Aborted by cancel token".into() }
    }

    /// キャンセル起因の中断か（ジョブの error には記録しない）
    pub fn is_aborted(&self) -> bool {
        self.kind == EngineErrorKind::Aborted
    }
}

/// ダウンロードエンジンのコアトレイト。全エンジン実装がこれを満たす。
///
/// `async_trait` により dyn DownloadEngine（トレイトオブジェクト）として
/// Runner から利用される。
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// メタデータのみを取得する（ダウンロードなしの事前検証）。
    async fn probe(&self, url: &str) -> Result<MediaInfo, EngineError>;

    /// 取得を実行し、進捗を events に流す。cancel はイベント境界ごとに
    /// 観測し、立っていたら中断して Aborted を返すこと。
    async fn download(
        &self,
        request: DownloadRequest,
        events: UnboundedSender<ProgressEvent>,
        cancel: CancelToken,
    ) -> Result<(), EngineError>;

    /// エンジン名（例: "yt-dlp", "simulated"）。
    fn name(&self) -> &str;
}
