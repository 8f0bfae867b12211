use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::{DownloadEngine, DownloadRequest, EngineError};
use crate::domain::media::MediaInfo;
use crate::domain::progress::{CancelToken, ProgressEvent};

/// SimulatedEngine: スクリプトどおりにイベントを再生するモック実装。
///
/// ネットワークも yt-dlp バイナリも不要で、ライフサイクル一式
/// （完了・エラー・キャンセル）をテストから決定的に再現できる。
pub struct SimulatedEngine {
    info: MediaInfo,
    probe_error: Option<String>,
    script: SimulatedScript,
    step_delay: Duration,
    output_file: Option<PathBuf>,
}

/// download 呼び出し時の挙動スクリプト
#[derive(Debug, Clone)]
pub enum SimulatedScript {
    /// chunks 回の downloading イベントの後に finished
    Finish { total_bytes: u64, chunks: u32 },
    /// after_chunks 回の downloading イベントの後に error イベント
    FailDuring { message: String, after_chunks: u32 },
    /// イベントを流さず即座に Err を返す
    FailImmediately { message: String },
    /// キャンセルされるまで total 不明のまま進捗を流し続ける
    Drip { chunk_bytes: u64 },
}

impl SimulatedEngine {
    /// total_bytes を chunks 分割で流しきって完了するエンジン
    pub fn finishing(total_bytes: u64, chunks: u32) -> Self {
        Self::with_script(SimulatedScript::Finish { total_bytes, chunks })
    }

    pub fn with_script(script: SimulatedScript) -> Self {
        Self {
            info: MediaInfo::new("Simulated Video", "https://example.com/thumb.jpg"),
            probe_error: None,
            script,
            step_delay: Duration::from_millis(1),
            output_file: None,
        }
    }

    /// probe を失敗させる（メタデータ事前検証のエラー経路）
    pub fn probe_error(mut self, message: impl Into<String>) -> Self {
        self.probe_error = Some(message.into());
        self
    }

    pub fn media_info(mut self, info: MediaInfo) -> Self {
        self.info = info;
        self
    }

    /// イベント間の待ち時間。キャンセル競合の再現に使う
    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// 完了時にスタブの出力ファイルを書く
    pub fn output_file(mut self, path: PathBuf) -> Self {
        self.output_file = Some(path);
        self
    }
}

#[async_trait]
impl DownloadEngine for SimulatedEngine {
    async fn probe(&self, _url: &str) -> Result<MediaInfo, EngineError> {
        match &self.probe_error {
            Some(message) => Err(EngineError::metadata(message.clone())),
            None => Ok(self.info.clone()),
        }
    }

    async fn download(
        &self,
        _request: DownloadRequest,
        events: UnboundedSender<ProgressEvent>,
        cancel: CancelToken,
    ) -> Result<(), EngineError> {
        match &self.script {
            SimulatedScript::Finish { total_bytes, chunks } => {
                let chunks = (*chunks).max(1);
                for i in 1..=chunks {
                    if cancel.is_cancelled() {
                        return Err(EngineError::aborted());
                    }
                    let downloaded = total_bytes * u64::from(i) / u64::from(chunks);
                    let _ = events.send(ProgressEvent::Downloading {
                        downloaded_bytes: downloaded,
                        total_bytes: *total_bytes,
                        speed: 1024.0,
                    });
                    tokio::time::sleep(self.step_delay).await;
                }
                if cancel.is_cancelled() {
                    return Err(EngineError::aborted());
                }
                if let Some(path) = &self.output_file {
                    std::fs::write(path, b"simulated media payload")
                        .map_err(|e| EngineError::download(format!("write failed: {e}")))?;
                }
                let _ = events.send(ProgressEvent::Finished {
                    total_bytes: *total_bytes,
                });
                Ok(())
            }
            SimulatedScript::FailDuring { message, after_chunks } => {
                for i in 1..=*after_chunks {
                    if cancel.is_cancelled() {
                        return Err(EngineError::aborted());
                    }
                    let _ = events.send(ProgressEvent::Downloading {
                        downloaded_bytes: u64::from(i) * 1024,
                        total_bytes: 0,
                        speed: 0.0,
                    });
                    tokio::time::sleep(self.step_delay).await;
                }
                let _ = events.send(ProgressEvent::Error {
                    message: message.clone(),
                });
                Err(EngineError::download(message.clone()))
            }
            SimulatedScript::FailImmediately { message } => {
                Err(EngineError::download(message.clone()))
            }
            SimulatedScript::Drip { chunk_bytes } => {
                let mut downloaded = 0u64;
                loop {
                    if cancel.is_cancelled() {
                        return Err(EngineError::aborted());
                    }
                    downloaded += chunk_bytes;
                    let _ = events.send(ProgressEvent::Downloading {
                        downloaded_bytes: downloaded,
                        total_bytes: 0,
                        speed: *chunk_bytes as f64,
                    });
                    tokio::time::sleep(self.step_delay).await;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
