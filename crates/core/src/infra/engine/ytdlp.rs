use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;

use super::{DownloadEngine, DownloadRequest, EngineError, Postprocessing};
use crate::domain::media::MediaInfo;
use crate::domain::progress::{CancelToken, ProgressEvent};

/// 進捗行のプレフィックス。--progress-template で強制する
const PROGRESS_PREFIX: &str = "dl:";

/// stderr は末尾だけ保持してエラー詳細に載せる
const STDERR_TAIL_LINES: usize = 20;

/// キャンセルフラグの観測間隔。進捗行が途絶えても中断できるようにする
const CANCEL_POLL_MS: u64 = 200;

/// yt-dlp sidecar の設定。
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct YtDlpConfig {
    /// yt-dlp バイナリのパス
    pub binary_path: PathBuf,
    /// probe（メタデータ取得）のタイムアウト秒数
    pub probe_timeout_secs: u64,
    /// ネットワーク I/O のソケットタイムアウト秒数（yt-dlp に渡す）
    pub socket_timeout_secs: u64,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("yt-dlp"),
            probe_timeout_secs: 30,
            socket_timeout_secs: 30,
        }
    }
}

/// yt-dlp sidecar プロセスマネージャ。
///
/// probe はダウンロードなしの JSON ダンプ、download は --newline +
/// --progress-template による機械可読な進捗行で駆動する。
pub struct YtDlpSidecar {
    config: parking_lot::RwLock<YtDlpConfig>,
}

impl YtDlpSidecar {
    pub fn new(config: YtDlpConfig) -> Self {
        Self {
            config: parking_lot::RwLock::new(config),
        }
    }

    /// 設定を動的に更新する（バイナリ差し替え・タイムアウト変更）。
    pub fn update_config(&self, config: YtDlpConfig) {
        *self.config.write() = config;
    }

    /// 現在の設定のクローンを取得する。
    pub fn config(&self) -> YtDlpConfig {
        self.config.read().clone()
    }

    /// yt-dlp バイナリの存在を検証する。
    pub fn validate(&self) -> Result<(), EngineError> {
        let config = self.config.read();
        if !config.binary_path.exists() && which_binary(&config.binary_path).is_none() {
            return Err(EngineError::not_available(format!(
                "yt-dlp binary not found: {:?}",
                config.binary_path
            )));
        }
        Ok(())
    }

    /// probe 用のコマンドライン引数を構築する。
    fn build_probe_args(config: &YtDlpConfig, url: &str) -> Vec<String> {
        vec![
            "--dump-single-json".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--socket-timeout".into(),
            config.socket_timeout_secs.to_string(),
            url.into(),
        ]
    }

    /// download 用のコマンドライン引数を構築する。
    fn build_download_args(config: &YtDlpConfig, request: &DownloadRequest) -> Vec<String> {
        let profile = &request.profile;
        let mut args: Vec<String> = vec![
            "--quiet".into(),
            "--progress".into(),
            "--newline".into(),
            "--no-warnings".into(),
            "--no-playlist".into(),
            "--progress-template".into(),
            format!(
                "{PROGRESS_PREFIX}%(progress.downloaded_bytes)s|\
                 %(progress.total_bytes,progress.total_bytes_estimate)s|\
                 %(progress.speed)s"
            ),
            "--socket-timeout".into(),
            config.socket_timeout_secs.to_string(),
            "-f".into(),
            profile.format_selector.clone(),
        ];

        match &profile.postprocessing {
            Postprocessing::ExtractAudio { codec, quality } => {
                args.push("--extract-audio".into());
                args.push("--audio-format".into());
                args.push(codec.clone());
                args.push("--audio-quality".into());
                args.push(quality.clone());
            }
            Postprocessing::Merge { container } => {
                args.push("--merge-output-format".into());
                args.push(container.clone());
            }
        }

        if profile.ignore_errors {
            args.push("--ignore-errors".into());
        }

        args.push("-o".into());
        args.push(profile.output_template.clone());
        args.push(request.url.clone());
        args
    }

    /// probe を実行して JSON 出力をパースする。
    async fn run_probe(&self, url: &str) -> Result<MediaInfo, EngineError> {
        // config のスナップショットを取得（ロック保持を最小化）
        let config = self.config.read().clone();
        let args = Self::build_probe_args(&config, url);

        log::debug!("Running yt-dlp probe: {:?} {:?}", config.binary_path, args);

        let child = Command::new(&config.binary_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&config.binary_path, e))?;

        let probe_timeout = Duration::from_secs(config.probe_timeout_secs);

        let output = timeout(probe_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                EngineError::timeout(format!(
                    "yt-dlp probe timed out after {}s",
                    config.probe_timeout_secs
                ))
            })?
            .map_err(|e| EngineError::metadata(format!("yt-dlp process error: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::metadata(format!(
                "yt-dlp exited with status {}: {}",
                output.status,
                tail_of(&stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_info_json(&stdout)
    }
}

fn spawn_error(binary_path: &Path, e: std::io::Error) -> EngineError {
    if e.kind() == std::io::ErrorKind::NotFound {
        EngineError::not_available(format!("yt-dlp binary not found: {:?}", binary_path))
    } else {
        EngineError::download(format!("Failed to spawn yt-dlp process: {}", e))
    }
}

/// 長い stderr から末尾だけを切り出す。
fn tail_of(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

// ─── yt-dlp JSON デシリアライゼーション ──────────────────────────

/// --dump-single-json の出力のうち、こちらが読むフィールドだけ。
#[derive(Debug, serde::Deserialize)]
struct YtDlpJsonInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnail: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
}

/// probe の JSON 出力をパースする。
fn parse_info_json(output: &str) -> Result<MediaInfo, EngineError> {
    let json_str = output.trim();

    if json_str.is_empty() {
        return Err(EngineError::metadata("yt-dlp returned no metadata"));
    }

    let parsed: YtDlpJsonInfo = serde_json::from_str(json_str).map_err(|e| {
        EngineError::metadata(format!(
            "Failed to parse yt-dlp JSON: {}. Raw: {}",
            e,
            &json_str[..json_str.len().min(500)]
        ))
    })?;

    Ok(MediaInfo {
        title: parsed.title,
        thumbnail: parsed.thumbnail,
        duration_secs: parsed.duration,
        uploader: parsed.uploader,
    })
}

// ─── 進捗行のパース ──────────────────────────────────────────────

/// 進捗行を ProgressEvent に変換する。
///
/// 形式: `dl:<downloaded>|<total>|<speed>`。total / speed は yt-dlp が
/// 算出できない場合 "NA" を出すため、数値以外は 0 として扱う。
fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut parts = rest.split('|');
    let downloaded = parse_u64(parts.next()?);
    let total = parse_u64(parts.next()?);
    let speed = parse_f64(parts.next()?);
    Some(ProgressEvent::Downloading {
        downloaded_bytes: downloaded,
        total_bytes: total,
        speed,
    })
}

fn parse_u64(s: &str) -> u64 {
    // yt-dlp は float 表記で出すことがあるため f64 経由で読む
    s.trim().parse::<f64>().map(|v| v.max(0.0) as u64).unwrap_or(0)
}

fn parse_f64(s: &str) -> f64 {
    s.trim().parse::<f64>().map(|v| v.max(0.0)).unwrap_or(0.0)
}

// ─── DownloadEngine 実装 ─────────────────────────────────────────

#[async_trait::async_trait]
impl DownloadEngine for YtDlpSidecar {
    async fn probe(&self, url: &str) -> Result<MediaInfo, EngineError> {
        self.run_probe(url).await
    }

    async fn download(
        &self,
        request: DownloadRequest,
        events: UnboundedSender<ProgressEvent>,
        cancel: CancelToken,
    ) -> Result<(), EngineError> {
        let config = self.config.read().clone();
        let args = Self::build_download_args(&config, &request);

        log::debug!(
            "Running yt-dlp download: {:?} {:?}",
            config.binary_path,
            args
        );

        let mut child = Command::new(&config.binary_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&config.binary_path, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::download("Failed to capture yt-dlp stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::download("Failed to capture yt-dlp stderr"))?;

        // stderr は並行して末尾だけ吸い上げる
        let stderr_task = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut poll = tokio::time::interval(Duration::from_millis(CANCEL_POLL_MS));
        let mut last_downloaded: u64 = 0;
        let mut last_total: u64 = 0;
        let mut aborted = false;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if cancel.is_cancelled() {
                                aborted = true;
                                break;
                            }
                            if let Some(event) = parse_progress_line(&line) {
                                if let ProgressEvent::Downloading {
                                    downloaded_bytes, total_bytes, ..
                                } = &event
                                {
                                    last_downloaded = *downloaded_bytes;
                                    last_total = *total_bytes;
                                }
                                let _ = events.send(event);
                            }
                        }
                        // EOF またはパイプ切断でループを抜けて exit status を見る
                        Ok(None) | Err(_) => break,
                    }
                }
                _ = poll.tick() => {
                    if cancel.is_cancelled() {
                        aborted = true;
                        break;
                    }
                }
            }
        }

        if aborted {
            let _ = child.kill().await;
            let _ = child.wait().await;
            stderr_task.abort();
            return Err(EngineError::aborted());
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::download(format!("yt-dlp process error: {}", e)))?;

        // EOF 後にフラグが立った場合も中断扱い（終端の決定は Runner が行う）
        if cancel.is_cancelled() {
            stderr_task.abort();
            return Err(EngineError::aborted());
        }

        if !status.success() {
            let stderr_tail = stderr_task.await.unwrap_or_default();
            return Err(EngineError::download(format!(
                "yt-dlp exited with status {}: {}",
                status, stderr_tail
            )));
        }

        stderr_task.abort();
        let _ = events.send(ProgressEvent::Finished {
            total_bytes: last_total.max(last_downloaded),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "yt-dlp"
    }
}

/// PATH 上でバイナリを検索する簡易ヘルパー。
fn which_binary(name: &Path) -> Option<PathBuf> {
    let name_str = name.to_string_lossy();
    if name_str.contains('/') || name_str.contains('\\') {
        // 絶対/相対パスの場合はそのまま返す
        return if name.exists() { Some(name.to_path_buf()) } else { None };
    }
    // PATH 上を検索
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in path_var.split(':') {
            let full_path = PathBuf::from(dir).join(name);
            if full_path.exists() {
                return Some(full_path);
            }
        }
    }
    None
}

// ─── テスト ─────────────────────────────────────────────────────
