use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// アプリケーション設定
///
/// コアは output_dir の存在確認や作成を行わない（起動側の責務）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// ダウンロード先ディレクトリ
    pub output_dir: PathBuf,
    /// audio モードの変換後ビットレート (kbps 指定値、yt-dlp の
    /// --audio-quality に渡る)
    pub audio_quality: String,
    /// video モードの解像度優先リスト（降順で試行し、どれにも合わなければ
    /// best にフォールバック）
    pub video_heights: Vec<u32>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            // OS のダウンロードディレクトリを既定にする
            output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            audio_quality: "192".to_string(),
            video_heights: vec![1080, 720, 360],
        }
    }
}
