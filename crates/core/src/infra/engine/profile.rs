use std::path::Path;

use crate::domain::job::JobMode;
use crate::domain::settings::AppSettings;

/// エンジンに渡すダウンロードプロファイル
///
/// mode（audio / video）と設定から構築される。エンジン非依存の表現で、
/// sidecar 実装がこれをコマンドライン引数に展開する。
#[derive(Debug, Clone)]
pub struct DownloadProfile {
    /// フォーマットセレクタ（yt-dlp の -f 互換表記）
    pub format_selector: String,
    /// 取得後の後処理
    pub postprocessing: Postprocessing,
    /// 出力パステンプレート（タイトル展開はエンジン側が行う）
    pub output_template: String,
    /// 部分的な失敗でバッチ全体を中断しない
    pub ignore_errors: bool,
}

/// 後処理の種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Postprocessing {
    /// 音声抽出 + 変換（audio モード）
    ExtractAudio { codec: String, quality: String },
    /// 映像・音声のコンテナへのマージ（video モード）
    Merge { container: String },
}

impl DownloadProfile {
    /// mode に応じたプロファイルを構築する
    pub fn build(mode: JobMode, settings: &AppSettings, job_id: &str) -> Self {
        let output_template = output_template(&settings.output_dir, job_id);
        match mode {
            JobMode::Audio => Self {
                format_selector: "bestaudio/best".to_string(),
                postprocessing: Postprocessing::ExtractAudio {
                    codec: "mp3".to_string(),
                    quality: settings.audio_quality.clone(),
                },
                output_template,
                ignore_errors: true,
            },
            JobMode::Video => Self {
                format_selector: video_format_selector(&settings.video_heights),
                postprocessing: Postprocessing::Merge {
                    container: "mp4".to_string(),
                },
                output_template,
                ignore_errors: true,
            },
        }
    }
}

/// 解像度優先リストからフォーマットセレクタを組み立てる
///
/// 各高さの mp4+m4a ペアを降順に並べ、どれにも合わなければ
/// bestvideo+bestaudio/best にフォールバックする。
fn video_format_selector(heights: &[u32]) -> String {
    let mut parts: Vec<String> = heights
        .iter()
        .map(|h| format!("(bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a])"))
        .collect();
    parts.push("bestvideo+bestaudio/best".to_string());
    parts.join("/")
}

/// 出力テンプレートを組み立てる
///
/// タイトルが同一の2ジョブが同じパスを取り合わないよう、ジョブIDの
/// 先頭8文字をサフィックスとして付与する。
fn output_template(output_dir: &Path, job_id: &str) -> String {
    let short: String = job_id.chars().take(8).collect();
    output_dir
        .join(format!("%(title)s [{short}].%(ext)s"))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings() -> AppSettings {
        AppSettings {
            output_dir: PathBuf::from("/downloads"),
            audio_quality: "192".into(),
            video_heights: vec![1080, 720, 360],
        }
    }

    #[test]
    fn test_audio_profile() {
        let p = DownloadProfile::build(JobMode::Audio, &settings(), "aabbccdd-0000");
        assert_eq!(p.format_selector, "bestaudio/best");
        assert_eq!(
            p.postprocessing,
            Postprocessing::ExtractAudio {
                codec: "mp3".into(),
                quality: "192".into()
            }
        );
        assert!(p.ignore_errors);
    }

    #[test]
    fn test_video_selector_descends_then_falls_back() {
        let p = DownloadProfile::build(JobMode::Video, &settings(), "aabbccdd-0000");
        let s = &p.format_selector;
        let i1080 = s.find("height<=1080").unwrap();
        let i720 = s.find("height<=720").unwrap();
        let i360 = s.find("height<=360").unwrap();
        assert!(i1080 < i720 && i720 < i360);
        assert!(s.ends_with("bestvideo+bestaudio/best"));
        assert_eq!(
            p.postprocessing,
            Postprocessing::Merge { container: "mp4".into() }
        );
    }

    #[test]
    fn test_output_template_carries_job_suffix() {
        let p = DownloadProfile::build(JobMode::Video, &settings(), "deadbeef-1234-5678");
        assert!(p.output_template.starts_with("/downloads/"));
        assert!(p.output_template.contains("[deadbeef]"));
        assert!(p.output_template.contains("%(title)s"));
        assert!(p.output_template.ends_with(".%(ext)s"));
    }

    #[test]
    fn test_short_job_id_does_not_panic() {
        let p = DownloadProfile::build(JobMode::Audio, &settings(), "abc");
        assert!(p.output_template.contains("[abc]"));
    }
}
