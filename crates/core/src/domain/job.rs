use serde::Serialize;

/// ダウンロードモード（audio = 音声抽出, video = 映像+音声）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    Audio,
    Video,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// ジョブ状態
///
/// initializing → starting → downloading → {finished | error | cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Initializing,
    Starting,
    Downloading,
    Finished,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Finished => "finished",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// 終端状態かどうか。終端に入ったジョブはそれ以上遷移しない。
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error | Self::Cancelled)
    }
}

/// ジョブレコード
///
/// 状態遷移はすべてこの型のメソッドを通す。各遷移メソッドは終端状態を
/// 先にチェックするため、終端どうしの競合は先着が勝ち、後続は黙って
/// 無視される（呼び出し側にはエラーを返さない）。
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub mode: JobMode,
    /// ダウンロード済みバイト数
    pub progress: u64,
    /// 総バイト数（不明な場合 0）
    pub total: u64,
    /// 進捗率 [0,100]。progress/total から導出され、単独では設定されない
    pub percent: f64,
    /// 直近の転送速度 (bytes/sec)
    pub speed: f64,
    /// キャンセル要求フラグ。一度立ったら降りない
    pub cancelled: bool,
    /// status == Error のときのみ Some
    pub error: Option<String>,
    /// UI 表示用メッセージ
    pub status_message: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    pub fn new(job_id: String, mode: JobMode, now: String) -> Self {
        Self {
            job_id,
            status: JobStatus::Initializing,
            mode,
            progress: 0,
            total: 0,
            percent: 0.0,
            speed: 0.0,
            cancelled: false,
            error: None,
            status_message: "Initializing download... Please wait.".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// progress/total から percent を再計算する（total 不明時は 0）
    fn recompute_percent(&mut self) {
        self.percent = if self.total > 0 {
            ((self.progress as f64 / self.total as f64) * 100.0).min(100.0)
        } else {
            0.0
        };
    }

    /// Runner 起動直後: initializing → starting
    pub fn mark_starting(&mut self, now: String) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Starting;
        self.status_message = "Starting download...".to_string();
        self.updated_at = now;
    }

    /// エンジンが取得を開始: starting → downloading
    pub fn mark_downloading(&mut self, now: String) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Downloading;
        self.status_message = "Downloading...".to_string();
        self.updated_at = now;
    }

    /// downloading イベント: バイトカウンタを更新し percent を再導出する
    pub fn apply_progress(&mut self, downloaded: u64, total: u64, speed: f64, now: String) {
        if self.status.is_terminal() {
            return;
        }
        self.progress = downloaded;
        self.total = total;
        self.speed = speed.max(0.0);
        self.recompute_percent();
        self.updated_at = now;
    }

    /// 正常完了（終端）。percent は終端値 100 を取る
    pub fn finish(&mut self, now: String) {
        if self.status.is_terminal() {
            return;
        }
        // total 不明のまま完了した場合は progress を総量とみなす
        if self.total > 0 {
            self.progress = self.total;
        } else {
            self.total = self.progress;
        }
        self.percent = 100.0;
        self.speed = 0.0;
        self.status = JobStatus::Finished;
        self.status_message = "Download complete.".to_string();
        self.updated_at = now;
    }

    /// エラー終端。message が空の場合は原因不明として記録する
    pub fn fail(&mut self, message: impl Into<String>, now: String) {
        if self.status.is_terminal() {
            return;
        }
        let message = message.into();
        let message = if message.is_empty() {
            "Unknown error".to_string()
        } else {
            message
        };
        self.status_message = message.clone();
        self.error = Some(message);
        self.status = JobStatus::Error;
        self.updated_at = now;
    }

    /// キャンセル終端。Runner がフラグを観測したときのみ呼ばれる
    pub fn mark_cancelled(&mut self, now: String) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Cancelled;
        self.status_message = "Download cancelled.".to_string();
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> String {
        "2025-06-01T12:00:00Z".to_string()
    }

    fn setup_job() -> Job {
        Job::new("job-1".to_string(), JobMode::Video, now())
    }

    #[test]
    fn test_new_job_is_initializing() {
        let job = setup_job();
        assert_eq!(job.status, JobStatus::Initializing);
        assert_eq!(job.progress, 0);
        assert_eq!(job.total, 0);
        assert_eq!(job.percent, 0.0);
        assert!(!job.cancelled);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut job = setup_job();
        job.mark_starting(now());
        assert_eq!(job.status, JobStatus::Starting);
        job.mark_downloading(now());
        assert_eq!(job.status, JobStatus::Downloading);
        job.apply_progress(500, 1000, 128.0, now());
        assert_eq!(job.percent, 50.0);
        job.finish(now());
        assert_eq!(job.status, JobStatus::Finished);
        assert_eq!(job.percent, 100.0);
        assert_eq!(job.progress, 1000);
    }

    #[test]
    fn test_percent_zero_when_total_unknown() {
        let mut job = setup_job();
        job.apply_progress(4096, 0, 0.0, now());
        assert_eq!(job.percent, 0.0);
        assert_eq!(job.progress, 4096);
    }

    #[test]
    fn test_percent_clamped_to_100() {
        let mut job = setup_job();
        job.apply_progress(1100, 1000, 0.0, now());
        assert_eq!(job.percent, 100.0);
    }

    #[test]
    fn test_finish_with_unknown_total_adopts_progress() {
        let mut job = setup_job();
        job.apply_progress(4096, 0, 0.0, now());
        job.finish(now());
        assert_eq!(job.total, 4096);
        assert_eq!(job.percent, 100.0);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut job = setup_job();
        job.finish(now());
        job.fail("late error", now());
        assert_eq!(job.status, JobStatus::Finished);
        assert!(job.error.is_none());

        job.mark_cancelled(now());
        assert_eq!(job.status, JobStatus::Finished);

        job.apply_progress(1, 2, 0.0, now());
        assert_eq!(job.percent, 100.0);
    }

    #[test]
    fn test_error_first_wins_over_finish() {
        let mut job = setup_job();
        job.fail("network reset", now());
        job.finish(now());
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("network reset"));
    }

    #[test]
    fn test_fail_with_empty_message_records_unknown() {
        let mut job = setup_job();
        job.fail("", now());
        assert_eq!(job.error.as_deref(), Some("Unknown error"));
    }

    #[test]
    fn test_error_set_iff_status_error() {
        let mut job = setup_job();
        assert!(job.error.is_none());
        job.fail("boom", now());
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.is_some());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Initializing).unwrap();
        assert_eq!(json, "\"initializing\"");
        let json = serde_json::to_string(&JobMode::Audio).unwrap();
        assert_eq!(json, "\"audio\"");
    }
}
