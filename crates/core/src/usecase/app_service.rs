use std::sync::Arc;

use crate::domain::error::AppError;
use crate::domain::job::{Job, JobMode};
use crate::domain::media::MediaInfo;
use crate::domain::settings::AppSettings;
use crate::infra::engine::DownloadEngine;
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::usecase::registry::JobRegistry;
use crate::usecase::runner::JobRunner;

/// アプリケーションサービス（HTTP 層から State として参照される）
///
/// 同期的に返すのは入力検証と存在確認のエラーのみ。ジョブ実行中の
/// エラーは Job レコードに記録され、次のポーリングで観測される。
pub struct DownloadService {
    registry: Arc<JobRegistry>,
    engine: Arc<dyn DownloadEngine>,
    settings: AppSettings,
    metrics: Arc<Metrics>,
}

impl DownloadService {
    pub fn new(engine: Arc<dyn DownloadEngine>, settings: AppSettings) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            engine,
            settings,
            metrics: Arc::new(Metrics::new()),
        }
    }

    // ==================== Jobs ====================

    /// ジョブを作成し Runner タスクを起動する。mode 省略時は video
    pub async fn create_job(
        &self,
        url: &str,
        mode: Option<JobMode>,
    ) -> Result<String, AppError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::invalid_input("No URL provided."));
        }
        let mode = mode.unwrap_or(JobMode::Video);

        let job_id = self.registry.create(mode).await;
        self.metrics.inc_jobs_created();
        log::info!(
            "Created job {} ({}, {} jobs registered)",
            job_id,
            mode.as_str(),
            self.registry.len().await
        );

        JobRunner::spawn(
            self.registry.clone(),
            self.engine.clone(),
            self.metrics.clone(),
            self.settings.clone(),
            job_id.clone(),
            url.to_string(),
            mode,
        );

        Ok(job_id)
    }

    /// ジョブのスナップショットを返す
    pub async fn get_progress(&self, job_id: &str) -> Result<Job, AppError> {
        self.registry
            .get(job_id)
            .await
            .ok_or_else(|| AppError::not_found("Invalid job id."))
    }

    /// キャンセルを要求する。反映は Runner の次のイベント境界
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), AppError> {
        if self.registry.request_cancel(job_id).await {
            log::info!("Cancellation requested for job {}", job_id);
            Ok(())
        } else {
            Err(AppError::not_found("Invalid job id."))
        }
    }

    // ==================== Probe ====================

    /// ジョブを作らないメタデータ照会
    ///
    /// エンジンのエラー詳細は外部契約を安定させるためログにのみ残し、
    /// 呼び出し元へは固定メッセージを返す。
    pub async fn probe_video(&self, url: &str) -> Result<MediaInfo, AppError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::invalid_input("URL is required."));
        }

        match self.engine.probe(url).await {
            Ok(info) => {
                self.metrics.inc_probes_succeeded();
                Ok(info)
            }
            Err(e) => {
                self.metrics.inc_probes_failed();
                log::warn!("Video info probe failed for {}: {}", url, e);
                Err(AppError::probe_failed("Could not retrieve video information."))
            }
        }
    }

    // ==================== Metrics ====================

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }
}
