use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::job::{JobMode, JobStatus};
use crate::domain::progress::{CancelToken, ProgressEvent};
use crate::domain::settings::AppSettings;
use crate::infra::engine::{DownloadEngine, DownloadProfile, DownloadRequest};
use crate::infra::metrics::Metrics;
use crate::usecase::registry::JobRegistry;

/// ジョブランナー: 1ジョブを開始から終端まで駆動するタスク
///
/// ジョブレコードへの状態遷移書き込みはこのタスクだけが行う
/// （単一ライター規律）。レジストリのロックは短い臨界区間でのみ取り、
/// エンジン I/O を跨いで保持しない。
pub struct JobRunner;

impl JobRunner {
    /// ジョブ専用タスクを起動する
    pub fn spawn(
        registry: Arc<JobRegistry>,
        engine: Arc<dyn DownloadEngine>,
        metrics: Arc<Metrics>,
        settings: AppSettings,
        job_id: String,
        url: String,
        mode: JobMode,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            Self::drive(&registry, &engine, &metrics, &settings, &job_id, &url, mode).await;

            // 終端の確定をメトリクスとログに反映する
            if let Some(job) = registry.get(&job_id).await {
                match job.status {
                    JobStatus::Finished => metrics.inc_jobs_finished(),
                    JobStatus::Error => metrics.inc_jobs_errored(),
                    JobStatus::Cancelled => metrics.inc_jobs_cancelled(),
                    _ => {}
                }
                log::info!(
                    "Job {} terminated: {} ({} bytes)",
                    job.job_id,
                    job.status.as_str(),
                    job.progress
                );
            }
        })
    }

    /// ライフサイクル本体。戻る時点でジョブは必ず終端状態になっている
    async fn drive(
        registry: &JobRegistry,
        engine: &Arc<dyn DownloadEngine>,
        metrics: &Metrics,
        settings: &AppSettings,
        job_id: &str,
        url: &str,
        mode: JobMode,
    ) {
        // Runner 起動前にキャンセル要求が届いていた場合はここで終端に落とす
        match registry.get(job_id).await {
            Some(job) if job.cancelled => {
                registry
                    .update(job_id, |j| j.mark_cancelled(now()))
                    .await;
                return;
            }
            Some(_) => {}
            None => return,
        }

        registry.update(job_id, |j| j.mark_starting(now())).await;

        // メタデータ事前検証。到達不能・無効なリソースに対して
        // ダウンロードを開始しないための関門
        let probe_started = Instant::now();
        let info = match engine.probe(url).await {
            Ok(info) => {
                metrics.inc_probes_succeeded();
                metrics.record_latency("probe", probe_started.elapsed().as_millis() as u64);
                info
            }
            Err(e) => {
                metrics.inc_probes_failed();
                log::warn!("Job {}: metadata pre-check failed: {}", job_id, e);
                registry
                    .update(job_id, |j| {
                        j.fail(
                            format!("Failed to retrieve video information. {}", e.detail),
                            now(),
                        )
                    })
                    .await;
                return;
            }
        };
        log::info!("Job {}: downloading \"{}\" ({})", job_id, info.title, mode.as_str());

        // probe 中にキャンセルされていればダウンロードには進まない
        if flag_set(registry, job_id).await {
            registry.update(job_id, |j| j.mark_cancelled(now())).await;
            return;
        }

        let request = DownloadRequest {
            url: url.to_string(),
            profile: DownloadProfile::build(mode, settings, job_id),
        };
        registry.update(job_id, |j| j.mark_downloading(now())).await;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();
        let download_started = Instant::now();

        let engine_task = tokio::spawn({
            let engine = Arc::clone(engine);
            let cancel = cancel.clone();
            async move { engine.download(request, events_tx, cancel).await }
        });

        // イベント適用ループ。1ジョブにつき単一プロデューサなので
        // 受信順 = エンジンの発行順
        while let Some(event) = events_rx.recv().await {
            match event {
                ProgressEvent::Downloading {
                    downloaded_bytes,
                    total_bytes,
                    speed,
                } => {
                    let mut flagged = false;
                    registry
                        .update(job_id, |j| {
                            j.apply_progress(downloaded_bytes, total_bytes, speed, now());
                            flagged = j.cancelled;
                        })
                        .await;
                    if flagged {
                        // エンジンへ中断を通知し、終端を確定する。以降の
                        // イベントは終端固定により適用されても無効
                        cancel.cancel();
                        registry.update(job_id, |j| j.mark_cancelled(now())).await;
                    }
                }
                ProgressEvent::Finished { total_bytes } => {
                    registry
                        .update(job_id, |j| {
                            if total_bytes > 0 {
                                j.apply_progress(total_bytes, total_bytes, 0.0, now());
                            }
                            if j.cancelled {
                                j.mark_cancelled(now());
                            } else {
                                j.finish(now());
                            }
                        })
                        .await;
                }
                ProgressEvent::Error { message } => {
                    registry.update(job_id, |j| j.fail(message, now())).await;
                }
            }
        }

        let result = engine_task.await;
        metrics.record_latency(
            "download",
            download_started.elapsed().as_millis() as u64,
        );

        // エンジン終了後の最終判定。まだ終端でなければここで必ず決める。
        // キャンセル起因の Aborted は既存の error を上書きしない
        registry
            .update(job_id, |j| {
                if j.status.is_terminal() {
                    return;
                }
                match &result {
                    Ok(Ok(())) => {
                        if j.cancelled {
                            j.mark_cancelled(now());
                        } else {
                            j.finish(now());
                        }
                    }
                    Ok(Err(e)) if e.is_aborted() => j.mark_cancelled(now()),
                    Ok(Err(e)) => {
                        if j.cancelled {
                            j.mark_cancelled(now());
                        } else {
                            j.fail(e.detail.clone(), now());
                        }
                    }
                    Err(join_err) => j.fail(
                        format!("Unexpected failure during download: {}", join_err),
                        now(),
                    ),
                }
            })
            .await;
    }
}

async fn flag_set(registry: &JobRegistry, job_id: &str) -> bool {
    registry
        .get(job_id)
        .await
        .map(|job| job.cancelled)
        .unwrap_or(false)
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::engine::{SimulatedEngine, SimulatedScript};
    use std::time::Duration;

    fn deps() -> (Arc<JobRegistry>, Arc<Metrics>, AppSettings) {
        (
            Arc::new(JobRegistry::new()),
            Arc::new(Metrics::new()),
            AppSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_happy_path_finishes() {
        let (registry, metrics, settings) = deps();
        let engine: Arc<dyn DownloadEngine> = Arc::new(SimulatedEngine::finishing(4096, 4));
        let job_id = registry.create(JobMode::Video).await;

        JobRunner::spawn(
            registry.clone(),
            engine,
            metrics.clone(),
            settings,
            job_id.clone(),
            "https://example.com/v".into(),
            JobMode::Video,
        )
        .await
        .unwrap();

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Finished);
        assert_eq!(job.percent, 100.0);
        assert_eq!(job.progress, 4096);
        assert!(job.error.is_none());
        assert_eq!(metrics.summary().jobs_finished, 1);
    }

    #[tokio::test]
    async fn test_probe_failure_is_terminal_error() {
        let (registry, metrics, settings) = deps();
        let engine: Arc<dyn DownloadEngine> =
            Arc::new(SimulatedEngine::finishing(100, 1).probe_error("404 not found"));
        let job_id = registry.create(JobMode::Video).await;

        JobRunner::spawn(
            registry.clone(),
            engine,
            metrics.clone(),
            settings,
            job_id.clone(),
            "https://unreachable".into(),
            JobMode::Video,
        )
        .await
        .unwrap();

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        let error = job.error.unwrap();
        assert!(error.starts_with("Failed to retrieve video information."));
        assert!(error.contains("404 not found"));
        assert_eq!(metrics.summary().probes_failed, 1);
        assert_eq!(metrics.summary().jobs_errored, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_runner_starts() {
        let (registry, metrics, settings) = deps();
        let engine: Arc<dyn DownloadEngine> = Arc::new(SimulatedEngine::finishing(100, 1));
        let job_id = registry.create(JobMode::Video).await;

        registry.request_cancel(&job_id).await;

        JobRunner::spawn(
            registry.clone(),
            engine,
            metrics.clone(),
            settings,
            job_id.clone(),
            "https://example.com/v".into(),
            JobMode::Video,
        )
        .await
        .unwrap();

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(metrics.summary().jobs_cancelled, 1);
    }

    #[tokio::test]
    async fn test_cancel_during_download() {
        let (registry, metrics, settings) = deps();
        let engine: Arc<dyn DownloadEngine> = Arc::new(
            SimulatedEngine::with_script(SimulatedScript::Drip { chunk_bytes: 64 })
                .step_delay(Duration::from_millis(5)),
        );
        let job_id = registry.create(JobMode::Video).await;

        let handle = JobRunner::spawn(
            registry.clone(),
            engine,
            metrics,
            settings,
            job_id.clone(),
            "https://example.com/v".into(),
            JobMode::Video,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.request_cancel(&job_id).await;
        handle.await.unwrap();

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_engine_error_event_is_recorded() {
        let (registry, metrics, settings) = deps();
        let engine: Arc<dyn DownloadEngine> =
            Arc::new(SimulatedEngine::with_script(SimulatedScript::FailDuring {
                message: "fragment 3 failed".into(),
                after_chunks: 2,
            }));
        let job_id = registry.create(JobMode::Audio).await;

        JobRunner::spawn(
            registry.clone(),
            engine,
            metrics,
            settings,
            job_id.clone(),
            "https://example.com/v".into(),
            JobMode::Audio,
        )
        .await
        .unwrap();

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("fragment 3 failed"));
    }

    #[tokio::test]
    async fn test_engine_failure_without_events() {
        let (registry, metrics, settings) = deps();
        let engine: Arc<dyn DownloadEngine> =
            Arc::new(SimulatedEngine::with_script(SimulatedScript::FailImmediately {
                message: "merge failed".into(),
            }));
        let job_id = registry.create(JobMode::Video).await;

        JobRunner::spawn(
            registry.clone(),
            engine,
            metrics,
            settings,
            job_id.clone(),
            "https://example.com/v".into(),
            JobMode::Video,
        )
        .await
        .unwrap();

        let job = registry.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("merge failed"));
    }
}
