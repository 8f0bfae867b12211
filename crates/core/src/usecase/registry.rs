use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::job::{Job, JobMode};

/// ジョブレジストリ: 実行中・完了済みジョブの並行安全なストア
///
/// 書き込み規律: 状態を変える mutator を渡すのはそのジョブを所有する
/// Runner だけ。他のアクターに許される書き込みは request_cancel による
/// フラグ設定のみ。読み取りはスナップショット（クローン）を返すため、
/// ロックを保持したまま長い処理に入ることはない。
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// ジョブを登録し、採番した job_id を返す
    pub async fn create(&self, mode: JobMode) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let job = Job::new(job_id.clone(), mode, now);

        let mut jobs = self.jobs.lock().await;
        jobs.insert(job_id.clone(), job);

        job_id
    }

    /// ジョブのスナップショットを取得する
    pub async fn get(&self, job_id: &str) -> Option<Job> {
        let jobs = self.jobs.lock().await;
        jobs.get(job_id).cloned()
    }

    /// 排他アクセス下で mutator を適用する。ジョブが存在したかを返す
    ///
    /// レコード全体がロック内で書き換わるため、読み手が途中状態を
    /// 観測することはない。
    pub async fn update<F>(&self, job_id: &str, mutator: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(job_id) {
            Some(job) => {
                mutator(job);
                true
            }
            None => false,
        }
    }

    /// キャンセル要求フラグを立てる。ジョブが存在したかを返す
    ///
    /// 状態遷移はここでは行わない。Runner が次のイベント境界でフラグを
    /// 観測して cancelled に落とす。既に終端のジョブに対しては要求が
    /// 記録されるだけで状態は変わらない。何度呼んでも同じ。
    pub async fn request_cancel(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(job_id) {
            Some(job) => {
                job.cancelled = true;
                true
            }
            None => false,
        }
    }

    /// 登録済みジョブ数
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
