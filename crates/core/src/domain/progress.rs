use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// ダウンロードエンジンから発行される正規化イベント
///
/// エンジン実装（sidecar / simulated）が何であれ、Runner はこの3種類
/// だけを扱う。1ジョブにつき単一プロデューサなので発行順 = 適用順。
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// 取得中。total_bytes は不明なら 0
    Downloading {
        downloaded_bytes: u64,
        total_bytes: u64,
        /// bytes/sec。エンジンが算出できない場合 0
        speed: f64,
    },
    /// 取得完了（後処理含む）
    Finished { total_bytes: u64 },
    /// エンジン内エラー
    Error { message: String },
}

/// 協調キャンセルトークン
///
/// Runner が立て、エンジンがイベント境界ごとに観測する。フック内での
/// 例外送出のような制御フローは使わず、エンジンは観測後に自発的に
/// 中断して Aborted を返す。一度立ったら降りない。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_starts_clear() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancelToken::new();
        let shared = token.clone();
        token.cancel();
        assert!(shared.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
