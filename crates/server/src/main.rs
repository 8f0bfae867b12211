mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use tg_core::domain::settings::AppSettings;
use tg_core::infra::engine::ytdlp::{YtDlpConfig, YtDlpSidecar};
use tg_core::usecase::app_service::DownloadService;

/// ダウンロード先ディレクトリの解決（環境変数 > OS の Downloads）
fn resolve_output_dir() -> PathBuf {
    std::env::var("TUBEGRAB_OUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let output_dir = resolve_output_dir();
    // ディレクトリ作成は起動側の責務（コアはパスを受け取るだけ）
    std::fs::create_dir_all(&output_dir).expect("出力ディレクトリの作成に失敗しました");

    let settings = AppSettings {
        output_dir,
        ..Default::default()
    };

    let mut ytdlp_config = YtDlpConfig::default();
    if let Ok(bin) = std::env::var("TUBEGRAB_YTDLP_BIN") {
        ytdlp_config.binary_path = PathBuf::from(bin);
    }
    let engine = YtDlpSidecar::new(ytdlp_config);
    if let Err(e) = engine.validate() {
        log::warn!("yt-dlp が見つかりません。インストールされるまでダウンロードは失敗します: {e}");
    }

    let service = Arc::new(DownloadService::new(Arc::new(engine), settings.clone()));
    log::info!(
        "tubegrab-server starting (output dir: {})",
        settings.output_dir.display()
    );

    let app = Router::new()
        .route("/download", post(routes::download))
        .route("/progress", get(routes::progress))
        .route("/cancel", post(routes::cancel))
        .route("/get_video_info", post(routes::get_video_info))
        .route("/metrics", get(routes::metrics))
        .with_state(service);

    let addr = std::env::var("TUBEGRAB_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("リッスンソケットのバインドに失敗しました");
    log::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .expect("error while running http server");
}
