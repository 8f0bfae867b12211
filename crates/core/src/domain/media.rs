use serde::{Deserialize, Serialize};

/// メタデータ事前取得の結果（ダウンロードなしの probe で得られる）
///
/// title / thumbnail が API 契約上の必須フィールド。それ以外は
/// エンジンの JSON が返せば埋まる任意情報。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
}

impl MediaInfo {
    pub fn new(title: impl Into<String>, thumbnail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            thumbnail: thumbnail.into(),
            duration_secs: None,
            uploader: None,
        }
    }
}
