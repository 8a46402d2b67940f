use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// 通信（トランスポート）レベルのエラー
    #[error("ネットワークエラー: {0}")]
    Network(String),

    /// APIサーバーが2xx以外のステータスを返した場合のエラー
    #[error("APIサーバーエラー: status={status}, detail={detail:?}")]
    Api {
        /// HTTPステータスコード
        status: u16,
        /// レスポンスボディの`detail`フィールド（解析できた場合のみ）
        detail: Option<String>,
    },

    /// 成功レスポンスのボディが解析できない場合のエラー
    #[error("レスポンス解析エラー: {0}")]
    InvalidResponse(String),

    /// バリデーション関連のエラー
    #[error("{0}")]
    Validation(String),

    /// 永続化ストレージ関連のエラー
    #[error("ストレージエラー: {0}")]
    Storage(String),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// I/O関連のエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    /// JSON解析エラー
    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// ストアの`error`フィールドに格納する、ユーザー向けメッセージを取得
    ///
    /// # 引数
    /// * `fallback` - サーバーが`detail`を返さなかった場合に使う操作ごとの汎用メッセージ
    ///
    /// # 戻り値
    /// 画面に表示可能なエラーメッセージ
    pub fn surface_message(&self, fallback: &str) -> String {
        match self {
            AppError::Api {
                detail: Some(detail),
                ..
            } => detail.clone(),
            AppError::Validation(msg) => msg.clone(),
            _ => fallback.to_string(),
        }
    }

    /// バリデーションエラーを作成するヘルパー関数
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// ネットワークエラーを作成するヘルパー関数
    pub fn network<S: Into<String>>(message: S) -> Self {
        AppError::Network(message.into())
    }

    /// ストレージエラーを作成するヘルパー関数
    pub fn storage<S: Into<String>>(message: S) -> Self {
        AppError::Storage(message.into())
    }

    /// 設定エラーを作成するヘルパー関数
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;
