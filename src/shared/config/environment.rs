use crate::shared::errors::{AppError, AppResult};
use std::path::PathBuf;
use std::time::Duration;

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境変数取得エラー
#[derive(Debug, Clone)]
pub struct EnvVarError {
    /// 変数名
    pub var_name: String,
    /// エラーメッセージ
    pub message: String,
}

impl std::fmt::Display for EnvVarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "環境変数 {} が見つかりません: {}",
            self.var_name, self.message
        )
    }
}

impl std::error::Error for EnvVarError {}

/// 環境変数を取得する（優先順位: 起動時 > コンパイル時 > エラー）
///
/// # 取得順序
/// 1. 起動時の環境変数（`std::env::var`）
/// 2. コンパイル時の環境変数（`option_env!`マクロ）
/// 3. どちらも見つからない場合はエラー
#[macro_export]
macro_rules! get_env_var {
    ($var_name:expr) => {{
        if let Ok(value) = std::env::var($var_name) {
            log::debug!("環境変数 {} を起動時の環境変数から取得しました", $var_name);
            Ok(value)
        } else if let Some(value) = option_env!($var_name) {
            log::debug!("環境変数 {} をコンパイル時の環境変数から取得しました", $var_name);
            Ok(value.to_string())
        } else {
            Err($crate::shared::config::environment::EnvVarError {
                var_name: $var_name.to_string(),
                message: format!(
                    "起動時の環境変数 {} もコンパイル時の環境変数も見つかりませんでした",
                    $var_name
                ),
            })
        }
    }};
}

/// 環境変数を取得する（デフォルト値付き）
#[macro_export]
macro_rules! get_env_var_or_default {
    ($var_name:expr, $default_value:expr) => {{
        $crate::get_env_var!($var_name).unwrap_or_else(|_| {
            log::debug!(
                "環境変数 {} が見つからないため、デフォルト値を使用します: {}",
                $var_name,
                $default_value
            );
            $default_value.to_string()
        })
    }};
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: String,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        let environment = get_environment();
        let debug_mode = environment == Environment::Development;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        Self {
            environment: format!("{environment:?}").to_lowercase(),
            debug_mode,
            log_level,
        }
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. デバッグビルドの場合は Development
/// 3. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = match env_var.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

/// 開発環境（デバッグビルド）の場合のみ.envファイルを読み込む
///
/// 本番環境では環境変数は実行時に設定されることを前提とする
pub fn load_environment_variables() {
    if cfg!(debug_assertions) {
        match dotenv::dotenv() {
            Ok(path) => {
                eprintln!("環境ファイルを読み込みました: {}", path.display());
            }
            Err(e) => {
                eprintln!("環境ファイルの読み込みに失敗: {e}");
            }
        }
    }
}

/// ログシステムを初期化する
///
/// 二重初期化（テストなど）はエラーにせず無視する
pub fn initialize_logging_system() {
    let env_config = EnvironmentConfig::from_env();

    let log_level = match env_config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    let initialized = env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init();

    if initialized.is_ok() {
        log::info!(
            "ログシステムを初期化しました: level={}, environment={}",
            env_config.log_level,
            env_config.environment
        );
    }
}

/// API設定を管理する構造体
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// APIサーバーのベースURL（バージョン付きプレフィックスを含む）
    pub base_url: String,
    /// APIリクエストのタイムアウト（秒）
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl ApiConfig {
    /// 環境変数からAPI設定を読み込む
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = crate::get_env_var_or_default!("API_SERVER_URL", defaults.base_url)
            .trim_end_matches('/')
            .to_string();

        let timeout_seconds = crate::get_env_var_or_default!("API_TIMEOUT_SECONDS", "30")
            .parse()
            .unwrap_or_else(|_| {
                log::warn!(
                    "API_TIMEOUT_SECONDSのパースに失敗しました。デフォルト値30秒を使用します"
                );
                defaults.timeout_seconds
            });

        log::info!("API設定: base_url={base_url}, timeout={timeout_seconds}s");

        Self {
            base_url,
            timeout_seconds,
        }
    }

    /// 設定を検証する
    pub fn validate(&self) -> AppResult<()> {
        if self.base_url.is_empty() {
            return Err(AppError::configuration(
                "APIサーバーのベースURLが設定されていません",
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::configuration(
                "APIタイムアウトは0より大きい値である必要があります",
            ));
        }

        Ok(())
    }

    /// APIサーバーがlocalhostかどうかを判定
    pub fn is_localhost(&self) -> bool {
        self.base_url.contains("localhost") || self.base_url.contains("127.0.0.1")
    }
}

/// 永続化スナップショットの設定
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// スナップショットファイルのパス
    pub snapshot_path: PathBuf,
}

impl StorageConfig {
    /// スナップショットファイル名
    pub const FILE_NAME: &'static str = "storage.json";
    /// アプリケーションデータディレクトリ名
    pub const APP_DIR_NAME: &'static str = "expense-dashboard";

    /// 環境変数から設定を読み込む
    ///
    /// `SNAPSHOT_PATH`が未設定の場合はOSのデータディレクトリ配下を使用する
    pub fn from_env() -> AppResult<Self> {
        if let Ok(path) = crate::get_env_var!("SNAPSHOT_PATH") {
            return Ok(Self {
                snapshot_path: PathBuf::from(path),
            });
        }

        let data_dir = dirs::data_dir().ok_or_else(|| {
            AppError::configuration("アプリデータディレクトリの取得に失敗しました")
        })?;

        Ok(Self {
            snapshot_path: data_dir.join(Self::APP_DIR_NAME).join(Self::FILE_NAME),
        })
    }
}

/// UI層（通知・モーダル）の設定
#[derive(Debug, Clone)]
pub struct UiConfig {
    /// 保持する通知の最大件数
    pub max_notifications: usize,
    /// モーダルを閉じてから登録を削除するまでの遅延
    pub modal_close_delay: Duration,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            max_notifications: 100,
            modal_close_delay: Duration::from_millis(300),
        }
    }
}

impl UiConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_notifications = crate::get_env_var_or_default!("MAX_NOTIFICATIONS", "100")
            .parse()
            .unwrap_or_else(|_| {
                log::warn!("MAX_NOTIFICATIONSのパースに失敗しました。デフォルト値を使用します");
                defaults.max_notifications
            });

        Self {
            max_notifications,
            ..defaults
        }
    }
}

/// 認証セッションの設定
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// サイレントリフレッシュの間隔
    pub refresh_interval: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(25 * 60),
        }
    }
}

/// アプリケーション全体の設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub ui: UiConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    /// 環境変数からすべての設定を読み込み、検証する
    pub fn from_env() -> AppResult<Self> {
        let api = ApiConfig::from_env();
        api.validate()?;

        Ok(Self {
            api,
            storage: StorageConfig::from_env()?,
            ui: UiConfig::from_env(),
            auth: AuthConfig::default(),
        })
    }
}
