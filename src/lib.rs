pub mod features;
pub mod shared;

#[cfg(test)]
pub(crate) mod test_support;

use features::auth::{AuthApi, AuthSession, HttpAuthApi, TokenSource};
use features::expenses::{ExpenseApi, ExpenseStore, HttpExpenseApi};
use features::ui::UiStore;
use log::{info, warn};
use shared::api_client::ApiClient;
use shared::config::{
    initialize_logging_system, load_environment_variables, AppConfig, AuthConfig, UiConfig,
};
use shared::errors::AppResult;
use shared::scheduler::{Clock, SystemClock};
use shared::storage::{FileSnapshotStore, SnapshotStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// アプリケーションの状態コンテナ
///
/// 認証・経費・UIの3つのストアを保持する。グローバルには置かず、
/// 利用側が作成して必要な箇所へ渡す。
pub struct AppContext<A = HttpAuthApi, E = HttpExpenseApi> {
    pub auth: Arc<AuthSession<A>>,
    pub expenses: Arc<ExpenseStore<E>>,
    pub ui: Arc<UiStore>,
    auth_config: AuthConfig,
}

impl AppContext {
    /// 設定からHTTPクライアント・スナップショットファイル・システム時計を用意して作成する
    pub fn new(config: AppConfig) -> AppResult<Self> {
        info!("アプリケーションコンテキストを初期化しています...");

        let client = Arc::new(ApiClient::new(&config.api)?);
        let storage: Arc<dyn SnapshotStore> =
            Arc::new(FileSnapshotStore::open(&config.storage.snapshot_path)?);
        info!(
            "スナップショットファイル: {}",
            config.storage.snapshot_path.display()
        );

        let auth = Arc::new(AuthSession::new(HttpAuthApi::new(client.clone()), storage));
        let tokens: Arc<dyn TokenSource> = auth.clone();
        let expenses = Arc::new(ExpenseStore::new(HttpExpenseApi::new(client, tokens)));
        let ui = Arc::new(UiStore::new(Arc::new(SystemClock::new()), &config.ui));

        info!("アプリケーションコンテキストの初期化が完了しました");
        Ok(Self {
            auth,
            expenses,
            ui,
            auth_config: config.auth,
        })
    }

    /// 環境変数・`.env`を読み込み、ログを初期化してから作成する
    pub fn from_env() -> AppResult<Self> {
        load_environment_variables();
        initialize_logging_system();

        let config = AppConfig::from_env().map_err(|e| {
            warn!("設定の読み込みに失敗しました: {e}");
            e
        })?;
        Self::new(config)
    }
}

impl<A: AuthApi, E: ExpenseApi> AppContext<A, E> {
    /// 任意のAPI実装・ストレージ・時計から作成する
    pub fn with_parts(
        auth_api: A,
        expense_api: E,
        storage: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        ui_config: &UiConfig,
        auth_config: AuthConfig,
    ) -> Self {
        Self {
            auth: Arc::new(AuthSession::new(auth_api, storage)),
            expenses: Arc::new(ExpenseStore::new(expense_api)),
            ui: Arc::new(UiStore::new(clock, ui_config)),
            auth_config,
        }
    }
}

impl<A: AuthApi + 'static, E: ExpenseApi> AppContext<A, E> {
    /// トークンリフレッシュとUIタイマーのタスクを起動する
    ///
    /// tokioランタイム上で呼び出すこと
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let cancel = CancellationToken::new();
        let handles = vec![
            self.auth
                .spawn_refresh_loop(self.auth_config.refresh_interval, cancel.clone()),
            self.ui.spawn_timer_driver(cancel.clone()),
        ];

        info!("バックグラウンドタスクを起動しました: count={}", handles.len());
        BackgroundTasks { cancel, handles }
    }
}

/// 起動済みのバックグラウンドタスク
pub struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// すべてのタスクを停止し、終了を待つ
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("バックグラウンドタスクの終了待ちに失敗しました: {e}");
            }
        }
        info!("バックグラウンドタスクを停止しました");
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
