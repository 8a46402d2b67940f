/// 認証セッションストア
///
/// 現在のユーザーとBearerトークンのライフサイクル（ログイン・登録・ログアウト・
/// サイレントリフレッシュ）を管理する。ユーザー・トークン・認証済みフラグは
/// 変更のたびにスナップショットストアへ書き出され、再起動後に復元される。
use crate::features::auth::api::AuthApi;
use crate::features::auth::models::{
    AuthResponse, AuthState, LoginRequest, PersistedAuth, RegisterRequest, User,
};
use crate::shared::errors::AppResult;
use crate::shared::storage::{load_snapshot, save_snapshot, SnapshotStore};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// スナップショットストア上のキー
pub const AUTH_STORAGE_KEY: &str = "auth-storage";

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";

/// 認証済みリクエストに付与するトークンの供給元
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// 認証済みの間のトークン（未認証ならNone）
fn active_token(state: &AuthState) -> Option<String> {
    state
        .token
        .clone()
        .filter(|_| state.is_authenticated)
}

/// 認証セッション
pub struct AuthSession<A> {
    api: A,
    storage: Arc<dyn SnapshotStore>,
    state: Mutex<AuthState>,
    /// リフレッシュ間隔の起点を決める、認証済みトークンの変更通知
    active_token: watch::Sender<Option<String>>,
}

impl<A: AuthApi> AuthSession<A> {
    /// スナップショットから状態を復元してセッションを作成する
    ///
    /// スナップショットが読めない場合は未ログイン状態で開始する
    pub fn new(api: A, storage: Arc<dyn SnapshotStore>) -> Self {
        let state = match load_snapshot::<PersistedAuth>(storage.as_ref(), AUTH_STORAGE_KEY) {
            Ok(Some(persisted)) => {
                let state = AuthState::from_persisted(persisted);
                log::info!(
                    "認証セッションを復元しました: authenticated={}",
                    state.is_authenticated
                );
                state
            }
            Ok(None) => AuthState::default(),
            Err(e) => {
                log::warn!("認証スナップショットの読み込みに失敗しました: {e}");
                AuthState::default()
            }
        };

        let (active_token, _) = watch::channel(active_token(&state));
        Self {
            api,
            storage,
            state: Mutex::new(state),
            active_token,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 永続化対象のフィールドをスナップショットに書き出し、
    /// 認証済みトークンが変わった場合はリフレッシュ待ちに通知する
    ///
    /// 書き込み失敗は状態遷移を妨げない
    fn persist(&self, state: &AuthState) {
        let token = active_token(state);
        self.active_token.send_if_modified(|current| {
            if *current == token {
                return false;
            }
            *current = token;
            true
        });

        if let Err(e) = save_snapshot(self.storage.as_ref(), AUTH_STORAGE_KEY, &state.to_persisted())
        {
            log::warn!("認証スナップショットの保存に失敗しました: {e}");
        }
    }

    /// 現在の状態のコピー
    pub fn snapshot(&self) -> AuthState {
        self.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_authenticated
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    fn begin_request(&self) {
        let mut state = self.lock();
        state.is_loading = true;
        state.error = None;
    }

    fn finish_authentication(&self, result: AppResult<AuthResponse>, fallback: &str) {
        let mut state = self.lock();
        match result {
            Ok(response) => {
                log::info!("認証に成功しました: user_id={}", response.user.id);
                state.user = Some(response.user);
                state.token = Some(response.access_token);
                state.is_authenticated = true;
                state.is_loading = false;
                state.error = None;
                self.persist(&state);
            }
            Err(e) => {
                log::warn!("認証に失敗しました: {e}");
                state.error = Some(e.surface_message(fallback));
                state.is_loading = false;
            }
        }
    }

    /// メールアドレスとパスワードでログインする
    ///
    /// 失敗は`error`に記録され、呼び出し元には伝播しない
    pub async fn login(&self, email: &str, password: &str) {
        self.begin_request();

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let result = self.api.login(&request).await;

        self.finish_authentication(result, LOGIN_FAILED);
    }

    /// ユーザー登録し、成功した場合はそのままログイン状態にする
    pub async fn register(&self, request: RegisterRequest) {
        self.begin_request();

        let result = self.api.register(&request).await;

        self.finish_authentication(result, REGISTRATION_FAILED);
    }

    /// ローカルのセッション情報を破棄する（通信なし）
    pub fn logout(&self) {
        let mut state = self.lock();
        state.user = None;
        state.token = None;
        state.is_authenticated = false;
        state.error = None;
        self.persist(&state);

        log::info!("ログアウトしました");
    }

    /// 現在のトークンでサイレントリフレッシュを行う
    ///
    /// トークンがない場合は何もしない。失敗した場合はセッション終了として
    /// ログアウトする（リトライしない）。
    pub async fn refresh_token(&self) {
        let Some(token) = self.token() else {
            return;
        };

        let result = self.api.refresh(&token).await;

        let mut state = self.lock();
        if state.token.as_deref() != Some(token.as_str()) {
            // 通信中にログアウト・再ログインされた場合は結果を捨てる
            log::debug!("リフレッシュ中にトークンが変更されたため結果を破棄します");
            return;
        }

        match result {
            Ok(response) => {
                state.token = Some(response.access_token);
                state.sync_authenticated();
                self.persist(&state);
                log::info!("アクセストークンを更新しました");
            }
            Err(e) => {
                log::warn!("トークンの更新に失敗したためログアウトします: {e}");
                drop(state);
                self.logout();
            }
        }
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn set_loading(&self, loading: bool) {
        self.lock().is_loading = loading;
    }

    /// ユーザーを差し替える（認証済みフラグは再計算される）
    pub fn set_user(&self, user: Option<User>) {
        let mut state = self.lock();
        state.user = user;
        state.sync_authenticated();
        self.persist(&state);
    }

    /// トークンを差し替える（認証済みフラグは再計算される）
    pub fn set_token(&self, token: Option<String>) {
        let mut state = self.lock();
        state.token = token;
        state.sync_authenticated();
        self.persist(&state);
    }
}

impl<A: AuthApi + 'static> AuthSession<A> {
    /// 一定間隔でサイレントリフレッシュを行うタスクを起動する
    ///
    /// 認証済みの間だけ`refresh_token`を呼ぶ。間隔はログインやトークン更新など
    /// 認証済みトークンが変わった時点から数え直す。
    /// `cancel`がキャンセルされるとタスクは終了する。
    pub fn spawn_refresh_loop(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let mut token_changes = self.active_token.subscribe();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            log::debug!("トークンリフレッシュタスクを開始しました: period={period:?}");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        log::debug!("トークンリフレッシュタスクを停止しました");
                        break;
                    }
                    changed = token_changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        ticker.reset();
                        log::debug!("認証状態が変わったためリフレッシュ間隔を数え直します");
                    }
                    _ = ticker.tick() => {
                        if session.is_authenticated() {
                            session.refresh_token().await;
                        }
                    }
                }
            }
        })
    }
}

impl<A: AuthApi> TokenSource for AuthSession<A> {
    fn bearer_token(&self) -> Option<String> {
        self.token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::models::UserRole;
    use crate::shared::errors::AppError;
    use crate::shared::storage::MemorySnapshotStore;
    use crate::test_support::{user, MockAuthApi};
    use serde_json::json;

    fn session_with(api: MockAuthApi) -> (Arc<MemorySnapshotStore>, AuthSession<MockAuthApi>) {
        let storage = Arc::new(MemorySnapshotStore::new());
        let session = AuthSession::new(api, storage.clone() as Arc<dyn SnapshotStore>);
        (storage, session)
    }

    fn auth_response(token: &str) -> AuthResponse {
        AuthResponse {
            user: user("u1", UserRole::Employee),
            access_token: token.to_string(),
        }
    }

    async fn signed_in(api: MockAuthApi) -> (Arc<MemorySnapshotStore>, AuthSession<MockAuthApi>) {
        api.push_login(Ok(auth_response("token-1")));
        let (storage, session) = session_with(api);
        session.login("taro@example.com", "secret").await;
        assert!(session.is_authenticated());
        (storage, session)
    }

    #[tokio::test]
    async fn test_login_success_sets_session() {
        let api = MockAuthApi::new();
        api.push_login(Ok(auth_response("token-1")));
        let (storage, session) = session_with(api.clone());

        session.login("taro@example.com", "secret").await;

        let state = session.snapshot();
        assert!(state.is_authenticated);
        assert_eq!(state.token.as_deref(), Some("token-1"));
        assert_eq!(state.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
        assert!(!state.is_loading);
        assert_eq!(state.error, None);

        let requests = api.login_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].email, "taro@example.com");

        let persisted = storage.load(AUTH_STORAGE_KEY).unwrap().unwrap();
        assert_eq!(persisted["token"], json!("token-1"));
        assert_eq!(persisted["isAuthenticated"], json!(true));
    }

    #[tokio::test]
    async fn test_login_failure_records_detail() {
        let api = MockAuthApi::new();
        api.push_login(Err(AppError::Api {
            status: 401,
            detail: Some("Invalid email or password".to_string()),
        }));
        let (_, session) = session_with(api);

        session.login("taro@example.com", "wrong").await;

        let state = session.snapshot();
        assert!(!state.is_authenticated);
        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some("Invalid email or password"));
    }

    #[tokio::test]
    async fn test_login_transport_failure_uses_generic_message() {
        let api = MockAuthApi::new();
        api.push_login(Err(AppError::network("connection refused")));
        let (_, session) = session_with(api);

        session.login("taro@example.com", "secret").await;

        assert_eq!(session.snapshot().error.as_deref(), Some("Login failed"));
    }

    #[tokio::test]
    async fn test_register_auto_login() {
        let api = MockAuthApi::new();
        api.push_register(Ok(auth_response("token-new")));
        let (_, session) = session_with(api.clone());

        session
            .register(RegisterRequest {
                email: "hanako@example.com".to_string(),
                password: "secret".to_string(),
                first_name: "hanako".to_string(),
                last_name: "suzuki".to_string(),
                department: Some("経理部".to_string()),
            })
            .await;

        assert!(session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("token-new"));
        assert_eq!(api.register_requests()[0].department.as_deref(), Some("経理部"));
    }

    #[tokio::test]
    async fn test_register_failure_without_detail() {
        let api = MockAuthApi::new();
        api.push_register(Err(AppError::Api {
            status: 500,
            detail: None,
        }));
        let (_, session) = session_with(api);

        session
            .register(RegisterRequest {
                email: "hanako@example.com".to_string(),
                password: "secret".to_string(),
                first_name: "hanako".to_string(),
                last_name: "suzuki".to_string(),
                department: None,
            })
            .await;

        assert_eq!(
            session.snapshot().error.as_deref(),
            Some("Registration failed")
        );
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_and_persists() {
        let (storage, session) = signed_in(MockAuthApi::new()).await;

        session.logout();

        let state = session.snapshot();
        assert_eq!(state.user, None);
        assert_eq!(state.token, None);
        assert!(!state.is_authenticated);

        let persisted = storage.load(AUTH_STORAGE_KEY).unwrap().unwrap();
        assert_eq!(persisted["token"], json!(null));
        assert_eq!(persisted["isAuthenticated"], json!(false));
    }

    #[tokio::test]
    async fn test_refresh_replaces_token_only() {
        let api = MockAuthApi::new();
        let (_, session) = signed_in(api.clone()).await;
        let user_before = session.user();
        api.push_refresh(Ok(crate::features::auth::models::RefreshResponse {
            access_token: "token-2".to_string(),
        }));

        session.refresh_token().await;

        assert_eq!(session.token().as_deref(), Some("token-2"));
        assert_eq!(session.user(), user_before);
        assert_eq!(api.refresh_tokens(), vec!["token-1".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_failure_logs_out() {
        let api = MockAuthApi::new();
        let (storage, session) = signed_in(api.clone()).await;
        api.push_refresh(Err(AppError::Api {
            status: 401,
            detail: Some("Token expired".to_string()),
        }));

        session.refresh_token().await;

        let state = session.snapshot();
        assert_eq!(state.user, None);
        assert_eq!(state.token, None);
        assert!(!state.is_authenticated);
        let persisted = storage.load(AUTH_STORAGE_KEY).unwrap().unwrap();
        assert_eq!(persisted["isAuthenticated"], json!(false));
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_noop() {
        let api = MockAuthApi::new();
        let (_, session) = session_with(api.clone());

        session.refresh_token().await;

        assert!(api.refresh_tokens().is_empty());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_session_restored_from_snapshot() {
        let storage = Arc::new(MemorySnapshotStore::new());
        save_snapshot(
            storage.as_ref(),
            AUTH_STORAGE_KEY,
            &PersistedAuth {
                user: Some(user("u9", UserRole::Admin)),
                token: Some("persisted".to_string()),
                is_authenticated: true,
            },
        )
        .unwrap();

        let session = AuthSession::new(MockAuthApi::new(), storage as Arc<dyn SnapshotStore>);

        let state = session.snapshot();
        assert!(state.is_authenticated);
        assert!(state.is_admin());
        assert!(!state.is_loading);
        assert_eq!(state.error, None);
        assert_eq!(session.bearer_token().as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn test_setters_keep_invariant() {
        let (_, session) = signed_in(MockAuthApi::new()).await;

        session.set_token(None);
        assert!(!session.is_authenticated());

        session.set_token(Some("manual".to_string()));
        assert!(session.is_authenticated());

        session.set_user(None);
        assert!(!session.is_authenticated());

        session.set_loading(true);
        assert!(session.snapshot().is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_runs_on_interval() {
        let api = MockAuthApi::new();
        let (_, session) = signed_in(api.clone()).await;
        let session = Arc::new(session);
        api.push_refresh(Ok(crate::features::auth::models::RefreshResponse {
            access_token: "token-2".to_string(),
        }));

        let cancel = CancellationToken::new();
        let period = Duration::from_secs(25 * 60);
        let handle = session.spawn_refresh_loop(period, cancel.clone());

        tokio::time::sleep(period - Duration::from_secs(1)).await;
        assert!(api.refresh_tokens().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(api.refresh_tokens(), vec!["token-1".to_string()]);
        assert_eq!(session.token().as_deref(), Some("token-2"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_interval_starts_at_login() {
        let api = MockAuthApi::new();
        let (_, session) = session_with(api.clone());
        let session = Arc::new(session);
        api.push_login(Ok(auth_response("token-1")));
        api.push_refresh(Ok(crate::features::auth::models::RefreshResponse {
            access_token: "token-2".to_string(),
        }));

        let cancel = CancellationToken::new();
        let period = Duration::from_secs(25 * 60);
        let handle = session.spawn_refresh_loop(period, cancel.clone());

        tokio::time::sleep(Duration::from_secs(24 * 60)).await;
        session.login("taro@example.com", "secret").await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(api.refresh_tokens().is_empty());
        assert_eq!(session.token().as_deref(), Some("token-1"));

        tokio::time::sleep(period - Duration::from_secs(60)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(api.refresh_tokens(), vec!["token-1".to_string()]);
        assert_eq!(session.token().as_deref(), Some("token-2"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_interval_restarts_after_token_change() {
        let api = MockAuthApi::new();
        let (_, session) = signed_in(api.clone()).await;
        let session = Arc::new(session);

        let cancel = CancellationToken::new();
        let period = Duration::from_secs(25 * 60);
        let handle = session.spawn_refresh_loop(period, cancel.clone());

        tokio::time::sleep(Duration::from_secs(20 * 60)).await;
        session.set_token(Some("rotated".to_string()));

        // 当初の起点から25分を過ぎても、更新から25分経つまでは呼ばれない
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert!(api.refresh_tokens().is_empty());

        api.push_refresh(Ok(crate::features::auth::models::RefreshResponse {
            access_token: "token-3".to_string(),
        }));
        tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(api.refresh_tokens(), vec!["rotated".to_string()]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_skips_when_signed_out() {
        let api = MockAuthApi::new();
        let (_, session) = session_with(api.clone());
        let session = Arc::new(session);

        let cancel = CancellationToken::new();
        let handle = session.spawn_refresh_loop(Duration::from_secs(60), cancel.clone());

        tokio::time::sleep(Duration::from_secs(181)).await;
        assert!(api.refresh_tokens().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
