/// 認証機能のモジュール
///
/// - ユーザー・認証状態のモデルと派生値（役割フラグ・フルネーム・イニシャル・権限）
/// - 外部認証サーバーとの通信境界（`AuthApi`）
/// - 認証セッションストア（ログイン・登録・ログアウト・サイレントリフレッシュ・永続化）
pub mod api;
pub mod models;
pub mod session;

pub use api::{AuthApi, HttpAuthApi};
pub use models::{
    AuthResponse, AuthState, LoginRequest, PersistedAuth, Permissions, RefreshResponse,
    RegisterRequest, User, UserRole,
};
pub use session::{AuthSession, TokenSource, AUTH_STORAGE_KEY};
