/// 認証APIとの通信境界
///
/// ストアはこのトレイト越しにのみ外部認証サーバーへアクセスする
use crate::features::auth::models::{
    AuthResponse, LoginRequest, RefreshResponse, RegisterRequest,
};
use crate::shared::api_client::ApiClient;
use crate::shared::errors::AppResult;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

/// 認証エンドポイント
pub trait AuthApi: Send + Sync {
    /// POST auth/login
    fn login<'a>(&'a self, request: &'a LoginRequest) -> BoxFuture<'a, AppResult<AuthResponse>>;

    /// POST auth/register
    fn register<'a>(
        &'a self,
        request: &'a RegisterRequest,
    ) -> BoxFuture<'a, AppResult<AuthResponse>>;

    /// POST auth/refresh（現在のトークンをBearerヘッダーで送る）
    fn refresh<'a>(&'a self, token: &'a str) -> BoxFuture<'a, AppResult<RefreshResponse>>;
}

/// HTTP経由の認証API
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: Arc<ApiClient>,
}

impl HttpAuthApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

impl AuthApi for HttpAuthApi {
    fn login<'a>(&'a self, request: &'a LoginRequest) -> BoxFuture<'a, AppResult<AuthResponse>> {
        async move { self.client.post("/auth/login", request, None).await }.boxed()
    }

    fn register<'a>(
        &'a self,
        request: &'a RegisterRequest,
    ) -> BoxFuture<'a, AppResult<AuthResponse>> {
        async move { self.client.post("/auth/register", request, None).await }.boxed()
    }

    fn refresh<'a>(&'a self, token: &'a str) -> BoxFuture<'a, AppResult<RefreshResponse>> {
        async move { self.client.post_empty("/auth/refresh", Some(token)).await }.boxed()
    }
}
