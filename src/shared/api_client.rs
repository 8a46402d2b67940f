use crate::shared::config::ApiConfig;
/// 汎用APIクライアント
///
/// APIサーバーとのJSON通信を行う汎用的なクライアント
/// 認証・経費の各エンドポイントで使用する。自動リトライは行わない。
use crate::shared::errors::{AppError, AppResult};
use log::{debug, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// APIサーバーからのエラーレスポンス
///
/// `detail`は文字列以外（バリデーションエラーの配列など）の場合もある
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// 2xx以外のレスポンスボディからエラーを組み立てる
///
/// # 引数
/// * `status` - HTTPステータスコード
/// * `body` - レスポンスボディ
///
/// # 戻り値
/// 文字列の`detail`が取れた場合のみ`detail`付きの`AppError::Api`
pub fn parse_error_body(status: u16, body: &str) -> AppError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.detail)
        .and_then(|detail| match detail {
            serde_json::Value::String(message) if !message.is_empty() => Some(message),
            _ => None,
        });

    if detail.is_none() {
        warn!("APIサーバーから非構造化エラーレスポンス: status={status}, body={body}");
    }

    AppError::Api { status, detail }
}

/// 汎用APIクライアント
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// 設定を指定してAPIクライアントを作成
    pub fn new(config: &ApiConfig) -> AppResult<Self> {
        config.validate()?;
        url::Url::parse(&config.base_url).map_err(|e| {
            AppError::configuration(format!("APIサーバーのURLが不正です: {e}"))
        })?;

        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_seconds));
        if config.is_localhost() {
            // ローカルのAPIサーバーへはプロキシを経由しない
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| AppError::configuration(format!("HTTPクライアント初期化失敗: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// エンドポイントの完全なURLを組み立てる
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    /// 認証ヘッダーとContent-Typeを付与する
    fn with_headers(request: RequestBuilder, auth_token: Option<&str>) -> RequestBuilder {
        let request = request.header(CONTENT_TYPE, "application/json");
        match auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GETリクエストを送信
    pub async fn get<T>(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        auth_token: Option<&str>,
    ) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        debug!("GETリクエスト送信: endpoint={endpoint}, query={query:?}");

        let request = Self::with_headers(self.client.get(self.url(endpoint)), auth_token)
            .query(query);
        self.send_json(request, "GET", endpoint).await
    }

    /// POSTリクエストを送信
    pub async fn post<B, T>(&self, endpoint: &str, body: &B, auth_token: Option<&str>) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POSTリクエスト送信: endpoint={endpoint}");

        let request =
            Self::with_headers(self.client.post(self.url(endpoint)), auth_token).json(body);
        self.send_json(request, "POST", endpoint).await
    }

    /// ボディなしのPOSTリクエストを送信
    pub async fn post_empty<T>(&self, endpoint: &str, auth_token: Option<&str>) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        debug!("POSTリクエスト送信（ボディなし）: endpoint={endpoint}");

        let request = Self::with_headers(self.client.post(self.url(endpoint)), auth_token);
        self.send_json(request, "POST", endpoint).await
    }

    /// PUTリクエストを送信
    pub async fn put<B, T>(&self, endpoint: &str, body: &B, auth_token: Option<&str>) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("PUTリクエスト送信: endpoint={endpoint}");

        let request =
            Self::with_headers(self.client.put(self.url(endpoint)), auth_token).json(body);
        self.send_json(request, "PUT", endpoint).await
    }

    /// PATCHリクエストを送信
    pub async fn patch<B, T>(
        &self,
        endpoint: &str,
        body: &B,
        auth_token: Option<&str>,
    ) -> AppResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("PATCHリクエスト送信: endpoint={endpoint}");

        let request =
            Self::with_headers(self.client.patch(self.url(endpoint)), auth_token).json(body);
        self.send_json(request, "PATCH", endpoint).await
    }

    /// DELETEリクエストを送信
    ///
    /// 成功時のレスポンスボディは読まない
    pub async fn delete(&self, endpoint: &str, auth_token: Option<&str>) -> AppResult<()> {
        debug!("DELETEリクエスト送信: endpoint={endpoint}");

        let request = Self::with_headers(self.client.delete(self.url(endpoint)), auth_token);
        self.send_without_body(request, "DELETE", endpoint).await
    }

    /// ボディ付きDELETEリクエストを送信
    pub async fn delete_with_body<B>(
        &self,
        endpoint: &str,
        body: &B,
        auth_token: Option<&str>,
    ) -> AppResult<()>
    where
        B: Serialize + ?Sized,
    {
        debug!("ボディ付きDELETEリクエスト送信: endpoint={endpoint}");

        let request =
            Self::with_headers(self.client.delete(self.url(endpoint)), auth_token).json(body);
        self.send_without_body(request, "DELETE", endpoint).await
    }

    async fn send(&self, request: RequestBuilder, method: &str, endpoint: &str) -> AppResult<Response> {
        let response = request.send().await.map_err(|e| {
            warn!("APIリクエスト失敗: method={method}, endpoint={endpoint}, error={e}");
            AppError::network(format!("APIサーバーへの接続に失敗しました: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "レスポンス読み取り失敗".to_string());
        Err(parse_error_body(status.as_u16(), &body))
    }

    async fn send_json<T>(&self, request: RequestBuilder, method: &str, endpoint: &str) -> AppResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(request, method, endpoint).await?;
        let result = response
            .json::<T>()
            .await
            .map_err(|e| AppError::InvalidResponse(format!("{method} {endpoint}: {e}")))?;

        info!("{method}リクエスト成功: endpoint={endpoint}");
        Ok(result)
    }

    async fn send_without_body(
        &self,
        request: RequestBuilder,
        method: &str,
        endpoint: &str,
    ) -> AppResult<()> {
        self.send(request, method, endpoint).await?;
        info!("{method}リクエスト成功: endpoint={endpoint}");
        Ok(())
    }
}
