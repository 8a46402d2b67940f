//! テスト用のフィクスチャと、応答を事前に積んでおけるAPIのフェイク実装

use crate::features::auth::api::AuthApi;
use crate::features::auth::models::{
    AuthResponse, LoginRequest, RefreshResponse, RegisterRequest, User, UserRole,
};
use crate::features::expenses::api::ExpenseApi;
use crate::features::expenses::models::{
    BulkDeleteRequest, BulkStatusRequest, Expense, ExpensePage, ExpensePatch, ExpenseQuery,
    ExpenseStatus, NewExpense, Pagination, StatusUpdateRequest,
};
use crate::shared::errors::{AppError, AppResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

pub fn user(id: &str, role: UserRole) -> User {
    User {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        first_name: "taro".to_string(),
        last_name: "yamada".to_string(),
        role,
        department: None,
        is_active: true,
        created_at: "2024-01-01T00:00:00Z".to_string(),
        updated_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

pub fn expense(id: &str, amount: f64, category: &str, status: ExpenseStatus) -> Expense {
    Expense {
        id: id.to_string(),
        user_id: "u1".to_string(),
        title: format!("経費 {id}"),
        description: None,
        amount,
        currency: "JPY".to_string(),
        category: category.to_string(),
        subcategory: None,
        date: "2024-01-15".to_string(),
        receipt_url: None,
        status,
        submitted_at: None,
        approved_at: None,
        rejected_at: None,
        paid_at: None,
        approved_by: None,
        rejected_by: None,
        rejection_reason: None,
        tags: None,
        created_at: "2024-01-15T10:00:00Z".to_string(),
        updated_at: "2024-01-15T10:00:00Z".to_string(),
    }
}

pub fn new_expense(amount: f64, category: &str) -> NewExpense {
    NewExpense {
        user_id: "u1".to_string(),
        title: "文房具".to_string(),
        description: None,
        amount,
        currency: "JPY".to_string(),
        category: category.to_string(),
        subcategory: None,
        date: "2024-01-15".to_string(),
        receipt_url: None,
        status: ExpenseStatus::Draft,
        tags: Some(vec!["office".to_string()]),
    }
}

/// 1ページに全件が収まる一覧レスポンス
pub fn page(expenses: Vec<Expense>, page: u32) -> ExpensePage {
    let total = expenses.len() as u64;
    ExpensePage {
        expenses,
        pagination: Pagination {
            page,
            limit: 10,
            total,
            total_pages: u32::from(total > 0),
        },
    }
}

fn unscripted<T>(operation: &str) -> AppResult<T> {
    Err(AppError::network(format!("応答が設定されていません: {operation}")))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ===== 認証API =====

#[derive(Default)]
struct AuthScript {
    login: VecDeque<AppResult<AuthResponse>>,
    register: VecDeque<AppResult<AuthResponse>>,
    refresh: VecDeque<AppResult<RefreshResponse>>,
    login_requests: Vec<LoginRequest>,
    register_requests: Vec<RegisterRequest>,
    refresh_tokens: Vec<String>,
}

/// 認証APIのフェイク
#[derive(Clone, Default)]
pub struct MockAuthApi {
    script: Arc<Mutex<AuthScript>>,
}

impl MockAuthApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_login(&self, result: AppResult<AuthResponse>) {
        lock(&self.script).login.push_back(result);
    }

    pub fn push_register(&self, result: AppResult<AuthResponse>) {
        lock(&self.script).register.push_back(result);
    }

    pub fn push_refresh(&self, result: AppResult<RefreshResponse>) {
        lock(&self.script).refresh.push_back(result);
    }

    pub fn login_requests(&self) -> Vec<LoginRequest> {
        lock(&self.script).login_requests.clone()
    }

    pub fn register_requests(&self) -> Vec<RegisterRequest> {
        lock(&self.script).register_requests.clone()
    }

    pub fn refresh_tokens(&self) -> Vec<String> {
        lock(&self.script).refresh_tokens.clone()
    }
}

impl AuthApi for MockAuthApi {
    fn login<'a>(&'a self, request: &'a LoginRequest) -> BoxFuture<'a, AppResult<AuthResponse>> {
        let result = {
            let mut script = lock(&self.script);
            script.login_requests.push(request.clone());
            script.login.pop_front()
        };
        async move { result.unwrap_or_else(|| unscripted("login")) }.boxed()
    }

    fn register<'a>(
        &'a self,
        request: &'a RegisterRequest,
    ) -> BoxFuture<'a, AppResult<AuthResponse>> {
        let result = {
            let mut script = lock(&self.script);
            script.register_requests.push(request.clone());
            script.register.pop_front()
        };
        async move { result.unwrap_or_else(|| unscripted("register")) }.boxed()
    }

    fn refresh<'a>(&'a self, token: &'a str) -> BoxFuture<'a, AppResult<RefreshResponse>> {
        let result = {
            let mut script = lock(&self.script);
            script.refresh_tokens.push(token.to_string());
            script.refresh.pop_front()
        };
        async move { result.unwrap_or_else(|| unscripted("refresh")) }.boxed()
    }
}

// ===== 経費API =====

/// 経費APIに対して行われた呼び出し
#[derive(Debug, Clone, PartialEq)]
pub enum ExpenseCall {
    List(ExpenseQuery),
    Get(String),
    Create(NewExpense),
    Update(String, ExpensePatch),
    Delete(String),
    BulkDelete(Vec<String>),
    UpdateStatus(String, StatusUpdateRequest),
    BulkStatus(BulkStatusRequest),
}

enum ListReply {
    Ready(AppResult<ExpensePage>),
    Gated(oneshot::Receiver<AppResult<ExpensePage>>),
}

#[derive(Default)]
struct ExpenseScript {
    list: VecDeque<ListReply>,
    get: VecDeque<AppResult<Expense>>,
    create: VecDeque<AppResult<Expense>>,
    update: VecDeque<AppResult<Expense>>,
    delete: VecDeque<AppResult<()>>,
    bulk_delete: VecDeque<AppResult<()>>,
    update_status: VecDeque<AppResult<Expense>>,
    bulk_status: VecDeque<AppResult<Vec<Expense>>>,
    calls: Vec<ExpenseCall>,
}

/// 経費APIのフェイク
///
/// 一覧取得は応答が積まれていなければ、要求されたページの空ページを返す
#[derive(Clone, Default)]
pub struct MockExpenseApi {
    script: Arc<Mutex<ExpenseScript>>,
}

impl MockExpenseApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_list(&self, result: AppResult<ExpensePage>) {
        lock(&self.script).list.push_back(ListReply::Ready(result));
    }

    /// 送信側から応答を返すまで完了しない一覧取得を積む
    pub fn gate_list(&self) -> oneshot::Sender<AppResult<ExpensePage>> {
        let (tx, rx) = oneshot::channel();
        lock(&self.script).list.push_back(ListReply::Gated(rx));
        tx
    }

    pub fn push_get(&self, result: AppResult<Expense>) {
        lock(&self.script).get.push_back(result);
    }

    pub fn push_create(&self, result: AppResult<Expense>) {
        lock(&self.script).create.push_back(result);
    }

    pub fn push_update(&self, result: AppResult<Expense>) {
        lock(&self.script).update.push_back(result);
    }

    pub fn push_delete(&self, result: AppResult<()>) {
        lock(&self.script).delete.push_back(result);
    }

    pub fn push_bulk_delete(&self, result: AppResult<()>) {
        lock(&self.script).bulk_delete.push_back(result);
    }

    pub fn push_update_status(&self, result: AppResult<Expense>) {
        lock(&self.script).update_status.push_back(result);
    }

    pub fn push_bulk_status(&self, result: AppResult<Vec<Expense>>) {
        lock(&self.script).bulk_status.push_back(result);
    }

    pub fn calls(&self) -> Vec<ExpenseCall> {
        lock(&self.script).calls.clone()
    }

    pub fn list_queries(&self) -> Vec<ExpenseQuery> {
        lock(&self.script)
            .calls
            .iter()
            .filter_map(|call| match call {
                ExpenseCall::List(query) => Some(query.clone()),
                _ => None,
            })
            .collect()
    }

    fn record<T>(
        &self,
        call: ExpenseCall,
        queue: impl FnOnce(&mut ExpenseScript) -> &mut VecDeque<AppResult<T>>,
    ) -> Option<AppResult<T>> {
        let mut script = lock(&self.script);
        script.calls.push(call);
        queue(&mut *script).pop_front()
    }
}

impl ExpenseApi for MockExpenseApi {
    fn list<'a>(&'a self, query: &'a ExpenseQuery) -> BoxFuture<'a, AppResult<ExpensePage>> {
        let reply = {
            let mut script = lock(&self.script);
            script.calls.push(ExpenseCall::List(query.clone()));
            script.list.pop_front()
        };

        async move {
            match reply {
                Some(ListReply::Ready(result)) => result,
                Some(ListReply::Gated(rx)) => rx
                    .await
                    .unwrap_or_else(|_| unscripted("list (gate dropped)")),
                None => Ok(ExpensePage {
                    expenses: Vec::new(),
                    pagination: Pagination {
                        page: query.page,
                        limit: query.limit,
                        total: 0,
                        total_pages: 0,
                    },
                }),
            }
        }
        .boxed()
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, AppResult<Expense>> {
        let result = self.record(ExpenseCall::Get(id.to_string()), |s| &mut s.get);
        async move { result.unwrap_or_else(|| unscripted("get")) }.boxed()
    }

    fn create<'a>(&'a self, expense: &'a NewExpense) -> BoxFuture<'a, AppResult<Expense>> {
        let result = self.record(ExpenseCall::Create(expense.clone()), |s| &mut s.create);
        async move { result.unwrap_or_else(|| unscripted("create")) }.boxed()
    }

    fn update<'a>(
        &'a self,
        id: &'a str,
        patch: &'a ExpensePatch,
    ) -> BoxFuture<'a, AppResult<Expense>> {
        let result = self.record(
            ExpenseCall::Update(id.to_string(), patch.clone()),
            |s| &mut s.update,
        );
        async move { result.unwrap_or_else(|| unscripted("update")) }.boxed()
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, AppResult<()>> {
        let result = self.record(ExpenseCall::Delete(id.to_string()), |s| &mut s.delete);
        async move { result.unwrap_or_else(|| unscripted("delete")) }.boxed()
    }

    fn bulk_delete<'a>(&'a self, request: &'a BulkDeleteRequest) -> BoxFuture<'a, AppResult<()>> {
        let result = self.record(ExpenseCall::BulkDelete(request.ids.clone()), |s| {
            &mut s.bulk_delete
        });
        async move { result.unwrap_or_else(|| unscripted("bulk_delete")) }.boxed()
    }

    fn update_status<'a>(
        &'a self,
        id: &'a str,
        request: &'a StatusUpdateRequest,
    ) -> BoxFuture<'a, AppResult<Expense>> {
        let result = self.record(
            ExpenseCall::UpdateStatus(id.to_string(), request.clone()),
            |s| &mut s.update_status,
        );
        async move { result.unwrap_or_else(|| unscripted("update_status")) }.boxed()
    }

    fn bulk_update_status<'a>(
        &'a self,
        request: &'a BulkStatusRequest,
    ) -> BoxFuture<'a, AppResult<Vec<Expense>>> {
        let result = self.record(ExpenseCall::BulkStatus(request.clone()), |s| {
            &mut s.bulk_status
        });
        async move { result.unwrap_or_else(|| unscripted("bulk_update_status")) }.boxed()
    }
}

// ===== ローカルHTTPサーバー =====

/// ローカルサーバーが受け取ったHTTPリクエスト
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// パスとクエリ文字列
    pub target: String,
    /// ヘッダー名は小文字化済み
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|position| position + 4)
}

/// 1件だけリクエストを受け付けて固定のJSONレスポンスを返すサーバーを起動する
///
/// # 戻り値
/// APIのベースURL（`/api/v1`付き）と、受信したリクエストを返すタスク
pub async fn serve_once(
    status: u16,
    response_body: &str,
) -> (String, tokio::task::JoinHandle<RecordedRequest>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response_body = response_body.to_string();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];

        let head_end = loop {
            let read = stream.read(&mut chunk).await.unwrap();
            assert!(read > 0, "ヘッダー受信前に接続が閉じられました");
            buffer.extend_from_slice(&chunk[..read]);
            if let Some(end) = find_header_end(&buffer) {
                break end;
            }
        };

        let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap_or_default().split(' ');
        let method = request_line.next().unwrap_or_default().to_string();
        let target = request_line.next().unwrap_or_default().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        while buffer.len() < head_end + content_length {
            let read = stream.read(&mut chunk).await.unwrap();
            assert!(read > 0, "ボディ受信前に接続が閉じられました");
            buffer.extend_from_slice(&chunk[..read]);
        }
        let body =
            String::from_utf8_lossy(&buffer[head_end..head_end + content_length]).to_string();

        let response = format!(
            "HTTP/1.1 {status} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{response_body}",
            if status < 400 { "OK" } else { "Error" },
            response_body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();

        RecordedRequest {
            method,
            target,
            headers,
            body,
        }
    });

    (format!("http://{addr}/api/v1"), handle)
}

/// ローカルサーバー向けのAPIクライアント
pub fn local_client(base_url: &str) -> Arc<crate::shared::api_client::ApiClient> {
    let config = crate::shared::config::ApiConfig {
        base_url: base_url.to_string(),
        timeout_seconds: 5,
    };
    Arc::new(crate::shared::api_client::ApiClient::new(&config).unwrap())
}
