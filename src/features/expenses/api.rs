/// 経費APIとの通信境界
use crate::features::auth::session::TokenSource;
use crate::features::expenses::models::{
    BulkDeleteRequest, BulkStatusRequest, Expense, ExpensePage, ExpensePatch, ExpenseQuery,
    NewExpense, StatusUpdateRequest,
};
use crate::shared::api_client::ApiClient;
use crate::shared::errors::AppResult;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

/// 経費エンドポイント
pub trait ExpenseApi: Send + Sync {
    /// GET expenses
    fn list<'a>(&'a self, query: &'a ExpenseQuery) -> BoxFuture<'a, AppResult<ExpensePage>>;

    /// GET expenses/{id}
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, AppResult<Expense>>;

    /// POST expenses
    fn create<'a>(&'a self, expense: &'a NewExpense) -> BoxFuture<'a, AppResult<Expense>>;

    /// PUT expenses/{id}
    fn update<'a>(
        &'a self,
        id: &'a str,
        patch: &'a ExpensePatch,
    ) -> BoxFuture<'a, AppResult<Expense>>;

    /// DELETE expenses/{id}
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, AppResult<()>>;

    /// DELETE expenses/bulk-delete
    fn bulk_delete<'a>(&'a self, request: &'a BulkDeleteRequest) -> BoxFuture<'a, AppResult<()>>;

    /// PATCH expenses/{id}/status
    fn update_status<'a>(
        &'a self,
        id: &'a str,
        request: &'a StatusUpdateRequest,
    ) -> BoxFuture<'a, AppResult<Expense>>;

    /// PATCH expenses/bulk-status
    fn bulk_update_status<'a>(
        &'a self,
        request: &'a BulkStatusRequest,
    ) -> BoxFuture<'a, AppResult<Vec<Expense>>>;
}

/// HTTP経由の経費API
///
/// リクエストごとに`TokenSource`から現在のトークンを取得して付与する
#[derive(Clone)]
pub struct HttpExpenseApi {
    client: Arc<ApiClient>,
    tokens: Arc<dyn TokenSource>,
}

impl HttpExpenseApi {
    pub fn new(client: Arc<ApiClient>, tokens: Arc<dyn TokenSource>) -> Self {
        Self { client, tokens }
    }

    fn expense_path(id: &str) -> String {
        format!("/expenses/{}", urlencoding::encode(id))
    }
}

impl std::fmt::Debug for HttpExpenseApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExpenseApi")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl ExpenseApi for HttpExpenseApi {
    fn list<'a>(&'a self, query: &'a ExpenseQuery) -> BoxFuture<'a, AppResult<ExpensePage>> {
        async move {
            let token = self.tokens.bearer_token();
            self.client
                .get("/expenses", &query.to_query_pairs(), token.as_deref())
                .await
        }
        .boxed()
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, AppResult<Expense>> {
        async move {
            let token = self.tokens.bearer_token();
            self.client
                .get(&Self::expense_path(id), &[], token.as_deref())
                .await
        }
        .boxed()
    }

    fn create<'a>(&'a self, expense: &'a NewExpense) -> BoxFuture<'a, AppResult<Expense>> {
        async move {
            let token = self.tokens.bearer_token();
            self.client
                .post("/expenses", expense, token.as_deref())
                .await
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        id: &'a str,
        patch: &'a ExpensePatch,
    ) -> BoxFuture<'a, AppResult<Expense>> {
        async move {
            let token = self.tokens.bearer_token();
            self.client
                .put(&Self::expense_path(id), patch, token.as_deref())
                .await
        }
        .boxed()
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, AppResult<()>> {
        async move {
            let token = self.tokens.bearer_token();
            self.client
                .delete(&Self::expense_path(id), token.as_deref())
                .await
        }
        .boxed()
    }

    fn bulk_delete<'a>(&'a self, request: &'a BulkDeleteRequest) -> BoxFuture<'a, AppResult<()>> {
        async move {
            let token = self.tokens.bearer_token();
            self.client
                .delete_with_body("/expenses/bulk-delete", request, token.as_deref())
                .await
        }
        .boxed()
    }

    fn update_status<'a>(
        &'a self,
        id: &'a str,
        request: &'a StatusUpdateRequest,
    ) -> BoxFuture<'a, AppResult<Expense>> {
        async move {
            let token = self.tokens.bearer_token();
            let endpoint = format!("{}/status", Self::expense_path(id));
            self.client.patch(&endpoint, request, token.as_deref()).await
        }
        .boxed()
    }

    fn bulk_update_status<'a>(
        &'a self,
        request: &'a BulkStatusRequest,
    ) -> BoxFuture<'a, AppResult<Vec<Expense>>> {
        async move {
            let token = self.tokens.bearer_token();
            self.client
                .patch("/expenses/bulk-status", request, token.as_deref())
                .await
        }
        .boxed()
    }
}
