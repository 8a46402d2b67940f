use serde::{Deserialize, Serialize};

/// 経費ステータス
///
/// `draft → submitted → {approved, rejected}`、`approved → paid` の順にのみ進む。
/// 遷移の可否はサーバーが判断し、クライアントはレスポンスを信頼する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Paid,
}

impl ExpenseStatus {
    /// クエリパラメータ・表示用の文字列
    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseStatus::Draft => "draft",
            ExpenseStatus::Submitted => "submitted",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Rejected => "rejected",
            ExpenseStatus::Paid => "paid",
        }
    }
}

impl std::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 経費データモデル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    pub status: ExpenseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
}

/// 経費作成用DTO（ID・タイムスタンプを除いた経費）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub user_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    pub status: ExpenseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// 経費更新用DTO（指定したフィールドのみ送信する）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpensePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// ステータス更新リクエスト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ExpenseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// 一括ステータス更新リクエスト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkStatusRequest {
    pub ids: Vec<String>,
    pub status: ExpenseStatus,
}

/// 一括削除リクエスト
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<String>,
}

/// 経費一覧の絞り込み条件
///
/// 絞り込みはサーバー側で行う。クライアントは最後に要求した条件を保持する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Vec<ExpenseStatus>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl ExpenseFilters {
    /// 指定されたフィールドだけを上書きする
    pub fn merge(&mut self, patch: ExpenseFilters) {
        let ExpenseFilters {
            status,
            category,
            date_from,
            date_to,
            amount_min,
            amount_max,
            search,
        } = patch;

        if status.is_some() {
            self.status = status;
        }
        if category.is_some() {
            self.category = category;
        }
        if date_from.is_some() {
            self.date_from = date_from;
        }
        if date_to.is_some() {
            self.date_to = date_to;
        }
        if amount_min.is_some() {
            self.amount_min = amount_min;
        }
        if amount_max.is_some() {
            self.amount_max = amount_max;
        }
        if search.is_some() {
            self.search = search;
        }
    }

    /// クエリパラメータに変換する
    ///
    /// 配列は同じキーを繰り返し、空文字列は送らない
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &str, value: String| {
            if !value.is_empty() {
                pairs.push((key.to_string(), value));
            }
        };

        for status in self.status.iter().flatten() {
            push("status", status.as_str().to_string());
        }
        for category in self.category.iter().flatten() {
            push("category", category.clone());
        }
        if let Some(date_from) = &self.date_from {
            push("dateFrom", date_from.clone());
        }
        if let Some(date_to) = &self.date_to {
            push("dateTo", date_to.clone());
        }
        if let Some(amount_min) = self.amount_min {
            push("amountMin", amount_min.to_string());
        }
        if let Some(amount_max) = self.amount_max {
            push("amountMax", amount_max.to_string());
        }
        if let Some(search) = &self.search {
            push("search", search.clone());
        }

        pairs
    }
}

/// ページネーション情報（サーバーの値をそのまま保持する）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            total: 0,
            total_pages: 0,
        }
    }
}

/// 経費一覧レスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpensePage {
    pub expenses: Vec<Expense>,
    pub pagination: Pagination,
}

/// 経費一覧の取得条件
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseQuery {
    pub filters: ExpenseFilters,
    pub page: u32,
    pub limit: u32,
}

impl ExpenseQuery {
    /// 絞り込み条件の後にpage・limitを付けたクエリパラメータ
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = self.filters.to_query_pairs();
        pairs.push(("page".to_string(), self.page.to_string()));
        pairs.push(("limit".to_string(), self.limit.to_string()));
        pairs
    }
}
