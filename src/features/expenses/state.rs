/// 経費ストアの状態と、サーバー結果を状態に反映する純粋関数群
///
/// 通信と切り離してあるため、ここだけで状態遷移を検証できる。
use crate::features::expenses::models::{
    Expense, ExpenseFilters, ExpensePage, ExpenseQuery, ExpenseStatus, Pagination,
};
use crate::features::expenses::selection::SelectionSet;
use crate::shared::errors::AppError;
use std::collections::BTreeMap;

/// 経費一覧取得の世代番号
pub type FetchGeneration = u64;

/// 経費ストアの状態
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseState {
    pub expenses: Vec<Expense>,
    pub current_expense: Option<Expense>,
    pub filters: ExpenseFilters,
    pub pagination: Pagination,
    pub is_loading: bool,
    pub error: Option<String>,
    pub selection: SelectionSet,
    fetch_generation: FetchGeneration,
}

impl ExpenseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最新の一覧取得リクエストの世代
    pub fn fetch_generation(&self) -> FetchGeneration {
        self.fetch_generation
    }

    /// リクエスト開始（ローディング中にしてエラーを消す）
    pub fn begin(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    /// 一覧取得を開始し、そのリクエストの世代とクエリを返す
    ///
    /// `filters`と`page`を指定した場合はそれを現在の条件として保存する
    pub fn begin_fetch(
        &mut self,
        filters: Option<ExpenseFilters>,
        page: Option<u32>,
    ) -> (FetchGeneration, ExpenseQuery) {
        if let Some(filters) = filters {
            self.filters = filters;
        }
        if let Some(page) = page {
            self.pagination.page = page;
        }

        self.fetch_generation += 1;
        self.begin();

        let query = ExpenseQuery {
            filters: self.filters.clone(),
            page: self.pagination.page,
            limit: self.pagination.limit,
        };
        (self.fetch_generation, query)
    }

    /// 失敗を記録する（一覧などのデータはそのまま残す）
    pub fn fail(&mut self, error: &AppError, fallback: &str) {
        self.is_loading = false;
        self.error = Some(error.surface_message(fallback));
    }

    /// 一覧取得の結果を反映する
    ///
    /// 新しい一覧取得が開始済みの場合は何もせずfalseを返す。
    /// 成功時は一覧とページネーションを全置換し、消えたIDを選択から外す。
    pub fn apply_fetch(
        &mut self,
        generation: FetchGeneration,
        result: Result<ExpensePage, (AppError, &str)>,
    ) -> bool {
        if generation != self.fetch_generation {
            return false;
        }

        match result {
            Ok(page) => {
                self.expenses = page.expenses;
                self.pagination = page.pagination;
                self.selection.retain_loaded(&self.expenses);
                self.is_loading = false;
                self.error = None;
            }
            Err((error, fallback)) => self.fail(&error, fallback),
        }
        true
    }

    /// 単一経費の取得結果を反映する
    pub fn apply_current(&mut self, expense: Expense) {
        self.current_expense = Some(expense);
        self.is_loading = false;
    }

    /// 作成された経費を一覧の先頭に追加する
    pub fn apply_created(&mut self, expense: Expense) {
        self.expenses.insert(0, expense);
        self.is_loading = false;
    }

    /// 更新された経費を同じ位置で置き換える
    ///
    /// `current_expense`が同じIDなら、そちらも置き換える
    pub fn apply_updated(&mut self, expense: Expense) {
        self.replace_in_place(&expense);
        if self
            .current_expense
            .as_ref()
            .is_some_and(|current| current.id == expense.id)
        {
            self.current_expense = Some(expense);
        }
        self.is_loading = false;
    }

    /// 削除された経費を一覧・現在の経費・選択から取り除く
    pub fn apply_deleted(&mut self, id: &str) {
        self.expenses.retain(|expense| expense.id != id);
        if self
            .current_expense
            .as_ref()
            .is_some_and(|current| current.id == id)
        {
            self.current_expense = None;
        }
        self.selection.deselect(id);
        self.is_loading = false;
    }

    /// 一括削除を反映する（選択は常に空になる）
    pub fn apply_bulk_deleted(&mut self, ids: &[String]) {
        self.expenses.retain(|expense| !ids.contains(&expense.id));
        if self
            .current_expense
            .as_ref()
            .is_some_and(|current| ids.contains(&current.id))
        {
            self.current_expense = None;
        }
        self.selection.clear();
        self.is_loading = false;
    }

    /// 一括ステータス更新を反映する（選択は常に空になる）
    ///
    /// 一覧にない経費は追加しない
    pub fn apply_bulk_updated(&mut self, updated: Vec<Expense>) {
        for expense in &updated {
            self.replace_in_place(expense);
        }
        if let Some(current) = &self.current_expense {
            if let Some(fresh) = updated.iter().find(|expense| expense.id == current.id) {
                self.current_expense = Some(fresh.clone());
            }
        }
        self.selection.clear();
        self.is_loading = false;
    }

    fn replace_in_place(&mut self, expense: &Expense) {
        if let Some(slot) = self.expenses.iter_mut().find(|e| e.id == expense.id) {
            *slot = expense.clone();
        }
    }

    pub fn get_expense_by_id(&self, id: &str) -> Option<&Expense> {
        self.expenses.iter().find(|expense| expense.id == id)
    }

    pub fn get_expenses_by_status(&self, status: ExpenseStatus) -> Vec<&Expense> {
        self.expenses
            .iter()
            .filter(|expense| expense.status == status)
            .collect()
    }

    /// 読み込み済み経費の金額合計
    pub fn total_amount(&self) -> f64 {
        self.expenses.iter().map(|expense| expense.amount).sum()
    }

    /// 読み込み済み経費のカテゴリ別金額合計
    pub fn amount_by_category(&self) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for expense in &self.expenses {
            *totals.entry(expense.category.clone()).or_insert(0.0) += expense.amount;
        }
        totals
    }
}
