/// 経費ストア
///
/// 経費一覧・現在の経費・絞り込み条件・ページネーション・選択状態を保持し、
/// 経費APIを呼び出して結果を状態へ反映する。失敗は`error`に記録され、
/// 呼び出し元へは伝播しない。ロックは通信中に保持しない。
use crate::features::expenses::api::ExpenseApi;
use crate::features::expenses::models::{
    BulkDeleteRequest, BulkStatusRequest, Expense, ExpenseFilters, ExpensePatch, ExpenseStatus,
    NewExpense, StatusUpdateRequest,
};
use crate::features::expenses::state::{ExpenseState, FetchGeneration};
use crate::features::expenses::stats::{ExpenseStats, SelectionSummary};
use crate::shared::errors::AppError;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

const FETCH_LIST_FAILED: &str = "Failed to fetch expenses";
const FETCH_ONE_FAILED: &str = "Failed to fetch expense";
const CREATE_FAILED: &str = "Failed to create expense";
const UPDATE_FAILED: &str = "Failed to update expense";
const DELETE_FAILED: &str = "Failed to delete expense";
const BULK_DELETE_FAILED: &str = "Failed to delete expenses";
const STATUS_FAILED: &str = "Failed to update expense status";
const BULK_STATUS_FAILED: &str = "Failed to update expense statuses";

/// 通信中の操作
///
/// `finish`前にFutureごと破棄された場合はローディング状態を解除する。
/// 一覧取得の場合は、より新しい一覧取得が始まっていなければ解除する。
struct InFlight<'a> {
    state: &'a Mutex<ExpenseState>,
    generation: Option<FetchGeneration>,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn new(state: &'a Mutex<ExpenseState>, generation: Option<FetchGeneration>) -> Self {
        Self {
            state,
            generation,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let superseded = self
            .generation
            .is_some_and(|generation| generation != state.fetch_generation());
        if !superseded {
            state.is_loading = false;
            log::debug!("完了前に破棄された経費操作のローディング状態を解除しました");
        }
    }
}

/// 経費ストア
pub struct ExpenseStore<A> {
    api: A,
    state: Mutex<ExpenseState>,
}

impl<A: ExpenseApi> ExpenseStore<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: Mutex::new(ExpenseState::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExpenseState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// ローディング状態にして、通信中の操作を開始する
    fn begin(&self) -> InFlight<'_> {
        self.lock().begin();
        InFlight::new(&self.state, None)
    }

    fn record_failure(&self, error: &AppError, fallback: &str) {
        log::warn!("経費操作に失敗しました: {fallback}: {error}");
        self.lock().fail(error, fallback);
    }

    /// 現在の状態のコピー
    pub fn snapshot(&self) -> ExpenseState {
        self.lock().clone()
    }

    pub fn expenses(&self) -> Vec<Expense> {
        self.lock().expenses.clone()
    }

    // ===== 一覧取得・絞り込み・ページ送り =====

    /// 経費一覧を取得し、一覧とページネーションを全置換する
    ///
    /// `filters`・`page`を省略した場合は現在の条件を使う。
    /// より新しい一覧取得が開始されていた場合、このレスポンスは破棄される。
    pub async fn fetch_expenses(&self, filters: Option<ExpenseFilters>, page: Option<u32>) {
        let (generation, query) = self.lock().begin_fetch(filters, page);
        log::debug!(
            "経費一覧を取得します: generation={generation}, page={}, limit={}",
            query.page,
            query.limit
        );

        let pending = InFlight::new(&self.state, Some(generation));
        let result = self.api.list(&query).await;
        pending.finish();

        let succeeded = result.is_ok();
        if let Err(e) = &result {
            log::warn!("経費一覧の取得に失敗しました: {e}");
        }

        let applied = self
            .lock()
            .apply_fetch(generation, result.map_err(|e| (e, FETCH_LIST_FAILED)));
        if !applied {
            log::debug!("古い経費一覧レスポンスを破棄しました: generation={generation}");
        } else if succeeded {
            log::info!("経費一覧を取得しました: page={}", query.page);
        }
    }

    /// 絞り込み条件をマージし、1ページ目から再取得する
    pub async fn set_filters(&self, patch: ExpenseFilters) {
        let filters = {
            let state = self.lock();
            let mut filters = state.filters.clone();
            filters.merge(patch);
            filters
        };
        self.fetch_expenses(Some(filters), Some(1)).await;
    }

    /// 絞り込み条件を全て解除し、1ページ目から再取得する
    pub async fn clear_filters(&self) {
        self.fetch_expenses(Some(ExpenseFilters::default()), Some(1))
            .await;
    }

    pub async fn set_search(&self, query: &str) {
        self.set_filters(ExpenseFilters {
            search: Some(query.to_string()),
            ..ExpenseFilters::default()
        })
        .await;
    }

    /// 現在の絞り込み条件のまま指定ページを取得する
    pub async fn set_page(&self, page: u32) {
        self.fetch_expenses(None, Some(page)).await;
    }

    /// ページサイズを変更し、1ページ目から再取得する
    pub async fn set_limit(&self, limit: u32) {
        self.lock().pagination.limit = limit;
        self.fetch_expenses(None, Some(1)).await;
    }

    /// 現在の絞り込み条件を書き換えて1ページ目から再取得する
    async fn refilter(&self, edit: impl FnOnce(&mut ExpenseFilters)) {
        let filters = {
            let mut filters = self.lock().filters.clone();
            edit(&mut filters);
            filters
        };
        self.fetch_expenses(Some(filters), Some(1)).await;
    }

    pub async fn add_status_filter(&self, status: ExpenseStatus) {
        self.refilter(|filters| {
            let statuses = filters.status.get_or_insert_with(Vec::new);
            if !statuses.contains(&status) {
                statuses.push(status);
            }
        })
        .await;
    }

    pub async fn remove_status_filter(&self, status: ExpenseStatus) {
        self.refilter(|filters| {
            if let Some(statuses) = filters.status.as_mut() {
                statuses.retain(|s| *s != status);
                if statuses.is_empty() {
                    filters.status = None;
                }
            }
        })
        .await;
    }

    pub async fn add_category_filter(&self, category: &str) {
        self.refilter(|filters| {
            let categories = filters.category.get_or_insert_with(Vec::new);
            if !categories.iter().any(|c| c == category) {
                categories.push(category.to_string());
            }
        })
        .await;
    }

    pub async fn remove_category_filter(&self, category: &str) {
        self.refilter(|filters| {
            if let Some(categories) = filters.category.as_mut() {
                categories.retain(|c| c != category);
                if categories.is_empty() {
                    filters.category = None;
                }
            }
        })
        .await;
    }

    /// 日付範囲を置き換える（Noneで解除）
    pub async fn set_date_range(&self, from: Option<String>, to: Option<String>) {
        self.refilter(|filters| {
            filters.date_from = from;
            filters.date_to = to;
        })
        .await;
    }

    /// 金額範囲を置き換える（Noneで解除）
    pub async fn set_amount_range(&self, min: Option<f64>, max: Option<f64>) {
        self.refilter(|filters| {
            filters.amount_min = min;
            filters.amount_max = max;
        })
        .await;
    }

    // ===== 単一経費の操作 =====

    /// 経費を1件取得して`current_expense`に設定する（一覧は変更しない）
    pub async fn fetch_expense_by_id(&self, id: &str) {
        let pending = self.begin();
        let result = self.api.get(id).await;
        pending.finish();

        match result {
            Ok(expense) => {
                log::info!("経費を取得しました: id={id}");
                self.lock().apply_current(expense);
            }
            Err(e) => self.record_failure(&e, FETCH_ONE_FAILED),
        }
    }

    /// 経費を作成し、サーバーが返した経費を一覧の先頭に追加する
    pub async fn create_expense(&self, expense: NewExpense) {
        let pending = self.begin();
        let result = self.api.create(&expense).await;
        pending.finish();

        match result {
            Ok(created) => {
                log::info!("経費を作成しました: id={}", created.id);
                self.lock().apply_created(created);
            }
            Err(e) => self.record_failure(&e, CREATE_FAILED),
        }
    }

    pub async fn update_expense(&self, id: &str, patch: ExpensePatch) {
        let pending = self.begin();
        let result = self.api.update(id, &patch).await;
        pending.finish();

        match result {
            Ok(updated) => {
                log::info!("経費を更新しました: id={id}");
                self.lock().apply_updated(updated);
            }
            Err(e) => self.record_failure(&e, UPDATE_FAILED),
        }
    }

    pub async fn delete_expense(&self, id: &str) {
        let pending = self.begin();
        let result = self.api.delete(id).await;
        pending.finish();

        match result {
            Ok(()) => {
                log::info!("経費を削除しました: id={id}");
                self.lock().apply_deleted(id);
            }
            Err(e) => self.record_failure(&e, DELETE_FAILED),
        }
    }

    /// ステータスを変更する
    ///
    /// サーバーの応答を受け取るまで状態は変更しない
    pub async fn update_expense_status(
        &self,
        id: &str,
        status: ExpenseStatus,
        reason: Option<String>,
    ) {
        let pending = self.begin();
        let request = StatusUpdateRequest { status, reason };
        let result = self.api.update_status(id, &request).await;
        pending.finish();

        match result {
            Ok(updated) => {
                log::info!("経費のステータスを更新しました: id={id}, status={status}");
                self.lock().apply_updated(updated);
            }
            Err(e) => self.record_failure(&e, STATUS_FAILED),
        }
    }

    pub async fn approve_expense(&self, id: &str) {
        self.update_expense_status(id, ExpenseStatus::Approved, None)
            .await;
    }

    /// 却下する（理由が空の場合は送信せずにエラーを記録する）
    pub async fn reject_expense(&self, id: &str, reason: &str) {
        let reason = reason.trim();
        if reason.is_empty() {
            self.record_failure(
                &AppError::validation("Rejection reason is required"),
                STATUS_FAILED,
            );
            return;
        }

        self.update_expense_status(id, ExpenseStatus::Rejected, Some(reason.to_string()))
            .await;
    }

    // ===== 一括操作 =====

    pub async fn delete_expenses(&self, ids: Vec<String>) {
        let pending = self.begin();
        let request = BulkDeleteRequest { ids };
        let result = self.api.bulk_delete(&request).await;
        pending.finish();

        match result {
            Ok(()) => {
                log::info!("経費を一括削除しました: count={}", request.ids.len());
                self.lock().apply_bulk_deleted(&request.ids);
            }
            Err(e) => self.record_failure(&e, BULK_DELETE_FAILED),
        }
    }

    pub async fn bulk_update_status(&self, ids: Vec<String>, status: ExpenseStatus) {
        let pending = self.begin();
        let request = BulkStatusRequest { ids, status };
        let result = self.api.bulk_update_status(&request).await;
        pending.finish();

        match result {
            Ok(updated) => {
                log::info!(
                    "経費のステータスを一括更新しました: count={}, status={status}",
                    updated.len()
                );
                self.lock().apply_bulk_updated(updated);
            }
            Err(e) => self.record_failure(&e, BULK_STATUS_FAILED),
        }
    }

    // ===== 同期的な状態操作 =====

    pub fn set_current_expense(&self, expense: Option<Expense>) {
        self.lock().current_expense = expense;
    }

    pub fn set_loading(&self, loading: bool) {
        self.lock().is_loading = loading;
    }

    pub fn set_error(&self, error: Option<String>) {
        self.lock().error = error;
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn select_expense(&self, id: &str) {
        let mut state = self.lock();
        let ExpenseState {
            expenses,
            selection,
            ..
        } = &mut *state;
        selection.select(id, expenses);
    }

    pub fn deselect_expense(&self, id: &str) {
        self.lock().selection.deselect(id);
    }

    pub fn toggle_expense_selection(&self, id: &str) {
        let mut state = self.lock();
        let ExpenseState {
            expenses,
            selection,
            ..
        } = &mut *state;
        selection.toggle(id, expenses);
    }

    pub fn select_all_expenses(&self) {
        let mut state = self.lock();
        let ExpenseState {
            expenses,
            selection,
            ..
        } = &mut *state;
        selection.select_all(expenses);
    }

    pub fn clear_selection(&self) {
        self.lock().selection.clear();
    }

    // ===== 派生値（読み込み済みページのみが対象） =====

    pub fn selection_summary(&self) -> SelectionSummary {
        let state = self.lock();
        SelectionSummary::compute(&state.selection, &state.expenses)
    }

    pub fn stats(&self) -> ExpenseStats {
        ExpenseStats::from_expenses(&self.lock().expenses)
    }

    pub fn get_expense_by_id(&self, id: &str) -> Option<Expense> {
        self.lock().get_expense_by_id(id).cloned()
    }

    pub fn get_expenses_by_status(&self, status: ExpenseStatus) -> Vec<Expense> {
        self.lock()
            .get_expenses_by_status(status)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn total_amount(&self) -> f64 {
        self.lock().total_amount()
    }

    pub fn amount_by_category(&self) -> BTreeMap<String, f64> {
        self.lock().amount_by_category()
    }
}
