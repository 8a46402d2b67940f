/// UIストア
///
/// テーマ・サイドバー・検索などの画面状態と、通知センター・モーダルスタックを保持する。
/// 通知とモーダルのタイマーは`spawn_timer_driver`で起動したタスクが処理する。
use crate::features::ui::modals::{Modal, ModalSpec, ModalStack, ModalUpdate};
use crate::features::ui::notifications::{
    Callback, NewNotification, Notification, NotificationCenter,
};
use crate::shared::config::UiConfig;
use crate::shared::scheduler::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// テーマ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl Theme {
    /// light→dark、それ以外→light
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark | Theme::System => Theme::Light,
        }
    }
}

/// サイドバーの状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarState {
    pub is_open: bool,
    pub is_collapsed: bool,
    pub active_item: Option<String>,
}

impl Default for SidebarState {
    fn default() -> Self {
        Self {
            is_open: true,
            is_collapsed: false,
            active_item: None,
        }
    }
}

/// 通知・モーダル以外の画面状態
#[derive(Debug, Clone, PartialEq)]
pub struct UiChrome {
    pub theme: Theme,
    pub sidebar: SidebarState,
    pub global_loading: bool,
    pub loading_states: BTreeMap<String, bool>,
    pub is_mobile: bool,
    pub is_mobile_menu_open: bool,
    pub search_query: String,
    pub search_results: Vec<Value>,
    pub is_search_open: bool,
    pub is_filters_open: bool,
    pub current_page: u32,
    pub items_per_page: u32,
    pub global_error: Option<String>,
}

impl Default for UiChrome {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            sidebar: SidebarState::default(),
            global_loading: false,
            loading_states: BTreeMap::new(),
            is_mobile: false,
            is_mobile_menu_open: false,
            search_query: String::new(),
            search_results: Vec::new(),
            is_search_open: false,
            is_filters_open: false,
            current_page: 1,
            items_per_page: 10,
            global_error: None,
        }
    }
}

struct UiState {
    chrome: UiChrome,
    notifications: NotificationCenter,
    modals: ModalStack,
}

impl UiState {
    fn run_due_timers(&mut self) -> usize {
        self.notifications.run_due_timers() + self.modals.run_due_timers()
    }

    fn time_until_next(&self) -> Option<Duration> {
        match (
            self.notifications.time_until_next(),
            self.modals.time_until_next(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// UIストア
pub struct UiStore {
    state: Mutex<UiState>,
    timers_changed: Notify,
}

impl UiStore {
    pub fn new(clock: Arc<dyn Clock>, config: &UiConfig) -> Self {
        Self {
            state: Mutex::new(UiState {
                chrome: UiChrome::default(),
                notifications: NotificationCenter::new(clock.clone(), config.max_notifications),
                modals: ModalStack::new(clock, config.modal_close_delay),
            }),
            timers_changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, UiState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn chrome_mut<R>(&self, edit: impl FnOnce(&mut UiChrome) -> R) -> R {
        edit(&mut self.lock().chrome)
    }

    /// タイマーを追加・変更する操作の後にタイマー駆動タスクを起こす
    fn with_timers<R>(&self, edit: impl FnOnce(&mut UiState) -> R) -> R {
        let result = edit(&mut *self.lock());
        self.timers_changed.notify_one();
        result
    }

    /// 画面状態のコピー
    pub fn chrome(&self) -> UiChrome {
        self.lock().chrome.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.items().to_vec()
    }

    pub fn modals(&self) -> Vec<Modal> {
        self.lock().modals.modals().to_vec()
    }

    // ===== テーマ =====

    pub fn set_theme(&self, theme: Theme) {
        self.chrome_mut(|chrome| chrome.theme = theme);
    }

    pub fn toggle_theme(&self) {
        self.chrome_mut(|chrome| chrome.theme = chrome.theme.toggled());
    }

    // ===== 通知 =====

    pub fn add_notification(&self, notification: NewNotification) -> String {
        self.with_timers(|state| state.notifications.add(notification))
    }

    pub fn remove_notification(&self, id: &str) -> bool {
        self.lock().notifications.remove(id)
    }

    pub fn clear_notifications(&self) {
        self.lock().notifications.clear();
    }

    pub fn show_success(&self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.with_timers(|state| state.notifications.show_success(title, message, duration))
    }

    pub fn show_error(&self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.with_timers(|state| state.notifications.show_error(title, message, duration))
    }

    pub fn show_warning(&self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.with_timers(|state| state.notifications.show_warning(title, message, duration))
    }

    pub fn show_info(&self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.with_timers(|state| state.notifications.show_info(title, message, duration))
    }

    // ===== モーダル =====

    pub fn open_modal(&self, spec: ModalSpec) -> String {
        self.lock().modals.open(spec)
    }

    pub fn open_expense_form_modal(&self, expense: Option<Value>) -> String {
        self.lock().modals.open_expense_form(expense)
    }

    pub fn open_expense_details_modal(&self, expense_id: &str) -> String {
        self.lock().modals.open_expense_details(expense_id)
    }

    pub fn open_confirmation_modal(
        &self,
        title: &str,
        message: &str,
        on_confirm: Callback,
        on_cancel: Option<Callback>,
    ) -> String {
        self.lock()
            .modals
            .open_confirmation(title, message, on_confirm, on_cancel)
    }

    pub fn open_receipt_viewer_modal(&self, receipt_url: &str) -> String {
        self.lock().modals.open_receipt_viewer(receipt_url)
    }

    pub fn open_bulk_actions_modal(&self, expense_ids: &[String]) -> String {
        self.lock().modals.open_bulk_actions(expense_ids)
    }

    pub fn close_modal(&self, id: &str) -> bool {
        self.with_timers(|state| state.modals.close(id))
    }

    pub fn close_all_modals(&self) -> usize {
        self.with_timers(|state| state.modals.close_all())
    }

    pub fn update_modal(&self, id: &str, update: ModalUpdate) -> bool {
        self.lock().modals.update(id, update)
    }

    /// モーダルを閉じ、`on_confirm`を呼び出す
    ///
    /// コールバックはロックを解放してから呼ぶため、ストアを操作してよい
    pub fn confirm_modal(&self, id: &str) -> bool {
        self.close_with(id, |modal| modal.on_confirm.clone())
    }

    /// モーダルを閉じ、`on_close`を呼び出す
    pub fn dismiss_modal(&self, id: &str) -> bool {
        self.close_with(id, |modal| modal.on_close.clone())
    }

    fn close_with(&self, id: &str, pick: impl FnOnce(&Modal) -> Option<Callback>) -> bool {
        let callback = {
            let mut state = self.lock();
            let Some(callback) = state.modals.get(id).filter(|m| m.is_open).map(pick) else {
                return false;
            };
            state.modals.close(id);
            callback
        };
        self.timers_changed.notify_one();

        if let Some(callback) = callback {
            callback();
        }
        true
    }

    // ===== サイドバー =====

    pub fn toggle_sidebar(&self) {
        self.chrome_mut(|chrome| chrome.sidebar.is_open = !chrome.sidebar.is_open);
    }

    pub fn set_sidebar_open(&self, is_open: bool) {
        self.chrome_mut(|chrome| chrome.sidebar.is_open = is_open);
    }

    pub fn set_sidebar_collapsed(&self, is_collapsed: bool) {
        self.chrome_mut(|chrome| chrome.sidebar.is_collapsed = is_collapsed);
    }

    pub fn set_active_sidebar_item(&self, item: &str) {
        self.chrome_mut(|chrome| chrome.sidebar.active_item = Some(item.to_string()));
    }

    // ===== ローディング =====

    pub fn set_global_loading(&self, loading: bool) {
        self.chrome_mut(|chrome| chrome.global_loading = loading);
    }

    pub fn set_loading_state(&self, key: &str, loading: bool) {
        self.chrome_mut(|chrome| {
            chrome.loading_states.insert(key.to_string(), loading);
        });
    }

    pub fn clear_loading_state(&self, key: &str) {
        self.chrome_mut(|chrome| {
            chrome.loading_states.remove(key);
        });
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.lock()
            .chrome
            .loading_states
            .get(key)
            .copied()
            .unwrap_or(false)
    }

    // ===== モバイル =====

    pub fn set_is_mobile(&self, is_mobile: bool) {
        self.chrome_mut(|chrome| chrome.is_mobile = is_mobile);
    }

    pub fn toggle_mobile_menu(&self) {
        self.chrome_mut(|chrome| chrome.is_mobile_menu_open = !chrome.is_mobile_menu_open);
    }

    pub fn set_mobile_menu_open(&self, is_open: bool) {
        self.chrome_mut(|chrome| chrome.is_mobile_menu_open = is_open);
    }

    // ===== 検索 =====

    pub fn set_search_query(&self, query: &str) {
        self.chrome_mut(|chrome| chrome.search_query = query.to_string());
    }

    pub fn set_search_results(&self, results: Vec<Value>) {
        self.chrome_mut(|chrome| chrome.search_results = results);
    }

    pub fn set_search_open(&self, is_open: bool) {
        self.chrome_mut(|chrome| chrome.is_search_open = is_open);
    }

    pub fn clear_search(&self) {
        self.chrome_mut(|chrome| {
            chrome.search_query.clear();
            chrome.search_results.clear();
            chrome.is_search_open = false;
        });
    }

    // ===== 絞り込みパネル・ページ =====

    pub fn set_filters_open(&self, is_open: bool) {
        self.chrome_mut(|chrome| chrome.is_filters_open = is_open);
    }

    pub fn toggle_filters(&self) {
        self.chrome_mut(|chrome| chrome.is_filters_open = !chrome.is_filters_open);
    }

    pub fn set_current_page(&self, page: u32) {
        self.chrome_mut(|chrome| chrome.current_page = page);
    }

    pub fn set_items_per_page(&self, items: u32) {
        self.chrome_mut(|chrome| chrome.items_per_page = items);
    }

    // ===== エラー =====

    pub fn set_global_error(&self, error: Option<String>) {
        self.chrome_mut(|chrome| chrome.global_error = error);
    }

    pub fn clear_global_error(&self) {
        self.chrome_mut(|chrome| chrome.global_error = None);
    }

    /// 画面状態を初期値に戻し、通知とモーダルを破棄する
    ///
    /// テーマとモバイル判定は維持する
    pub fn reset_ui(&self) {
        let mut state = self.lock();
        let chrome = &mut state.chrome;
        *chrome = UiChrome {
            theme: chrome.theme,
            is_mobile: chrome.is_mobile,
            ..UiChrome::default()
        };
        state.notifications.clear();
        state.modals.clear();
        log::debug!("UI状態をリセットしました");
    }

    // ===== タイマー =====

    /// 期限を迎えた通知・モーダルを取り除き、削除数を返す
    pub fn run_due_timers(&self) -> usize {
        self.lock().run_due_timers()
    }

    /// 次のタイマー期限までの残り時間
    pub fn time_until_next_timer(&self) -> Option<Duration> {
        self.lock().time_until_next()
    }

    /// タイマーを処理するタスクを起動する
    ///
    /// 次の期限まで待機し、新しいタイマーが追加された場合は待ち時間を計算し直す。
    /// `cancel`がキャンセルされるとタスクは終了する。
    pub fn spawn_timer_driver(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            log::debug!("UIタイマータスクを開始しました");

            loop {
                let wait = {
                    let mut state = store.lock();
                    state.run_due_timers();
                    state.time_until_next()
                };

                let sleep = async {
                    match wait {
                        Some(duration) => tokio::time::sleep(duration).await,
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::debug!("UIタイマータスクを停止しました");
                        break;
                    }
                    _ = store.timers_changed.notified() => {}
                    _ = sleep => {}
                }
            }
        })
    }
}
