/// 通知センター
///
/// 通知ごとに独立した自動削除タイマーを持つ。タイマーの発火判定は
/// `run_due_timers`の呼び出し時に行う。
use crate::shared::scheduler::{Clock, TimerId, TimerQueue};
use crate::shared::utils::generate_id;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// UIから呼び出されるコールバック
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// 通知の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    /// 種類ごとの既定の表示時間（エラーは長めに表示する）
    pub fn default_duration(self) -> Duration {
        match self {
            Severity::Success => Duration::from_millis(5000),
            Severity::Error => Duration::from_millis(7000),
            Severity::Warning => Duration::from_millis(6000),
            Severity::Info => Duration::from_millis(5000),
        }
    }
}

/// 通知に1つだけ付けられる操作ボタン
#[derive(Clone)]
pub struct NotificationAction {
    pub label: String,
    pub on_click: Callback,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>, on_click: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            on_click: Arc::new(on_click),
        }
    }
}

impl std::fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// 追加する通知の内容（IDは追加時に採番される）
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub severity: Severity,
    pub title: String,
    pub message: String,
    /// Noneまたはゼロの場合は自動削除しない
    pub duration: Option<Duration>,
    pub action: Option<NotificationAction>,
}

/// 表示中の通知（作成後は変更されない）
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub duration: Option<Duration>,
    pub action: Option<NotificationAction>,
    timer: Option<TimerId>,
}

impl Notification {
    /// 自動削除タイマーのハンドル
    pub fn timer(&self) -> Option<TimerId> {
        self.timer
    }
}

/// 通知キュー
#[derive(Debug)]
pub struct NotificationCenter {
    items: Vec<Notification>,
    timers: TimerQueue<String>,
    max_items: usize,
}

impl NotificationCenter {
    /// # 引数
    /// * `clock` - 自動削除タイマーに使う時計
    /// * `max_items` - 保持する通知の上限（超えた分は古い順に削除）
    pub fn new(clock: Arc<dyn Clock>, max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            timers: TimerQueue::new(clock),
            max_items: max_items.max(1),
        }
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    /// 通知を末尾に追加し、採番したIDを返す
    pub fn add(&mut self, notification: NewNotification) -> String {
        let id = generate_id();
        let timer = notification
            .duration
            .filter(|duration| !duration.is_zero())
            .map(|duration| self.timers.schedule(duration, id.clone()));

        self.items.push(Notification {
            id: id.clone(),
            severity: notification.severity,
            title: notification.title,
            message: notification.message,
            duration: notification.duration,
            action: notification.action,
            timer,
        });

        while self.items.len() > self.max_items {
            let evicted = self.items.remove(0);
            self.cancel_timer(&evicted);
            log::debug!("通知の上限を超えたため古い通知を削除しました: id={}", evicted.id);
        }

        id
    }

    fn show(
        &mut self,
        severity: Severity,
        title: &str,
        message: &str,
        duration: Option<Duration>,
    ) -> String {
        self.add(NewNotification {
            severity,
            title: title.to_string(),
            message: message.to_string(),
            duration: Some(duration.unwrap_or_else(|| severity.default_duration())),
            action: None,
        })
    }

    /// 成功通知（既定5000ms）
    pub fn show_success(&mut self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.show(Severity::Success, title, message, duration)
    }

    /// エラー通知（既定7000ms）
    pub fn show_error(&mut self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.show(Severity::Error, title, message, duration)
    }

    /// 警告通知（既定6000ms）
    pub fn show_warning(&mut self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.show(Severity::Warning, title, message, duration)
    }

    /// 情報通知（既定5000ms）
    pub fn show_info(&mut self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.show(Severity::Info, title, message, duration)
    }

    fn cancel_timer(&mut self, notification: &Notification) {
        if let Some(timer) = notification.timer {
            self.timers.cancel(timer);
        }
    }

    /// 通知を削除する（存在しない場合は何もしない）
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.items.iter().position(|n| n.id == id) else {
            return false;
        };
        let removed = self.items.remove(index);
        self.cancel_timer(&removed);
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.timers.clear();
    }

    /// 表示時間を過ぎた通知を削除し、削除数を返す
    pub fn run_due_timers(&mut self) -> usize {
        let due = self.timers.take_due();
        let before = self.items.len();
        self.items.retain(|n| !due.contains(&n.id));
        before - self.items.len()
    }

    /// 次の自動削除までの残り時間
    pub fn time_until_next(&self) -> Option<Duration> {
        self.timers.time_until_next()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}
