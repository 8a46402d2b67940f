/// モーダルスタック
///
/// 閉じる操作は2段階で行う。まず`is_open`をfalseにし（退場アニメーション用）、
/// 一定時間後にスタックから取り除く。
use crate::features::ui::notifications::Callback;
use crate::shared::scheduler::{Clock, TimerId, TimerQueue};
use crate::shared::utils::generate_id;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// モーダルの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModalKind {
    ExpenseForm,
    ExpenseDetails,
    Confirmation,
    ReceiptViewer,
    BulkActions,
}

/// 開くモーダルの内容
#[derive(Clone)]
pub struct ModalSpec {
    pub kind: ModalKind,
    pub data: Option<Value>,
    pub on_close: Option<Callback>,
    pub on_confirm: Option<Callback>,
}

impl ModalSpec {
    pub fn new(kind: ModalKind) -> Self {
        Self {
            kind,
            data: None,
            on_close: None,
            on_confirm: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn on_close(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(callback));
        self
    }

    pub fn on_confirm(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_confirm = Some(Arc::new(callback));
        self
    }
}

/// 既存モーダルへの部分更新（開閉状態は変更できない）
#[derive(Clone, Default)]
pub struct ModalUpdate {
    pub kind: Option<ModalKind>,
    pub data: Option<Value>,
    pub on_close: Option<Callback>,
    pub on_confirm: Option<Callback>,
}

/// スタック上のモーダル
#[derive(Clone)]
pub struct Modal {
    pub id: String,
    pub kind: ModalKind,
    pub is_open: bool,
    pub data: Option<Value>,
    pub on_close: Option<Callback>,
    pub on_confirm: Option<Callback>,
    removal_timer: Option<TimerId>,
}

impl Modal {
    /// 削除タイマーのハンドル（閉じる処理中のみ）
    pub fn removal_timer(&self) -> Option<TimerId> {
        self.removal_timer
    }
}

impl std::fmt::Debug for Modal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modal")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("is_open", &self.is_open)
            .field("data", &self.data)
            .field("removal_timer", &self.removal_timer)
            .finish_non_exhaustive()
    }
}

/// 開いている順に並んだモーダルの一覧
#[derive(Debug)]
pub struct ModalStack {
    modals: Vec<Modal>,
    timers: TimerQueue<Vec<String>>,
    close_delay: Duration,
}

impl ModalStack {
    /// # 引数
    /// * `clock` - 遅延削除タイマーに使う時計
    /// * `close_delay` - 閉じてからスタックから取り除くまでの時間
    pub fn new(clock: Arc<dyn Clock>, close_delay: Duration) -> Self {
        Self {
            modals: Vec::new(),
            timers: TimerQueue::new(clock),
            close_delay,
        }
    }

    pub fn modals(&self) -> &[Modal] {
        &self.modals
    }

    pub fn get(&self, id: &str) -> Option<&Modal> {
        self.modals.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.modals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modals.is_empty()
    }

    /// 最前面の開いているモーダル
    pub fn top_open(&self) -> Option<&Modal> {
        self.modals.iter().rev().find(|m| m.is_open)
    }

    /// モーダルを開いた状態で追加し、採番したIDを返す
    pub fn open(&mut self, spec: ModalSpec) -> String {
        let id = generate_id();
        let kind = spec.kind;
        log::debug!("モーダルを開きます: id={id}, kind={kind:?}");

        self.modals.push(Modal {
            id: id.clone(),
            kind,
            is_open: true,
            data: spec.data,
            on_close: spec.on_close,
            on_confirm: spec.on_confirm,
            removal_timer: None,
        });
        id
    }

    /// 経費フォーム（編集時は経費データを渡す）
    pub fn open_expense_form(&mut self, expense: Option<Value>) -> String {
        let mut spec = ModalSpec::new(ModalKind::ExpenseForm);
        spec.data = expense;
        self.open(spec)
    }

    pub fn open_expense_details(&mut self, expense_id: &str) -> String {
        self.open(
            ModalSpec::new(ModalKind::ExpenseDetails).with_data(json!({ "expenseId": expense_id })),
        )
    }

    /// 確認ダイアログ（キャンセル時のコールバックは`on_close`として保持する）
    pub fn open_confirmation(
        &mut self,
        title: &str,
        message: &str,
        on_confirm: Callback,
        on_cancel: Option<Callback>,
    ) -> String {
        self.open(ModalSpec {
            kind: ModalKind::Confirmation,
            data: Some(json!({ "title": title, "message": message })),
            on_close: on_cancel,
            on_confirm: Some(on_confirm),
        })
    }

    pub fn open_receipt_viewer(&mut self, receipt_url: &str) -> String {
        self.open(
            ModalSpec::new(ModalKind::ReceiptViewer).with_data(json!({ "receiptUrl": receipt_url })),
        )
    }

    pub fn open_bulk_actions(&mut self, expense_ids: &[String]) -> String {
        self.open(
            ModalSpec::new(ModalKind::BulkActions).with_data(json!({ "expenseIds": expense_ids })),
        )
    }

    /// モーダルを閉じ、遅延削除を予約する
    ///
    /// 既に閉じる処理中・存在しない場合は何もせずfalseを返す
    pub fn close(&mut self, id: &str) -> bool {
        let Some(modal) = self.modals.iter_mut().find(|m| m.id == id && m.is_open) else {
            return false;
        };

        let timer = self.timers.schedule(self.close_delay, vec![id.to_string()]);
        modal.is_open = false;
        modal.removal_timer = Some(timer);
        true
    }

    /// 開いている全モーダルを閉じ、共通の遅延削除を1つ予約する
    ///
    /// 予約時点で閉じたモーダルだけが削除対象になる
    pub fn close_all(&mut self) -> usize {
        let closing: Vec<String> = self
            .modals
            .iter()
            .filter(|m| m.is_open)
            .map(|m| m.id.clone())
            .collect();
        if closing.is_empty() {
            return 0;
        }

        let count = closing.len();
        let timer = self.timers.schedule(self.close_delay, closing);
        for modal in self.modals.iter_mut().filter(|m| m.is_open) {
            modal.is_open = false;
            modal.removal_timer = Some(timer);
        }
        count
    }

    /// 指定したフィールドだけを書き換える
    pub fn update(&mut self, id: &str, update: ModalUpdate) -> bool {
        let Some(modal) = self.modals.iter_mut().find(|m| m.id == id) else {
            return false;
        };

        let ModalUpdate {
            kind,
            data,
            on_close,
            on_confirm,
        } = update;
        if let Some(kind) = kind {
            modal.kind = kind;
        }
        if data.is_some() {
            modal.data = data;
        }
        if on_close.is_some() {
            modal.on_close = on_close;
        }
        if on_confirm.is_some() {
            modal.on_confirm = on_confirm;
        }
        true
    }

    /// 全モーダルを即座に取り除き、削除タイマーも破棄する
    pub fn clear(&mut self) {
        self.modals.clear();
        self.timers.clear();
    }

    /// 遅延時間を過ぎたモーダルを取り除き、削除数を返す
    pub fn run_due_timers(&mut self) -> usize {
        let due: Vec<String> = self.timers.take_due().into_iter().flatten().collect();
        let before = self.modals.len();
        self.modals.retain(|m| !due.contains(&m.id));
        before - self.modals.len()
    }

    pub fn time_until_next(&self) -> Option<Duration> {
        self.timers.time_until_next()
    }
}
