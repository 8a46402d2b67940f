/// 時計とタイマーキューの抽象化
///
/// 通知の自動削除やモーダルの遅延削除は、環境のタイマーに直接依存せず
/// このモジュールのタイマーハンドルを介してスケジュールする。
/// テストでは`ManualClock`で時間を進めることで実時間の待機を不要にする。
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 単調増加する現在時刻を提供する時計
///
/// 返す値は任意の起点からの経過時間
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// tokioの時計に基づくシステム時計
///
/// `tokio::time::Instant`を使うため、`start_paused`なテストでも仮想時間に追従する
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: tokio::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// 手動で進める時計（テスト用）
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 時計を指定時間だけ進める
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// スケジュール済みタイマーのハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// 期限順に並んだキャンセル可能なタイマーのキュー
///
/// 期限到来の判定は`take_due`の呼び出し時に行う（自動では発火しない）
pub struct TimerQueue<T> {
    clock: Arc<dyn Clock>,
    next_id: u64,
    entries: BTreeMap<(Duration, TimerId), T>,
    deadlines: HashMap<TimerId, Duration>,
}

impl<T> std::fmt::Debug for TimerQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("pending", &self.entries.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

impl<T> TimerQueue<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: 0,
            entries: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// 現在時刻
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// `delay`後に期限を迎えるタスクを登録する
    ///
    /// # 戻り値
    /// キャンセルに使うタイマーハンドル
    pub fn schedule(&mut self, delay: Duration, task: T) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let deadline = self.clock.now() + delay;

        self.entries.insert((deadline, id), task);
        self.deadlines.insert(id, deadline);
        id
    }

    /// タイマーをキャンセルする
    ///
    /// # 戻り値
    /// キャンセルされたタスク（既に発火済み・未登録の場合はNone）
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let deadline = self.deadlines.remove(&id)?;
        self.entries.remove(&(deadline, id))
    }

    /// 期限を迎えたタスクを期限順に取り出す
    pub fn take_due(&mut self) -> Vec<T> {
        let now = self.clock.now();
        let mut due = Vec::new();

        while let Some((&(deadline, id), _)) = self.entries.first_key_value() {
            if deadline > now {
                break;
            }
            if let Some(task) = self.entries.remove(&(deadline, id)) {
                due.push(task);
            }
            self.deadlines.remove(&id);
        }

        due
    }

    /// 最も早い期限
    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// 次の期限までの残り時間（期限切れの場合はゼロ）
    pub fn time_until_next(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.next_deadline()
            .map(|deadline| deadline.saturating_sub(now))
    }

    /// すべてのタイマーを破棄する
    pub fn clear(&mut self) {
        self.entries.clear();
        self.deadlines.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
