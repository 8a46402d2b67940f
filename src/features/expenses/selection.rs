use crate::features::expenses::models::Expense;
use std::collections::HashSet;

/// 一括操作のために選択された経費IDの集合
///
/// 常に読み込み済みページに含まれるIDの部分集合として保たれる。
/// 選択順を保持する。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: Vec<String>,
}

fn is_loaded(loaded: &[Expense], id: &str) -> bool {
    loaded.iter().any(|expense| expense.id == id)
}

/// 読み込み済みページ内の重複しないIDの数
fn distinct_count(loaded: &[Expense]) -> usize {
    loaded
        .iter()
        .map(|expense| expense.id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|selected| selected == id)
    }

    /// IDを選択に加える
    ///
    /// 読み込まれていないID・選択済みのIDは無視し、falseを返す
    pub fn select(&mut self, id: &str, loaded: &[Expense]) -> bool {
        if self.contains(id) || !is_loaded(loaded, id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    /// IDを選択から外す（未選択なら何もしない）
    pub fn deselect(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|selected| selected != id);
        self.ids.len() != before
    }

    pub fn toggle(&mut self, id: &str, loaded: &[Expense]) {
        if !self.deselect(id) {
            self.select(id, loaded);
        }
    }

    /// 読み込み済みの全経費を選択する（サーバー上の全件ではない）
    pub fn select_all(&mut self, loaded: &[Expense]) {
        let mut seen = HashSet::new();
        self.ids.clear();
        for expense in loaded {
            if seen.insert(expense.id.as_str()) {
                self.ids.push(expense.id.clone());
            }
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// 読み込み済みページに存在しないIDを取り除く
    pub fn retain_loaded(&mut self, loaded: &[Expense]) {
        self.ids.retain(|id| is_loaded(loaded, id));
    }

    /// 選択数が読み込み件数と等しく、かつ1件以上
    ///
    /// 同じIDが複数回含まれるページでは1件として数える
    pub fn is_all_selected(&self, loaded: &[Expense]) -> bool {
        let loaded_count = distinct_count(loaded);
        loaded_count > 0 && self.ids.len() == loaded_count
    }

    /// 1件以上選択されているが全件ではない
    pub fn is_partially_selected(&self, loaded: &[Expense]) -> bool {
        !self.ids.is_empty() && self.ids.len() < distinct_count(loaded)
    }

    /// 選択中の読み込み済み経費
    pub fn selected<'a>(&self, loaded: &'a [Expense]) -> Vec<&'a Expense> {
        loaded
            .iter()
            .filter(|expense| self.contains(&expense.id))
            .collect()
    }

    /// 選択中の読み込み済み経費の金額合計
    pub fn selected_amount(&self, loaded: &[Expense]) -> f64 {
        self.selected(loaded)
            .into_iter()
            .map(|expense| expense.amount)
            .sum()
    }
}
