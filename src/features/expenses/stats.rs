use crate::features::expenses::models::{Expense, ExpenseStatus};
use crate::features::expenses::selection::SelectionSet;
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// 読み込み済みページから算出する経費統計
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseStats {
    pub total_amount: f64,
    pub count: usize,
    pub average_amount: f64,
    pub by_category: BTreeMap<String, f64>,
    pub by_status: BTreeMap<ExpenseStatus, usize>,
    /// `YYYY-MM`ごとの金額合計
    pub by_month: BTreeMap<String, f64>,
}

impl ExpenseStats {
    pub fn from_expenses(expenses: &[Expense]) -> Self {
        let mut stats = Self {
            count: expenses.len(),
            ..Self::default()
        };

        for expense in expenses {
            stats.total_amount += expense.amount;
            *stats
                .by_category
                .entry(expense.category.clone())
                .or_insert(0.0) += expense.amount;
            *stats.by_status.entry(expense.status).or_insert(0) += 1;

            match month_key(&expense.date) {
                Some(month) => *stats.by_month.entry(month).or_insert(0.0) += expense.amount,
                None => log::debug!(
                    "日付を解釈できないため月別集計から除外します: id={}, date={}",
                    expense.id,
                    expense.date
                ),
            }
        }

        if stats.count > 0 {
            stats.average_amount = stats.total_amount / stats.count as f64;
        }
        stats
    }
}

/// 経費の日付（`YYYY-MM-DD`またはRFC3339）から`YYYY-MM`を取り出す
fn month_key(date: &str) -> Option<String> {
    if let Ok(day) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(day.format("%Y-%m").to_string());
    }
    DateTime::parse_from_rfc3339(date)
        .ok()
        .map(|timestamp| timestamp.format("%Y-%m").to_string())
}

/// 選択状態の集計
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSummary {
    pub selected_ids: Vec<String>,
    pub selected_expenses: Vec<Expense>,
    pub selected_amount: f64,
    pub is_all_selected: bool,
    pub is_partially_selected: bool,
}

impl SelectionSummary {
    pub fn compute(selection: &SelectionSet, loaded: &[Expense]) -> Self {
        Self {
            selected_ids: selection.ids().to_vec(),
            selected_expenses: selection.selected(loaded).into_iter().cloned().collect(),
            selected_amount: selection.selected_amount(loaded),
            is_all_selected: selection.is_all_selected(loaded),
            is_partially_selected: selection.is_partially_selected(loaded),
        }
    }
}
