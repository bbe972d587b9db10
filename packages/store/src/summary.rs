//! # Aggregates for the expense and planner views
//!
//! Pure functions over record slices; nothing here touches storage.
//!
//! - [`MonthRange`] — inclusive first/last day of a Gregorian month.
//! - [`MonthlySummary`] — income and expense totals for one month, the remaining
//!   balance, and per-category totals.
//! - [`TaskBuckets`] — today / upcoming / overdue split of tasks.
//! - [`DailyProgress`] and [`completion_percent`] — completion ratios for the
//!   daily summary card.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::models::{Expense, ExpenseCategory, Income, Task};

/// Inclusive date range covering one Gregorian month.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonthRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthRange {
    /// The month `year-month`, or `None` for an invalid month.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            start,
            end: next.pred_opt()?,
        })
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let start = date.with_day(1).unwrap_or(date);
        let end = start
            .checked_add_months(chrono::Months::new(1))
            .and_then(|d| d.pred_opt())
            .unwrap_or(date);
        Self { start, end }
    }

    /// Parse `YYYY-MM`.
    pub fn parse(s: &str) -> Option<Self> {
        let (y, m) = s.trim().split_once('-')?;
        Self::new(y.parse().ok()?, m.parse().ok()?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> u32 {
        self.end.day()
    }
}

/// Income and expense totals for one month.
#[derive(Clone, Debug, PartialEq)]
pub struct MonthlySummary {
    pub month: MonthRange,
    pub expense_total: Decimal,
    pub income_total: Decimal,
    pub expense_count: usize,
    pub income_count: usize,
    /// Expense total per category name. Expenses whose category is unknown are
    /// grouped under their raw category id.
    pub category_totals: BTreeMap<String, Decimal>,
}

impl MonthlySummary {
    pub fn compute(
        month: MonthRange,
        expenses: &[Expense],
        incomes: &[Income],
        categories: &[ExpenseCategory],
    ) -> Self {
        let names: BTreeMap<&str, &str> = categories
            .iter()
            .map(|c| (c.id.as_str(), c.name.as_str()))
            .collect();

        let mut summary = Self {
            month,
            expense_total: Decimal::ZERO,
            income_total: Decimal::ZERO,
            expense_count: 0,
            income_count: 0,
            category_totals: BTreeMap::new(),
        };

        for expense in expenses.iter().filter(|e| month.contains(e.expense_date)) {
            summary.expense_total += expense.amount;
            summary.expense_count += 1;
            let name = names
                .get(expense.category_id.as_str())
                .copied()
                .unwrap_or(expense.category_id.as_str());
            *summary
                .category_totals
                .entry(name.to_string())
                .or_insert(Decimal::ZERO) += expense.amount;
        }

        for income in incomes.iter().filter(|i| month.contains(i.income_date)) {
            summary.income_total += income.amount;
            summary.income_count += 1;
        }

        summary
    }

    /// Income minus expenses. Negative when the month is overspent.
    pub fn remaining(&self) -> Decimal {
        self.income_total - self.expense_total
    }

    /// The `n` largest categories, largest first; ties ordered by name.
    pub fn top_categories(&self, n: usize) -> Vec<(&str, Decimal)> {
        let mut totals: Vec<(&str, Decimal)> = self
            .category_totals
            .iter()
            .map(|(name, amount)| (name.as_str(), *amount))
            .collect();
        totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        totals.truncate(n);
        totals
    }

    /// Average spend per elapsed day, `elapsed_days` being today's day of month.
    pub fn daily_average(&self, elapsed_days: u32) -> Decimal {
        if elapsed_days == 0 {
            return Decimal::ZERO;
        }
        (self.expense_total / Decimal::from(elapsed_days)).round_dp(2)
    }
}

/// Tasks split by due date relative to `today`. Tasks without a due date are
/// in no bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskBuckets<'a> {
    pub today: Vec<&'a Task>,
    pub upcoming: Vec<&'a Task>,
    pub overdue: Vec<&'a Task>,
}

impl<'a> TaskBuckets<'a> {
    pub fn split(tasks: &'a [Task], today: NaiveDate) -> Self {
        let mut buckets = Self::default();
        for task in tasks {
            let Some(due) = task.due_date else { continue };
            if due == today {
                buckets.today.push(task);
            } else if due > today {
                buckets.upcoming.push(task);
            } else if !task.completed {
                buckets.overdue.push(task);
            }
        }
        buckets
    }
}

/// Percentage of `done` out of `total`, rounded to the nearest integer.
pub fn completion_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (done.min(total) * 100 + total / 2) / total;
    pct as u8
}

/// Completion counters shown on the daily summary card.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DailyProgress {
    pub tasks: (usize, usize),
    pub goals: (usize, usize),
    pub habits: (usize, usize),
}

impl DailyProgress {
    pub fn task_percent(&self) -> u8 {
        completion_percent(self.tasks.0, self.tasks.1)
    }

    pub fn goal_percent(&self) -> u8 {
        completion_percent(self.goals.0, self.goals.1)
    }

    pub fn habit_percent(&self) -> u8 {
        completion_percent(self.habits.0, self.habits.1)
    }
}
