//! # Domain models for the organizer tables
//!
//! Defines the flat records mirrored between the local cache and the hosted
//! backend. Every record type serializes with the **remote column names** so the
//! same JSON travels unchanged from a local row to a table insert.
//!
//! ## Types
//!
//! | Struct | Table | Date used for month filters |
//! |--------|-------|-----------------------------|
//! | [`Task`] | `tasks` | `due_date` |
//! | [`Expense`] | `expenses` | `expense_date` |
//! | [`Income`] | `income` | `income_date` |
//! | [`Note`] | `notes` | none (timestamps live on the row envelope) |
//! | [`Goal`] | `goals` | `goal_date` |
//! | [`Bill`] | `bills` | `bill_date` |
//!
//! [`ExpenseCategory`] and [`Profile`] are remote-only reference data and are
//! never cached.
//!
//! ## [`Entity`]
//!
//! Ties a record type to its [`Table`] and exposes the date the summaries filter
//! on. [`Entity::validate`] enforces the invariants the tables rely on
//! (non-empty titles, non-negative amounts) before anything is written.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The locally cached tables, in the order a reconciliation pass walks them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Tasks,
    Expenses,
    Income,
    Notes,
    Goals,
    Bills,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Tasks,
        Table::Expenses,
        Table::Income,
        Table::Notes,
        Table::Goals,
        Table::Bills,
    ];

    /// Remote table name, also used as the local store name.
    pub fn name(self) -> &'static str {
        match self {
            Table::Tasks => "tasks",
            Table::Expenses => "expenses",
            Table::Income => "income",
            Table::Notes => "notes",
            Table::Goals => "goals",
            Table::Bills => "bills",
        }
    }

    /// First local schema version that carries this table.
    pub fn since_version(self) -> u32 {
        match self {
            Table::Goals => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown table: {s}"))
    }
}

/// A record violated one of the table invariants.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} must not be negative")]
    Negative(&'static str),
}

/// A record type stored in one of the cached tables.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned {
    const TABLE: Table;

    /// The calendar date month filters use, if the record has one.
    fn record_date(&self) -> Option<NaiveDate> {
        None
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Records with a completion checkbox.
pub trait Completable {
    fn set_completed(&mut self, completed: bool);
}

/// Task priority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            due_date: None,
            completed: false,
            priority: Priority::default(),
        }
    }

    pub fn due(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl Entity for Task {
    const TABLE: Table = Table::Tasks;

    fn record_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    fn validate(&self) -> Result<(), ValidationError> {
        non_empty("title", &self.title)
    }
}

impl Completable for Task {
    fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub amount: Decimal,
    pub category_id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub expense_date: NaiveDate,
}

impl Entity for Expense {
    const TABLE: Table = Table::Expenses;

    fn record_date(&self) -> Option<NaiveDate> {
        Some(self.expense_date)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        non_negative("amount", self.amount)?;
        non_empty("category_id", &self.category_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Income {
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    pub income_date: NaiveDate,
}

impl Entity for Income {
    const TABLE: Table = Table::Income;

    fn record_date(&self) -> Option<NaiveDate> {
        Some(self.income_date)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        non_negative("amount", self.amount)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl Entity for Note {
    const TABLE: Table = Table::Notes;

    fn validate(&self) -> Result<(), ValidationError> {
        non_empty("title", &self.title)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub goal_date: NaiveDate,
}

impl Entity for Goal {
    const TABLE: Table = Table::Goals;

    fn record_date(&self) -> Option<NaiveDate> {
        Some(self.goal_date)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        non_empty("text", &self.text)
    }
}

impl Completable for Goal {
    fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }
}

/// A scanned bill. The file itself lives in object storage; the row only
/// carries its `file_path`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub title: String,
    pub file_path: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub bill_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl Entity for Bill {
    const TABLE: Table = Table::Bills;

    fn record_date(&self) -> Option<NaiveDate> {
        self.bill_date
    }

    fn validate(&self) -> Result<(), ValidationError> {
        non_empty("title", &self.title)?;
        non_empty("file_path", &self.file_path)?;
        match self.amount {
            Some(amount) => non_negative("amount", amount),
            None => Ok(()),
        }
    }
}

/// Expense category from the shared `expense_categories` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Row of the `profiles` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Name to greet the user with, falling back to "there".
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("there")
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty(field))
    } else {
        Ok(())
    }
}

fn non_negative(field: &'static str, value: Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        Err(ValidationError::Negative(field))
    } else {
        Ok(())
    }
}
