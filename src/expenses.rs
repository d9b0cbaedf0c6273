//! Expense tracking on the Expenses sheet, independent of orders.
//!
//! The panel charts expenses by type and by month; those aggregations are
//! computed client-side from the full decoded list, so the pure helpers
//! live here next to the CRUD.

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use uuid::Uuid;

use crate::codec::{expense_from_row, expense_to_row};
use crate::models::{Expense, ExpenseType};
use crate::sheets::{Sheet, SheetsClient};

fn err_value(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

pub async fn list(client: &SheetsClient) -> Result<Vec<Expense>, String> {
    let rows = client.list(Sheet::Expenses).await.map_err(|e| e.to_string())?;
    Ok(rows.iter().map(|row| expense_from_row(row)).collect())
}

fn find_by_id(expenses: &[Expense], id: &str) -> Option<usize> {
    expenses.iter().position(|e| e.id == id.trim())
}

pub async fn add(
    client: &SheetsClient,
    expense_type: ExpenseType,
    amount: f64,
    note: &str,
    date: &str,
) -> Value {
    if amount <= 0.0 {
        return err_value("Expense amount must be positive");
    }
    let expense = Expense {
        id: Uuid::new_v4().to_string(),
        expense_type,
        amount,
        note: note.trim().to_string(),
        date: if date.trim().is_empty() {
            chrono::Utc::now().format("%Y-%m-%d").to_string()
        } else {
            date.trim().to_string()
        },
    };
    match client.append(Sheet::Expenses, &expense_to_row(&expense)).await {
        Ok(()) => {
            info!(expense_type = expense_type.as_str(), amount, "expense recorded");
            json!({ "success": true, "id": expense.id })
        }
        Err(e) => err_value(e),
    }
}

pub async fn update(client: &SheetsClient, id: &str, updated: Expense) -> Value {
    let expenses = match list(client).await {
        Ok(expenses) => expenses,
        Err(e) => return err_value(e),
    };
    let Some(index) = find_by_id(&expenses, id) else {
        return err_value(format!("Expense '{id}' not found"));
    };

    let mut expense = updated;
    expense.id = expenses[index].id.clone();
    match client
        .update_row(
            Sheet::Expenses,
            index + 2,
            Sheet::Expenses.last_column(),
            &expense_to_row(&expense),
        )
        .await
    {
        Ok(()) => json!({ "success": true }),
        Err(e) => err_value(e),
    }
}

pub async fn delete(client: &SheetsClient, id: &str) -> Value {
    let expenses = match list(client).await {
        Ok(expenses) => expenses,
        Err(e) => return err_value(e),
    };
    let Some(index) = find_by_id(&expenses, id) else {
        return err_value(format!("Expense '{id}' not found"));
    };
    match client.delete_row(Sheet::Expenses, index + 1).await {
        Ok(()) => json!({ "success": true }),
        Err(e) => err_value(e),
    }
}

// ---------------------------------------------------------------------------
// Aggregations
// ---------------------------------------------------------------------------

pub fn totals_by_type(expenses: &[Expense]) -> HashMap<ExpenseType, f64> {
    let mut totals = HashMap::new();
    for expense in expenses {
        *totals.entry(expense.expense_type).or_insert(0.0) += expense.amount;
    }
    totals
}

/// Totals keyed by `YYYY-MM`, sorted chronologically. Rows whose date is too
/// short to carry a month bucket under an empty key rather than erroring.
pub fn totals_by_month(expenses: &[Expense]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for expense in expenses {
        let month = expense.date.get(..7).unwrap_or("").to_string();
        *totals.entry(month).or_insert(0.0) += expense.amount;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense(expense_type: ExpenseType, amount: f64, date: &str) -> Expense {
        Expense {
            id: Uuid::new_v4().to_string(),
            expense_type,
            amount,
            note: String::new(),
            date: date.to_string(),
        }
    }

    #[test]
    fn totals_group_by_type() {
        let expenses = vec![
            expense(ExpenseType::Packaging, 1200.0, "2025-05-01"),
            expense(ExpenseType::Packaging, 300.0, "2025-05-20"),
            expense(ExpenseType::Delivery, 450.0, "2025-06-02"),
        ];
        let totals = totals_by_type(&expenses);
        assert_eq!(totals[&ExpenseType::Packaging], 1500.0);
        assert_eq!(totals[&ExpenseType::Delivery], 450.0);
        assert!(!totals.contains_key(&ExpenseType::Marketing));
    }

    #[test]
    fn monthly_totals_are_chronological() {
        let expenses = vec![
            expense(ExpenseType::Delivery, 100.0, "2025-06-02"),
            expense(ExpenseType::Delivery, 50.0, "2025-05-30"),
            expense(ExpenseType::Delivery, 25.0, "2025-06-15"),
            expense(ExpenseType::Other, 10.0, "bad"),
        ];
        let totals = totals_by_month(&expenses);
        let keys: Vec<&String> = totals.keys().collect();
        assert_eq!(keys, ["", "2025-05", "2025-06"]);
        assert_eq!(totals["2025-06"], 125.0);
        assert_eq!(totals["2025-05"], 50.0);
    }
}
