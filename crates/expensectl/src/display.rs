//! Terminal rendering of API results.

use expense_client::{Category, ClientError, DashboardStats, Expense};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const BAR_WIDTH: usize = 30;

pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

pub fn expense_table(expenses: &[Expense]) -> String {
    let mut out = format!(
        "{:<6} {:<10} {:>12}  {:<20} {}\n",
        "ID", "DATE", "AMOUNT", "CATEGORY", "DESCRIPTION"
    );
    for expense in expenses {
        let category = expense
            .category_name
            .as_deref()
            .unwrap_or("Uncategorized");
        out.push_str(&format!(
            "{:<6} {:<10} {:>12}  {:<20} {}\n",
            expense.id,
            expense.date.format("%Y-%m-%d"),
            format_amount(expense.amount),
            clip(category, 20),
            clip(&expense.description, 50),
        ));
    }
    let total: Decimal = expenses.iter().map(|e| e.amount).sum();
    out.push_str(&format!(
        "\n{} expense(s), total {}\n",
        expenses.len(),
        format_amount(total)
    ));
    out
}

pub fn category_table(categories: &[Category]) -> String {
    let mut out = format!("{:<6} {}\n", "ID", "NAME");
    for category in categories {
        out.push_str(&format!("{:<6} {}\n", category.id, category.name));
    }
    out
}

fn bar(percentage: Decimal) -> String {
    let clamped = percentage.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED);
    let filled = (clamped * Decimal::from(BAR_WIDTH) / Decimal::ONE_HUNDRED)
        .round()
        .to_usize()
        .unwrap_or(0);
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

pub fn dashboard(stats: &DashboardStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("Total expenses:  {}\n", format_amount(stats.total_expenses)));
    out.push_str(&format!("This month:      {}\n", format_amount(stats.monthly_expenses)));

    if !stats.category_expenses.is_empty() {
        out.push_str("\nBy category (this month):\n");
        for item in &stats.category_expenses {
            out.push_str(&format!(
                "  {:<20} {:>12}  {} {:>5}%\n",
                clip(&item.category, 20),
                format_amount(item.amount),
                bar(item.percentage),
                item.percentage.round_dp(1),
            ));
        }
    }

    if !stats.monthly_trend.is_empty() {
        out.push_str("\nMonthly trend:\n");
        for month in &stats.monthly_trend {
            out.push_str(&format!(
                "  {:<16} {:>12}\n",
                month.month,
                format_amount(month.amount)
            ));
        }
    }

    if !stats.recent_expenses.is_empty() {
        out.push_str("\nRecent expenses:\n");
        for expense in &stats.recent_expenses {
            out.push_str(&format!(
                "  {} {:>12}  {}\n",
                expense.date.format("%Y-%m-%d"),
                format_amount(expense.amount),
                clip(&expense.description, 40)
            ));
        }
    }

    out
}

/// Human-readable description of a client error, with field details.
pub fn error_message(err: &ClientError) -> String {
    match err {
        ClientError::Validation { message, fields } if !fields.is_empty() => {
            let mut out = message.clone();
            for (field, messages) in fields {
                for m in messages {
                    out.push_str(&format!("\n  {}: {}", field, m));
                }
            }
            out
        }
        ClientError::Unreachable(_) => format!(
            "{}\nCheck your connection and the server URL (see 'expensectl context current').",
            err
        ),
        ClientError::Timeout(_) => format!("{}\nThe server is slow to respond; try again.", err),
        other => other.to_string(),
    }
}
