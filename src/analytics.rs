//! Sales analytics computed client-side from the decoded order list.
//!
//! The panel fetches the Orders sheet once and derives every chart from that
//! snapshot, so all of these are pure functions over `&[Order]`. Months are
//! keyed `YYYY-MM` from the order date prefix; rows with unparseable dates
//! land in an empty-key bucket instead of being dropped.

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use crate::models::{Order, OrderStatus, PaymentMethod};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthlySales {
    pub orders: u64,
    pub revenue: f64,
}

fn month_key(date: &str) -> String {
    date.get(..7).unwrap_or("").to_string()
}

/// Order count and revenue per month, sorted chronologically.
pub fn sales_by_month(orders: &[Order]) -> BTreeMap<String, MonthlySales> {
    let mut months: BTreeMap<String, MonthlySales> = BTreeMap::new();
    for order in orders {
        let entry = months.entry(month_key(&order.order_date)).or_default();
        entry.orders += 1;
        entry.revenue += order.total_amount;
    }
    months
}

pub fn status_breakdown(orders: &[Order]) -> HashMap<OrderStatus, u64> {
    let mut counts = HashMap::new();
    for order in orders {
        *counts.entry(order.status).or_insert(0) += 1;
    }
    counts
}

pub fn payment_method_breakdown(orders: &[Order]) -> HashMap<PaymentMethod, u64> {
    let mut counts = HashMap::new();
    for order in orders {
        *counts.entry(order.payment_method).or_insert(0) += 1;
    }
    counts
}

/// Unit volume per product name, summed across order line items.
pub fn units_by_product(orders: &[Order]) -> BTreeMap<String, u64> {
    let mut units = BTreeMap::new();
    for order in orders {
        for item in &order.items {
            *units.entry(item.product.clone()).or_insert(0) += item.quantity as u64;
        }
    }
    units
}

/// Revenue per recipient city, skipping orders where the city was never
/// looked up.
pub fn revenue_by_city(orders: &[Order]) -> BTreeMap<String, f64> {
    let mut revenue = BTreeMap::new();
    for order in orders {
        let Some(city) = order.main_city.as_deref().filter(|c| !c.trim().is_empty()) else {
            continue;
        };
        *revenue.entry(city.trim().to_string()).or_insert(0.0) += order.total_amount;
    }
    revenue
}

/// Cash-on-delivery orders whose payment has not been reconciled yet: the
/// money the courier still owes the seller.
pub fn cod_outstanding(orders: &[Order]) -> (u64, f64) {
    let mut count = 0;
    let mut amount = 0.0;
    for order in orders {
        if order.payment_method == PaymentMethod::Cod && !order.payment_received {
            count += 1;
            amount += order.total_amount;
        }
    }
    (count, amount)
}

/// One JSON blob with every dashboard series, shaped for direct rendering.
pub fn dashboard_report(orders: &[Order]) -> Value {
    let months: Vec<Value> = sales_by_month(orders)
        .iter()
        .map(|(month, sales)| {
            json!({ "month": month, "orders": sales.orders, "revenue": sales.revenue })
        })
        .collect();
    let statuses: HashMap<&str, u64> = status_breakdown(orders)
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();
    let methods: HashMap<&str, u64> = payment_method_breakdown(orders)
        .into_iter()
        .map(|(method, count)| (method.as_str(), count))
        .collect();
    let (cod_count, cod_amount) = cod_outstanding(orders);

    json!({
        "success": true,
        "totalOrders": orders.len(),
        "totalRevenue": orders.iter().map(|o| o.total_amount).sum::<f64>(),
        "monthly": months,
        "byStatus": statuses,
        "byPaymentMethod": methods,
        "unitsByProduct": units_by_product(orders),
        "revenueByCity": revenue_by_city(orders),
        "codOutstanding": { "orders": cod_count, "amount": cod_amount },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItem;

    fn order(date: &str, amount: f64, status: OrderStatus, method: PaymentMethod) -> Order {
        Order {
            tracking_id: format!("LK{date}"),
            order_date: date.to_string(),
            total_amount: amount,
            status,
            payment_method: method,
            ..Order::default()
        }
    }

    #[test]
    fn monthly_series_is_sorted_and_summed() {
        let orders = vec![
            order("2025-06-02", 2900.0, OrderStatus::Delivered, PaymentMethod::Cod),
            order("2025-05-28", 1450.0, OrderStatus::Delivered, PaymentMethod::Cod),
            order("2025-06-15", 1450.0, OrderStatus::Preparing, PaymentMethod::BankTransfer),
        ];
        let months = sales_by_month(&orders);
        let keys: Vec<&String> = months.keys().collect();
        assert_eq!(keys, ["2025-05", "2025-06"]);
        assert_eq!(months["2025-06"].orders, 2);
        assert_eq!(months["2025-06"].revenue, 4350.0);
    }

    #[test]
    fn bad_dates_bucket_under_empty_key() {
        let orders = vec![order("??", 100.0, OrderStatus::Preparing, PaymentMethod::Cod)];
        let months = sales_by_month(&orders);
        assert_eq!(months[""].orders, 1);
    }

    #[test]
    fn cod_outstanding_excludes_paid_and_bank_transfer() {
        let mut paid = order("2025-06-01", 1450.0, OrderStatus::Delivered, PaymentMethod::Cod);
        paid.payment_received = true;
        let owed = order("2025-06-02", 2900.0, OrderStatus::Delivered, PaymentMethod::Cod);
        let bank = order(
            "2025-06-03",
            5000.0,
            OrderStatus::Delivered,
            PaymentMethod::BankTransfer,
        );
        let (count, amount) = cod_outstanding(&[paid, owed, bank]);
        assert_eq!(count, 1);
        assert_eq!(amount, 2900.0);
    }

    #[test]
    fn units_sum_across_orders() {
        let mut a = order("2025-06-01", 0.0, OrderStatus::Preparing, PaymentMethod::Cod);
        a.items = vec![
            OrderItem { product: "Oil".into(), quantity: 2, unit_price: 1450.0 },
            OrderItem { product: "Serum".into(), quantity: 1, unit_price: 2400.0 },
        ];
        let mut b = order("2025-06-02", 0.0, OrderStatus::Preparing, PaymentMethod::Cod);
        b.items = vec![OrderItem { product: "Oil".into(), quantity: 3, unit_price: 1450.0 }];
        let units = units_by_product(&[a, b]);
        assert_eq!(units["Oil"], 5);
        assert_eq!(units["Serum"], 1);
    }

    #[test]
    fn dashboard_report_carries_every_series() {
        let orders = vec![order(
            "2025-06-01",
            1450.0,
            OrderStatus::Delivered,
            PaymentMethod::Cod,
        )];
        let report = dashboard_report(&orders);
        assert_eq!(report["success"], true);
        assert_eq!(report["totalOrders"], 1);
        assert_eq!(report["byStatus"]["Delivered"], 1);
        assert_eq!(report["codOutstanding"]["orders"], 1);
    }
}
