//! Product cost records on the Products sheet.
//!
//! Orders reference products by name only; the price captured on an order
//! row at creation time is independent of later edits here. No cascade, no
//! foreign key: editing a product never touches existing orders.

use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::codec::{product_from_row, product_to_row};
use crate::models::Product;
use crate::sheets::{Sheet, SheetsClient};

fn err_value(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

pub async fn list(client: &SheetsClient) -> Result<Vec<Product>, String> {
    let rows = client.list(Sheet::Products).await.map_err(|e| e.to_string())?;
    Ok(rows.iter().map(|row| product_from_row(row)).collect())
}

fn find_by_id(products: &[Product], id: &str) -> Option<usize> {
    products.iter().position(|p| p.id == id.trim())
}

pub async fn add(client: &SheetsClient, name: &str, cost: f64, price: f64) -> Value {
    let name = name.trim();
    if name.is_empty() {
        return err_value("Missing product name");
    }
    let product = Product {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        cost,
        price,
        updated_at: crate::now_iso(),
    };
    match client.append(Sheet::Products, &product_to_row(&product)).await {
        Ok(()) => {
            info!(product = name, "product added");
            json!({ "success": true, "id": product.id })
        }
        Err(e) => err_value(e),
    }
}

pub async fn update(client: &SheetsClient, id: &str, name: &str, cost: f64, price: f64) -> Value {
    let products = match list(client).await {
        Ok(products) => products,
        Err(e) => return err_value(e),
    };
    let Some(index) = find_by_id(&products, id) else {
        return err_value(format!("Product '{id}' not found"));
    };

    let mut product = products[index].clone();
    if !name.trim().is_empty() {
        product.name = name.trim().to_string();
    }
    product.cost = cost;
    product.price = price;
    product.updated_at = crate::now_iso();

    match client
        .update_row(
            Sheet::Products,
            index + 2,
            Sheet::Products.last_column(),
            &product_to_row(&product),
        )
        .await
    {
        Ok(()) => json!({ "success": true }),
        Err(e) => err_value(e),
    }
}

pub async fn delete(client: &SheetsClient, id: &str) -> Value {
    let products = match list(client).await {
        Ok(products) => products,
        Err(e) => return err_value(e),
    };
    let Some(index) = find_by_id(&products, id) else {
        return err_value(format!("Product '{id}' not found"));
    };
    match client.delete_row(Sheet::Products, index + 1).await {
        Ok(()) => json!({ "success": true }),
        Err(e) => err_value(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_by_exact_id() {
        let products = vec![
            Product {
                id: "p-1".into(),
                name: "Oil".into(),
                cost: 800.0,
                price: 1450.0,
                updated_at: String::new(),
            },
            Product {
                id: "p-2".into(),
                name: "Serum".into(),
                cost: 1200.0,
                price: 2400.0,
                updated_at: String::new(),
            },
        ];
        assert_eq!(find_by_id(&products, "p-2"), Some(1));
        assert_eq!(find_by_id(&products, " p-1 "), Some(0));
        assert_eq!(find_by_id(&products, "p-9"), None);
    }
}
