use chrono::Utc;
use salesproc_models::core::{CreateSale, UpdateSale};

fn sale(product_id: &str, product_name: &str, quantity: i64, price: f64, customer_id: &str, customer_name: &str) -> CreateSale {
    CreateSale {
        product_id: product_id.into(),
        product_name: product_name.into(),
        quantity,
        price,
        customer_id: customer_id.into(),
        customer_name: customer_name.into(),
        timestamp: Some(Utc::now()),
    }
}

pub fn mock_sales() -> Vec<CreateSale> {
    vec![
        sale("PROD-001", "MacBook Pro 16\"", 1, 2499.99, "CUST-001", "Alice Johnson"),
        sale("PROD-002", "iPhone 15 Pro", 2, 999.99, "CUST-002", "Bob Smith"),
        sale("PROD-003", "AirPods Pro", 3, 249.99, "CUST-003", "Charlie Brown"),
    ]
}

pub fn mock_updates() -> Vec<UpdateSale> {
    let mut refurbished = UpdateSale::new(1);
    refurbished.quantity = Some(2);
    refurbished.price = Some(2299.99);
    refurbished.product_name = Some("MacBook Pro 16\" (Refurbished)".into());

    let mut restock = UpdateSale::new(2);
    restock.quantity = Some(5);

    let mut rename = UpdateSale::new(3);
    rename.customer_name = Some("Charlie Brown Jr.".into());
    rename.price = Some(199.99);

    vec![refurbished, restock, rename]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_are_well_formed() {
        let sales = mock_sales();
        assert_eq!(sales.len(), 3);
        assert!(sales.iter().all(|sale| sale.timestamp.is_some()));

        let updates = mock_updates();
        assert_eq!(
            updates.iter().map(|update| update.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            serde_json::to_value(&updates[1]).unwrap(),
            serde_json::json!({ "id": 2, "quantity": 5 })
        );
    }
}
