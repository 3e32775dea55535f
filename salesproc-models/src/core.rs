use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sale reported by an upstream publisher. Nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSale {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub price: f64,
    pub customer_id: String,
    pub customer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Partial change to a sale identified by `id` in some external system.
///
/// Every field other than `id` is optional; an absent field means "no change".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSale {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl UpdateSale {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            product_id: None,
            product_name: None,
            quantity: None,
            price: None,
            customer_id: None,
            customer_name: None,
            timestamp: None,
        }
    }

    /// True when the update carries no field besides `id`.
    pub fn is_empty(&self) -> bool {
        self.product_id.is_none()
            && self.product_name.is_none()
            && self.quantity.is_none()
            && self.price.is_none()
            && self.customer_id.is_none()
            && self.customer_name.is_none()
            && self.timestamp.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_sale_uses_camel_case_and_omits_missing_timestamp() {
        let input = json!({
            "productId": "PROD-001",
            "productName": "Laptop",
            "quantity": 2,
            "price": 999.99,
            "customerId": "CUST-123",
            "customerName": "John Doe"
        });

        let sale: CreateSale = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(sale.product_id, "PROD-001");
        assert!(sale.timestamp.is_none());
        assert_eq!(serde_json::to_value(&sale).unwrap(), input);
    }

    #[test]
    fn create_sale_requires_every_mandatory_field() {
        let missing_customer = json!({
            "productId": "PROD-001",
            "productName": "Laptop",
            "quantity": 2,
            "price": 999.99,
            "customerId": "CUST-123"
        });

        let err = serde_json::from_value::<CreateSale>(missing_customer).unwrap_err();
        assert!(err.to_string().contains("customerName"));
    }

    #[test]
    fn update_sale_only_requires_id() {
        let sale: UpdateSale = serde_json::from_value(json!({ "id": 7 })).unwrap();
        assert_eq!(sale, UpdateSale::new(7));
        assert!(sale.is_empty());
        assert_eq!(serde_json::to_value(&sale).unwrap(), json!({ "id": 7 }));

        assert!(serde_json::from_value::<UpdateSale>(json!({ "quantity": 3 })).is_err());
    }

    #[test]
    fn update_sale_keeps_only_supplied_fields() {
        let input = json!({ "id": 1, "quantity": 3, "price": 899.99 });
        let sale: UpdateSale = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(sale.quantity, Some(3));
        assert!(sale.product_name.is_none());
        assert!(!sale.is_empty());
        assert_eq!(serde_json::to_value(&sale).unwrap(), input);
    }
}
