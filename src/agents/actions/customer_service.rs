//! Shoe-store customer-service action group
//!
//! Customers, inventory and orders live behind [`ShoeStore`]. The in-memory
//! store is seeded from a JSON document shaped like [`ShoeStoreSeed`].

use super::ActionGroupHandler;
use crate::models::agent::ActionEvent;
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const ACTION_GROUP: &str = "CustomerServiceActionGroup";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "customerId")]
    pub customer_id: i64,
    #[serde(rename = "customerName")]
    pub customer_name: String,
    #[serde(rename = "Addr1", default)]
    pub addr1: String,
    #[serde(rename = "Addr2", default)]
    pub addr2: String,
    #[serde(rename = "City", default)]
    pub city: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Zipcode", default)]
    pub zipcode: String,
    #[serde(rename = "PreferredActivity", default)]
    pub preferred_activity: String,
    #[serde(rename = "ShoeSize", default)]
    pub shoe_size: String,
    #[serde(rename = "OtherInfo", default)]
    pub other_info: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Shoe {
    #[serde(rename = "ShoeID")]
    pub shoe_id: i64,
    pub best_fit_activity: String,
    pub style_desc: String,
    pub shoe_colors: String,
    pub price: String,
    pub inv_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "orderdate")]
    pub order_date: String,
    #[serde(rename = "shoeId")]
    pub shoe_id: i64,
    #[serde(rename = "CustomerId")]
    pub customer_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoeStoreSeed {
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub inventory: Vec<Shoe>,
    #[serde(default)]
    pub orders: Vec<Order>,
}

const DEFAULT_SEED: &str = r#"{
  "customers": [
    {"customerId": 1, "customerName": "John Doe", "Addr1": "123 Main St", "Addr2": "",
     "City": "Seattle", "State": "WA", "Zipcode": "98101", "PreferredActivity": "Running",
     "ShoeSize": "10", "OtherInfo": "Prefers wide fit"},
    {"customerId": 2, "customerName": "Jane Smith", "Addr1": "456 Pine Ave", "Addr2": "Apt 2",
     "City": "Portland", "State": "OR", "Zipcode": "97201", "PreferredActivity": "Hiking",
     "ShoeSize": "8", "OtherInfo": ""}
  ],
  "inventory": [
    {"ShoeID": 1, "BestFitActivity": "Running", "StyleDesc": "Lightweight road runner",
     "ShoeColors": "Blue/White", "Price": "$120.00", "InvCount": 12},
    {"ShoeID": 2, "BestFitActivity": "Hiking", "StyleDesc": "Waterproof trail boot",
     "ShoeColors": "Brown", "Price": "$150.00", "InvCount": 5},
    {"ShoeID": 3, "BestFitActivity": "Walking", "StyleDesc": "Cushioned everyday walker",
     "ShoeColors": "Black/Grey", "Price": "$95.00", "InvCount": 20}
  ]
}"#;

#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Placed(Order),
    UnknownShoe,
    OutOfStock,
}

/// Customer, inventory and order storage
#[async_trait]
pub trait ShoeStore: Send + Sync {
    /// First customer whose name contains `name`, ignoring ASCII case
    async fn find_customer(&self, name: &str) -> Option<Customer>;
    async fn inventory(&self) -> Vec<Shoe>;
    /// Take one pair of `shoe_id` off the shelf and record the order
    async fn place_order(&self, shoe_id: i64, customer_id: i64) -> OrderOutcome;
}

#[derive(Debug, Default)]
pub struct InMemoryShoeStore {
    data: RwLock<ShoeStoreSeed>,
}

impl InMemoryShoeStore {
    pub fn new(seed: ShoeStoreSeed) -> Self {
        Self {
            data: RwLock::new(seed),
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_json(&content)?)
    }
}

#[async_trait]
impl ShoeStore for InMemoryShoeStore {
    async fn find_customer(&self, name: &str) -> Option<Customer> {
        let needle = name.to_ascii_lowercase();
        self.data
            .read()
            .await
            .customers
            .iter()
            .find(|customer| customer.customer_name.to_ascii_lowercase().contains(&needle))
            .cloned()
    }

    async fn inventory(&self) -> Vec<Shoe> {
        self.data.read().await.inventory.clone()
    }

    async fn place_order(&self, shoe_id: i64, customer_id: i64) -> OrderOutcome {
        let mut data = self.data.write().await;
        let Some(shoe) = data.inventory.iter_mut().find(|shoe| shoe.shoe_id == shoe_id) else {
            return OrderOutcome::UnknownShoe;
        };
        if shoe.inv_count <= 0 {
            return OrderOutcome::OutOfStock;
        }
        shoe.inv_count -= 1;

        let order = Order {
            order_date: Local::now().format("%Y-%m-%d").to_string(),
            shoe_id,
            customer_id,
        };
        data.orders.push(order.clone());
        OrderOutcome::Placed(order)
    }
}

pub struct CustomerService {
    store: Arc<dyn ShoeStore>,
}

fn parse_id(event: &ActionEvent, name: &str) -> Option<i64> {
    event.parameter(name)?.trim().parse().ok()
}

impl CustomerService {
    pub fn new(store: Arc<dyn ShoeStore>) -> Self {
        Self { store }
    }

    /// Handler over the built-in sample store
    pub fn in_memory() -> Self {
        let store = InMemoryShoeStore::from_json(DEFAULT_SEED).unwrap_or_default();
        Self::new(Arc::new(store))
    }

    async fn customer(&self, event: &ActionEvent) -> Value {
        let name = event.parameter("CustomerName").unwrap_or_default();
        match self.store.find_customer(name).await {
            Some(customer) => {
                info!("Customer info retrieved for {}", customer.customer_name);
                json!(customer)
            }
            None => json!({"message": format!("No customer found matching {name}")}),
        }
    }

    async fn place_order(&self, event: &ActionEvent) -> Value {
        let (Some(shoe_id), Some(customer_id)) =
            (parse_id(event, "ShoeID"), parse_id(event, "CustomerID"))
        else {
            return Value::String("Missing ShoeID or CustomerID parameter".to_string());
        };

        match self.store.place_order(shoe_id, customer_id).await {
            OrderOutcome::Placed(order) => {
                info!("Shoe order placed: shoe {} for customer {}", shoe_id, customer_id);
                json!({"message": "Order placed", "order": order})
            }
            OrderOutcome::UnknownShoe => {
                warn!("Order for unknown shoe {}", shoe_id);
                json!({"message": format!("No shoe found with ID {shoe_id}")})
            }
            OrderOutcome::OutOfStock => {
                json!({"message": format!("Shoe {shoe_id} is out of stock")})
            }
        }
    }
}

#[async_trait]
impl ActionGroupHandler for CustomerService {
    fn name(&self) -> &str {
        ACTION_GROUP
    }

    async fn handle(&self, event: &ActionEvent) -> Option<Value> {
        let body = match event.api_path.as_deref()? {
            "/customer/{CustomerName}" => self.customer(event).await,
            "/check_inventory" => json!(self.store.inventory().await),
            "/place_order" => self.place_order(event).await,
            _ => return None,
        };
        Some(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::actions::{ActionRouter, api_event};
    use crate::models::agent::ActionParameter;

    impl InMemoryShoeStore {
        async fn orders(&self) -> Vec<Order> {
            self.data.read().await.orders.clone()
        }
    }

    fn event(path: &str, params: &[(&str, &str)]) -> ActionEvent {
        let mut event = api_event(ACTION_GROUP, path, "GET");
        event.parameters = params
            .iter()
            .map(|(name, value)| ActionParameter::new(*name, *value))
            .collect();
        event
    }

    #[tokio::test]
    async fn test_customer_substring_match() {
        let router = ActionRouter::new().register(Arc::new(CustomerService::in_memory()));
        let body = router
            .dispatch(&event("/customer/{CustomerName}", &[("CustomerName", "Smith")]))
            .await
            .body_json()
            .unwrap();
        assert_eq!(body["customerId"], 2);
        assert_eq!(body["PreferredActivity"], "Hiking");
    }

    #[tokio::test]
    async fn test_customer_lookup_ignores_case() {
        let store = InMemoryShoeStore::from_json(DEFAULT_SEED).unwrap();
        let customer = store.find_customer("smith").await.unwrap();
        assert_eq!(customer.customer_name, "Jane Smith");
        assert_eq!(
            store.find_customer("JOHN").await.unwrap().customer_name,
            "John Doe"
        );
        assert!(store.find_customer("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_place_order_decrements_inventory() {
        let store = Arc::new(InMemoryShoeStore::from_json(DEFAULT_SEED).unwrap());
        let router = ActionRouter::new().register(Arc::new(CustomerService::new(store.clone())));

        let body = router
            .dispatch(&event("/place_order", &[("ShoeID", "2"), ("CustomerID", "1")]))
            .await
            .body_json()
            .unwrap();
        assert_eq!(body["message"], "Order placed");

        let inventory = router
            .dispatch(&event("/check_inventory", &[]))
            .await
            .body_json()
            .unwrap();
        assert_eq!(inventory[1]["InvCount"], 4);

        let orders = store.orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_date, Local::now().format("%Y-%m-%d").to_string());
    }

    #[tokio::test]
    async fn test_out_of_stock_and_unknown_shoe() {
        let seed = r#"{"inventory": [{"ShoeID": 7, "BestFitActivity": "Tennis",
            "StyleDesc": "Court shoe", "ShoeColors": "White", "Price": "$80.00", "InvCount": 0}]}"#;
        let store = InMemoryShoeStore::from_json(seed).unwrap();

        assert_eq!(store.place_order(7, 1).await, OrderOutcome::OutOfStock);
        assert_eq!(store.place_order(8, 1).await, OrderOutcome::UnknownShoe);
        assert!(store.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_seed_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, DEFAULT_SEED).unwrap();

        let store = InMemoryShoeStore::from_file(&path).await.unwrap();
        assert_eq!(store.inventory().await.len(), 3);
    }
}
