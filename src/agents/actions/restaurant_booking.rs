//! Table-booking action group (function-details schema)

use super::ActionGroupHandler;
use crate::agents::tools::{ToolDescription, ToolParameter};
use crate::models::agent::ActionEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

pub const ACTION_GROUP: &str = "TableBookingsActionGroup";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: String,
    pub date: String,
    #[serde(default)]
    pub name: String,
    pub hour: String,
    pub num_guests: String,
}

/// Persistence for bookings
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn get(&self, booking_id: &str) -> Option<Booking>;
    async fn put(&self, booking: Booking);
    /// Returns whether a booking was removed
    async fn delete(&self, booking_id: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<String, Booking>>,
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn get(&self, booking_id: &str) -> Option<Booking> {
        self.bookings.read().await.get(booking_id).cloned()
    }

    async fn put(&self, booking: Booking) {
        self.bookings
            .write()
            .await
            .insert(booking.booking_id.clone(), booking);
    }

    async fn delete(&self, booking_id: &str) -> bool {
        self.bookings.write().await.remove(booking_id).is_some()
    }
}

pub struct RestaurantBooking {
    store: Arc<dyn BookingStore>,
}

fn non_empty<'a>(event: &'a ActionEvent, name: &str) -> Option<&'a str> {
    event.parameter(name).filter(|value| !value.is_empty())
}

impl RestaurantBooking {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBookingStore::default()))
    }

    async fn booking_details(&self, booking_id: &str) -> Value {
        match self.store.get(booking_id).await {
            Some(booking) => json!(booking),
            None => json!({"message": format!("No booking found with ID {booking_id}")}),
        }
    }

    async fn create_booking(&self, date: &str, name: &str, hour: &str, num_guests: &str) -> Value {
        let booking_id: String = Uuid::new_v4().to_string().chars().take(8).collect();
        self.store
            .put(Booking {
                booking_id: booking_id.clone(),
                date: date.to_string(),
                name: name.to_string(),
                hour: hour.to_string(),
                num_guests: num_guests.to_string(),
            })
            .await;
        info!("Created booking {} for {} at {} {}", booking_id, num_guests, date, hour);
        json!({"booking_id": booking_id})
    }

    async fn delete_booking(&self, booking_id: &str) -> Value {
        let message = if self.store.delete(booking_id).await {
            format!("Booking with ID {booking_id} deleted successfully")
        } else {
            format!("Failed to delete booking with ID {booking_id}")
        };
        json!({"message": message})
    }
}

#[async_trait]
impl ActionGroupHandler for RestaurantBooking {
    fn name(&self) -> &str {
        ACTION_GROUP
    }

    async fn handle(&self, event: &ActionEvent) -> Option<Value> {
        let missing_id = || Value::String("Missing booking_id parameter".to_string());

        let body = match event.function.as_deref()? {
            "get_booking_details" => match non_empty(event, "booking_id") {
                Some(id) => self.booking_details(id).await,
                None => missing_id(),
            },
            "create_booking" => {
                let required = (
                    non_empty(event, "date"),
                    non_empty(event, "hour"),
                    non_empty(event, "num_guests"),
                );
                match required {
                    (Some(date), Some(hour), Some(guests)) => {
                        let name = event.parameter("name").unwrap_or_default();
                        self.create_booking(date, name, hour, guests).await
                    }
                    _ => Value::String("Missing required parameters".to_string()),
                }
            }
            "delete_booking" => match non_empty(event, "booking_id") {
                Some(id) => self.delete_booking(id).await,
                None => missing_id(),
            },
            _ => return None,
        };
        Some(body)
    }
}

/// The three booking functions described for prompt-based tool use
pub fn tool_descriptions() -> Vec<ToolDescription> {
    let booking_id = || ToolParameter::new("booking_id", "string", "The ID of the booking");
    vec![
        ToolDescription {
            name: "get_booking_details".to_string(),
            description: "Get the details of a restaurant booking".to_string(),
            parameters: vec![booking_id()],
        },
        ToolDescription {
            name: "create_booking".to_string(),
            description: "Create a new restaurant booking and return its ID".to_string(),
            parameters: vec![
                ToolParameter::new("date", "string", "Date of the booking, YYYY-MM-DD"),
                ToolParameter::new("name", "string", "Name to hold the reservation under"),
                ToolParameter::new("hour", "string", "Time of the booking, HH:MM"),
                ToolParameter::new("num_guests", "string", "Number of guests"),
            ],
        },
        ToolDescription {
            name: "delete_booking".to_string(),
            description: "Delete an existing restaurant booking".to_string(),
            parameters: vec![booking_id()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::actions::{ActionRouter, function_event};
    use crate::models::agent::ActionParameter;

    fn event(function: &str, params: &[(&str, &str)]) -> ActionEvent {
        let mut event = function_event(ACTION_GROUP, function);
        event.parameters = params
            .iter()
            .map(|(name, value)| ActionParameter::new(*name, *value))
            .collect();
        event
    }

    #[tokio::test]
    async fn test_booking_lifecycle() {
        let router = ActionRouter::new().register(Arc::new(RestaurantBooking::in_memory()));

        let created = router
            .dispatch(&event(
                "create_booking",
                &[("date", "2024-11-02"), ("name", "Ana"), ("hour", "19:30"), ("num_guests", "4")],
            ))
            .await
            .body_json()
            .unwrap();
        let id = created["booking_id"].as_str().unwrap().to_string();
        assert_eq!(id.len(), 8);

        let details = router
            .dispatch(&event("get_booking_details", &[("booking_id", id.as_str())]))
            .await
            .body_json()
            .unwrap();
        assert_eq!(details["name"], "Ana");
        assert_eq!(details["num_guests"], "4");

        let deleted = router
            .dispatch(&event("delete_booking", &[("booking_id", id.as_str())]))
            .await
            .body_json()
            .unwrap();
        assert_eq!(
            deleted["message"],
            format!("Booking with ID {id} deleted successfully")
        );

        let gone = router
            .dispatch(&event("get_booking_details", &[("booking_id", id.as_str())]))
            .await
            .body_json()
            .unwrap();
        assert_eq!(gone["message"], format!("No booking found with ID {id}"));
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let router = ActionRouter::new().register(Arc::new(RestaurantBooking::in_memory()));

        let envelope = router
            .dispatch(&event("create_booking", &[("date", "2024-11-02"), ("hour", "19:30")]))
            .await;
        assert_eq!(envelope.body(), Some("Missing required parameters"));

        let envelope = router.dispatch(&event("delete_booking", &[])).await;
        assert_eq!(envelope.body(), Some("Missing booking_id parameter"));
    }

    #[tokio::test]
    async fn test_unknown_function() {
        let router = ActionRouter::new().register(Arc::new(RestaurantBooking::in_memory()));
        let envelope = router.dispatch(&event("update_booking", &[])).await;
        assert_eq!(
            envelope.body(),
            Some("TableBookingsActionGroup::update_booking is not a valid api, try another one.")
        );
    }
}
