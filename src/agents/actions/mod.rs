//! Action-group handlers
//!
//! An agent calls an action group with an [`ActionEvent`]. The router picks
//! the handler registered under the event's `actionGroup`, runs it and wraps
//! the result in the envelope the agent expects: the API envelope when the
//! event names an `apiPath`, the function envelope otherwise.

pub mod customer_service;
pub mod insurance_claims;
pub mod restaurant_booking;

use crate::models::agent::{
    APPLICATION_JSON, ActionEvent, ActionResponse, ActionResponseEnvelope, ApiActionResponse,
    FunctionActionResponse, FunctionResponse, ResponseBodyText, TEXT_BODY,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_MESSAGE_VERSION: &str = "1.0";

/// Handles every call made to one action group
#[async_trait]
pub trait ActionGroupHandler: Send + Sync {
    /// Action group name as configured on the agent
    fn name(&self) -> &str;

    /// Run the operation named by `event` and return the response body.
    /// `None` means the operation is not known to this handler.
    async fn handle(&self, event: &ActionEvent) -> Option<Value>;
}

/// Routes events to their action-group handler
#[derive(Default, Clone)]
pub struct ActionRouter {
    handlers: HashMap<String, Arc<dyn ActionGroupHandler>>,
}

impl ActionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Arc<dyn ActionGroupHandler>) -> Self {
        self.handlers.insert(handler.name().to_string(), handler);
        self
    }

    /// Router with the bundled claims, booking and shoe-store handlers
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Arc::new(insurance_claims::InsuranceClaims))
            .register(Arc::new(restaurant_booking::RestaurantBooking::in_memory()))
            .register(Arc::new(customer_service::CustomerService::in_memory()))
    }

    /// Registered group names, sorted
    pub fn groups(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn dispatch(&self, event: &ActionEvent) -> ActionResponseEnvelope {
        let operation = operation_name(event);
        info!("Action {}::{}", event.action_group, operation);

        let body = match self.handlers.get(&event.action_group) {
            Some(handler) => handler.handle(event).await,
            None => None,
        };
        let body = body.unwrap_or_else(|| {
            warn!("No handler for {}::{}", event.action_group, operation);
            Value::String(format!(
                "{}::{} is not a valid api, try another one.",
                event.action_group, operation
            ))
        });

        envelope(event, body_text(&body))
    }
}

fn operation_name(event: &ActionEvent) -> &str {
    event
        .api_path
        .as_deref()
        .or(event.function.as_deref())
        .unwrap_or_default()
}

fn body_text(body: &Value) -> String {
    match body {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn envelope(event: &ActionEvent, body: String) -> ActionResponseEnvelope {
    let response = match &event.api_path {
        Some(api_path) => ActionResponse::Api(ApiActionResponse {
            action_group: event.action_group.clone(),
            api_path: api_path.clone(),
            http_method: event.http_method.clone().unwrap_or_default(),
            http_status_code: 200,
            response_body: HashMap::from([(
                APPLICATION_JSON.to_string(),
                ResponseBodyText { body },
            )]),
        }),
        None => ActionResponse::Function(FunctionActionResponse {
            action_group: event.action_group.clone(),
            function: event.function.clone().unwrap_or_default(),
            function_response: FunctionResponse {
                response_body: HashMap::from([(TEXT_BODY.to_string(), ResponseBodyText { body })]),
            },
        }),
    };

    ActionResponseEnvelope {
        message_version: event
            .message_version
            .clone()
            .unwrap_or_else(|| DEFAULT_MESSAGE_VERSION.to_string()),
        response,
        session_attributes: event.session_attributes.clone(),
    }
}

#[cfg(test)]
pub(crate) fn api_event(group: &str, path: &str, method: &str) -> ActionEvent {
    ActionEvent {
        message_version: Some("1.0".to_string()),
        action_group: group.to_string(),
        api_path: Some(path.to_string()),
        http_method: Some(method.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
pub(crate) fn function_event(group: &str, function: &str) -> ActionEvent {
    ActionEvent::function_call(group, function, Vec::new())
}
