//! Claims-management action group with canned claim data

use super::ActionGroupHandler;
use crate::models::agent::ActionEvent;
use async_trait::async_trait;
use serde_json::{Value, json};

pub const ACTION_GROUP: &str = "ClaimManagementActionGroup";

const NOTIFY_TRACKING_ID: &str = "50e8400-e29b-41d4-a716-446655440000";

pub struct InsuranceClaims;

fn open_claims() -> Value {
    json!({
        "response": [
            {"claimId": "claim-006", "policyHolderId": "A945684", "claimStatus": "Open"},
            {"claimId": "claim-857", "policyHolderId": "A645987", "claimStatus": "Open"},
            {"claimId": "claim-334", "policyHolderId": "A987654", "claimStatus": "Open"}
        ]
    })
}

fn outstanding_paperwork(claim_id: Option<&str>) -> Value {
    let documents = match claim_id {
        Some("claim-857") => json!(["DriverLicense, VehicleRegistration"]),
        Some("claim-006") => json!(["AccidentImages"]),
        _ => json!(""),
    };
    json!({"response": {"pendingDocuments": documents}})
}

fn claim_detail(claim_id: Option<&str>) -> Value {
    let (created, last_activity, status, policy) = match claim_id {
        Some("claim-857") => ("21-Jul-2023", "25-Jul-2023", "Open", "Vehicle"),
        Some("claim-006") => ("20-May-2023", "23-Jul-2023", "Open", "Vehicle"),
        Some("claim-999") => ("10-Jan-2023", "31-Feb-2023", "Completed", "Disability"),
        _ => ("18-Apr-2023", "20-Apr-2023", "Open", "Vehicle"),
    };
    json!({
        "response": {
            "claimId": claim_id,
            "createdDate": created,
            "lastActivityDate": last_activity,
            "status": status,
            "policyType": policy
        }
    })
}

fn notify(claim_id: Option<&str>, pending_documents: Option<&str>) -> Value {
    json!({
        "response": {
            "ClaimId": claim_id,
            "PendingDocuments": pending_documents,
            "TrackingId": NOTIFY_TRACKING_ID,
            "Status": "InProgress"
        }
    })
}

#[async_trait]
impl ActionGroupHandler for InsuranceClaims {
    fn name(&self) -> &str {
        ACTION_GROUP
    }

    async fn handle(&self, event: &ActionEvent) -> Option<Value> {
        let body = match event.api_path.as_deref()? {
            "/open-items" => open_claims(),
            "/open-items/{claimId}/outstanding-paperwork" => {
                outstanding_paperwork(event.parameter("claimId"))
            }
            "/open-items/{claimId}/detail" => claim_detail(event.parameter("claimId")),
            "/notify" => notify(event.property("claimId"), event.property("pendingDocuments")),
            _ => return None,
        };
        Some(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::actions::{ActionRouter, api_event};
    use crate::models::agent::{APPLICATION_JSON, ActionParameter, RequestBody, RequestBodyContent};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn router() -> ActionRouter {
        ActionRouter::new().register(Arc::new(InsuranceClaims))
    }

    #[tokio::test]
    async fn test_open_items() {
        let envelope = router().dispatch(&api_event(ACTION_GROUP, "/open-items", "GET")).await;
        let body = envelope.body_json().unwrap();
        let claims = body["response"].as_array().unwrap();
        assert_eq!(claims.len(), 3);
        assert_eq!(claims[0]["claimId"], "claim-006");
        assert!(claims.iter().all(|claim| claim["claimStatus"] == "Open"));
    }

    #[tokio::test]
    async fn test_outstanding_paperwork() {
        let mut event = api_event(ACTION_GROUP, "/open-items/{claimId}/outstanding-paperwork", "GET");
        event.parameters = vec![ActionParameter::new("claimId", "claim-006")];
        let body = router().dispatch(&event).await.body_json().unwrap();
        assert_eq!(body["response"]["pendingDocuments"], json!(["AccidentImages"]));

        event.parameters = vec![ActionParameter::new("claimId", "claim-123")];
        let body = router().dispatch(&event).await.body_json().unwrap();
        assert_eq!(body["response"]["pendingDocuments"], "");
    }

    #[tokio::test]
    async fn test_claim_detail() {
        let mut event = api_event(ACTION_GROUP, "/open-items/{claimId}/detail", "GET");
        event.parameters = vec![ActionParameter::new("claimId", "claim-999")];
        let body = router().dispatch(&event).await.body_json().unwrap();
        assert_eq!(body["response"]["status"], "Completed");
        assert_eq!(body["response"]["policyType"], "Disability");

        event.parameters = vec![ActionParameter::new("claimId", "claim-412")];
        let body = router().dispatch(&event).await.body_json().unwrap();
        assert_eq!(body["response"]["claimId"], "claim-412");
        assert_eq!(body["response"]["createdDate"], "18-Apr-2023");
    }

    #[tokio::test]
    async fn test_notify_reads_body_properties() {
        let mut event = api_event(ACTION_GROUP, "/notify", "POST");
        event.request_body = Some(RequestBody {
            content: HashMap::from([(
                APPLICATION_JSON.to_string(),
                RequestBodyContent {
                    properties: vec![
                        ActionParameter::new("claimId", "claim-857"),
                        ActionParameter::new("pendingDocuments", "DriverLicense"),
                    ],
                },
            )]),
        });

        let body = router().dispatch(&event).await.body_json().unwrap();
        assert_eq!(body["response"]["ClaimId"], "claim-857");
        assert_eq!(body["response"]["PendingDocuments"], "DriverLicense");
        assert_eq!(body["response"]["TrackingId"], NOTIFY_TRACKING_ID);
        assert_eq!(body["response"]["Status"], "InProgress");
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let envelope = router().dispatch(&api_event(ACTION_GROUP, "/close", "POST")).await;
        assert_eq!(
            envelope.body(),
            Some("ClaimManagementActionGroup::/close is not a valid api, try another one.")
        );
    }
}
