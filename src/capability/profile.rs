use async_trait::async_trait;
use serde_json::json;

use crate::core::models::SubjectContext;

use super::{Capability, CapabilityError, Operation};

/// Reports who the presented bearer token belongs to.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileCapability;

#[async_trait]
impl Capability for ProfileCapability {
    fn name(&self) -> &'static str {
        "profile"
    }

    fn list_operations(&self) -> Vec<Operation> {
        vec![Operation {
            name: "whoami",
            description: "Subject id, email and display name of the authenticated user",
        }]
    }

    async fn invoke(
        &self,
        operation: &str,
        _args: serde_json::Value,
        subject: &SubjectContext,
    ) -> Result<serde_json::Value, CapabilityError> {
        match operation {
            "whoami" => Ok(json!({
                "subject_id": subject.subject_id,
                "client_id": subject.client_id,
                "email": subject.email,
                "display_name": subject.display_name,
            })),
            other => Err(CapabilityError::UnknownOperation(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ClientId, SubjectId};

    fn subject() -> SubjectContext {
        SubjectContext {
            subject_id: SubjectId("u-1".into()),
            client_id: ClientId("dcr_abc".into()),
            email: Some("alice@contoso.com".into()),
            display_name: Some("Alice".into()),
            upstream_access_token: "upstream-at".into(),
        }
    }

    #[tokio::test]
    async fn whoami_reports_subject_without_upstream_token() {
        let out = ProfileCapability
            .invoke("whoami", serde_json::Value::Null, &subject())
            .await
            .unwrap();
        assert_eq!(out["subject_id"], "u-1");
        assert_eq!(out["email"], "alice@contoso.com");
        assert!(!out.to_string().contains("upstream-at"));
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected() {
        let err = ProfileCapability
            .invoke("send_mail", serde_json::Value::Null, &subject())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::UnknownOperation(op) if op == "send_mail"));
    }
}
