//! Downstream API handlers sitting behind the broker.
//!
//! A capability never sees a bearer token or a client id it could pick itself:
//! the registry validates the token and hands over the resulting
//! [`SubjectContext`], which carries the upstream access token of exactly that
//! subject.

pub mod profile;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{event, Level};

use crate::core::models::SubjectContext;
use crate::core::types::BearerToken;
use crate::provider::error::Error;
use crate::provider::TokenBroker;

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize)]
pub struct Operation {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("unknown capability {0}")]
    UnknownCapability(String),
    #[error("unknown operation {0}")]
    UnknownOperation(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Unauthorized(#[from] Error),
    #[error("operation failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    fn list_operations(&self) -> Vec<Operation>;

    async fn invoke(
        &self,
        operation: &str,
        args: serde_json::Value,
        subject: &SubjectContext,
    ) -> Result<serde_json::Value, CapabilityError>;
}

pub struct CapabilityRegistry {
    broker: Arc<TokenBroker>,
    capabilities: HashMap<&'static str, Arc<dyn Capability>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.capabilities.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &names)
            .finish_non_exhaustive()
    }
}

impl CapabilityRegistry {
    pub fn new(broker: Arc<TokenBroker>) -> Self {
        Self {
            broker,
            capabilities: HashMap::new(),
        }
    }

    /// Adds a capability, replacing any previous one with the same name.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities.insert(capability.name(), capability);
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = self.capabilities.keys().copied().collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn list(&self, capability: &str) -> Result<Vec<Operation>, CapabilityError> {
        self.capabilities
            .get(capability)
            .map(|c| c.list_operations())
            .ok_or_else(|| CapabilityError::UnknownCapability(capability.to_string()))
    }

    /// Validates `token` and runs `operation` on behalf of its subject.
    #[tracing::instrument(skip(self, token, args))]
    pub async fn invoke(
        &self,
        token: &BearerToken,
        capability: &str,
        operation: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        let handler = self
            .capabilities
            .get(capability)
            .ok_or_else(|| CapabilityError::UnknownCapability(capability.to_string()))?;

        let subject = self.broker.validate(token).await?;

        if !handler
            .list_operations()
            .iter()
            .any(|op| op.name == operation)
        {
            return Err(CapabilityError::UnknownOperation(operation.to_string()));
        }

        event!(Level::DEBUG, subject_id = %subject.subject_id, "Invoking capability");
        handler.invoke(operation, args, &subject).await
    }
}
