use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::action::{ActionName, TargetRef};
use crate::domain::run::{Actor, IdempotencyKey};
use crate::errors::OperationError;

#[derive(Clone, Debug, PartialEq)]
pub struct InvocationRequest {
    pub action: ActionName,
    pub target: TargetRef,
    pub arguments: Map<String, Value>,
    pub idempotency_key: IdempotencyKey,
    pub attempt: u32,
    pub actor: Actor,
}

/// A backend operation an action resolves to.
#[async_trait]
pub trait TargetOperation: Send + Sync {
    async fn invoke(&self, request: InvocationRequest) -> Result<Value, OperationError>;

    /// Argument names the operation accepts, checked against action mappings at startup.
    fn expected_arguments(&self) -> Option<Vec<String>> {
        None
    }

    /// Whether repeating a call with the same idempotency key is safe.
    fn supports_idempotency(&self) -> bool {
        false
    }
}

#[derive(Clone, Default)]
pub struct OperationCatalog {
    operations: HashMap<TargetRef, Arc<dyn TargetOperation>>,
}

impl OperationCatalog {
    pub fn register<T>(&mut self, target: &str, operation: T)
    where
        T: TargetOperation + 'static,
    {
        self.operations.insert(TargetRef::parse(target), Arc::new(operation));
    }

    pub fn register_shared(&mut self, target: &str, operation: Arc<dyn TargetOperation>) {
        self.operations.insert(TargetRef::parse(target), operation);
    }

    pub fn get(&self, target: &TargetRef) -> Option<Arc<dyn TargetOperation>> {
        self.operations.get(target).cloned()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
