//! Orchestration Type Registry
//!
//! Built once at startup and immutable afterwards. The worker captures a
//! clone when it starts and the client resolves names against the same
//! instance, so both always agree on the known type set.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::context::{ActivityContext, OrchestrationContext};
use crate::error::HubError;

/// Runnable orchestration definition
#[async_trait]
pub trait OrchestrationHandler: Send + Sync {
    async fn invoke(&self, ctx: OrchestrationContext, input: String) -> Result<String, String>;
}

/// Runnable activity definition
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    async fn invoke(&self, ctx: ActivityContext, input: String) -> Result<String, String>;
}

/// Function wrapper that implements `OrchestrationHandler`.
pub struct FnOrchestration<F>(pub F);

#[async_trait]
impl<F, Fut> OrchestrationHandler for FnOrchestration<F>
where
    F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, String>> + Send + 'static,
{
    async fn invoke(&self, ctx: OrchestrationContext, input: String) -> Result<String, String> {
        (self.0)(ctx, input).await
    }
}

/// Function wrapper that implements `ActivityHandler`.
pub struct FnActivity<F>(pub F);

#[async_trait]
impl<F, Fut> ActivityHandler for FnActivity<F>
where
    F: Fn(ActivityContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, String>> + Send + 'static,
{
    async fn invoke(&self, ctx: ActivityContext, input: String) -> Result<String, String> {
        (self.0)(ctx, input).await
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate registrations: {}", .0.join(", "))]
    Duplicate(Vec<String>),
}

/// Immutable mapping from type names to orchestration and activity handlers
#[derive(Clone, Default)]
pub struct TypeRegistry {
    orchestrations: Arc<HashMap<String, Arc<dyn OrchestrationHandler>>>,
    activities: Arc<HashMap<String, Arc<dyn ActivityHandler>>>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder {
            orchestrations: HashMap::new(),
            activities: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Look up an orchestration by name, failing for unregistered names
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn OrchestrationHandler>, HubError> {
        self.orchestrations
            .get(name)
            .cloned()
            .ok_or_else(|| HubError::UnknownOrchestrationType(name.to_string()))
    }

    pub fn contains_orchestration(&self, name: &str) -> bool {
        self.orchestrations.contains_key(name)
    }

    pub fn activity(&self, name: &str) -> Option<Arc<dyn ActivityHandler>> {
        self.activities.get(name).cloned()
    }

    pub fn orchestration_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.orchestrations.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn activity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.activities.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("orchestrations", &self.orchestration_names())
            .field("activities", &self.activity_names())
            .finish()
    }
}

pub struct TypeRegistryBuilder {
    orchestrations: HashMap<String, Arc<dyn OrchestrationHandler>>,
    activities: HashMap<String, Arc<dyn ActivityHandler>>,
    duplicates: Vec<String>,
}

impl TypeRegistryBuilder {
    pub fn register_orchestration<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let name = name.into();
        if self.orchestrations.contains_key(&name) {
            self.duplicates.push(format!("orchestration {}", name));
            return self;
        }
        self.orchestrations.insert(name, Arc::new(FnOrchestration(f)));
        self
    }

    /// Register an orchestration whose input and output are serde types
    pub fn register_orchestration_typed<In, Out, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        In: DeserializeOwned + Send + 'static,
        Out: Serialize + Send + 'static,
        F: Fn(OrchestrationContext, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, String>> + Send + 'static,
    {
        let f = Arc::new(f);
        let wrapper = move |ctx: OrchestrationContext, input: String| {
            let f = f.clone();
            async move {
                let input: In = decode(&input)?;
                let output = f(ctx, input).await?;
                encode(&output)
            }
        };
        self.register_orchestration(name, wrapper)
    }

    pub fn register_activity<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActivityContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let name = name.into();
        if self.activities.contains_key(&name) {
            self.duplicates.push(format!("activity {}", name));
            return self;
        }
        self.activities.insert(name, Arc::new(FnActivity(f)));
        self
    }

    /// Register an activity whose input and output are serde types
    pub fn register_activity_typed<In, Out, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        In: DeserializeOwned + Send + 'static,
        Out: Serialize + Send + 'static,
        F: Fn(ActivityContext, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, String>> + Send + 'static,
    {
        let f = Arc::new(f);
        let wrapper = move |ctx: ActivityContext, input: String| {
            let f = f.clone();
            async move {
                let input: In = decode(&input)?;
                let output = f(ctx, input).await?;
                encode(&output)
            }
        };
        self.register_activity(name, wrapper)
    }

    pub fn build(self) -> Result<TypeRegistry, RegistryError> {
        if !self.duplicates.is_empty() {
            return Err(RegistryError::Duplicate(self.duplicates));
        }
        Ok(TypeRegistry {
            orchestrations: Arc::new(self.orchestrations),
            activities: Arc::new(self.activities),
        })
    }
}

/// Decode JSON text; an empty payload reads as `null`
pub(crate) fn decode<T: DeserializeOwned>(input: &str) -> Result<T, String> {
    let input = if input.trim().is_empty() { "null" } else { input };
    serde_json::from_str(input).map_err(|e| format!("failed to decode input: {}", e))
}

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("failed to encode output: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample_registry() -> TypeRegistry {
        TypeRegistry::builder()
            .register_orchestration("Echo", |_ctx, input: String| async move { Ok(input) })
            .register_activity("Noop", |_ctx, _input: String| async move { Ok("null".to_string()) })
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_registered_name() {
        let registry = sample_registry();
        assert!(registry.resolve("Echo").is_ok());
        assert!(registry.contains_orchestration("Echo"));
        assert!(registry.activity("Noop").is_some());
    }

    #[test]
    fn test_resolve_unknown_name_fails_descriptively() {
        let registry = sample_registry();
        let err = registry.resolve("Bogus").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnknownOrchestrationType);
        assert!(err.to_string().contains("Bogus"));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let err = TypeRegistry::builder()
            .register_orchestration("Echo", |_ctx, input: String| async move { Ok(input) })
            .register_orchestration("Echo", |_ctx, input: String| async move { Ok(input) })
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate(vec!["orchestration Echo".to_string()]));
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = TypeRegistry::builder()
            .register_orchestration("B", |_ctx, input: String| async move { Ok(input) })
            .register_orchestration("A", |_ctx, input: String| async move { Ok(input) })
            .build()
            .unwrap();
        assert_eq!(registry.orchestration_names(), vec!["A", "B"]);
        assert!(registry.activity_names().is_empty());
    }

    #[test]
    fn test_decode_treats_empty_as_null() {
        let value: Option<u32> = decode("").unwrap();
        assert_eq!(value, None);
        assert!(decode::<u32>("\"x\"").is_err());
    }
}
