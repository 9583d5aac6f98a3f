// Module trait, method invocation and the operation registry.

use crate::error::ModuleError;
use crate::execution_result::ExecutionResult;
use crate::filesystem::FilesystemModule;
use crate::parameters::{ParameterBag, ParameterKey, Value};
use crate::settings::ModuleSettings;
use crate::system::SystemModule;
use async_trait::async_trait;
use recipe_sdk::TraceWriter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One step invocation: an operation name plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    name: String,
    parameters: ParameterBag,
}

impl Method {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parameters(name, ParameterBag::new())
    }

    pub fn with_parameters(name: impl Into<String>, parameters: ParameterBag) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Add a parameter, builder style.
    pub fn with(mut self, key: impl Into<ParameterKey>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &ParameterBag {
        &self.parameters
    }
}

/// A named group of step handlers.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// The operations this module handles.
    fn method_names(&self) -> &'static [&'static str];

    /// Validate and run one method.
    ///
    /// Validation problems and unknown methods are returned as errors. A
    /// failure of the operation itself is reported by the result's success
    /// flag instead.
    async fn run_method(&self, method: &Method) -> Result<ExecutionResult, ModuleError>;

    fn method_not_found(&self, method: &Method) -> ModuleError {
        ModuleError::MethodNotFound {
            module: self.name().to_string(),
            method: method.name().to_string(),
        }
    }
}

/// Maps operation names to the module that provides them.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
    operations: HashMap<String, usize>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the system module (`run`) and the filesystem module.
    pub fn with_default_modules(
        settings: &ModuleSettings,
        trace: Arc<dyn TraceWriter>,
        cancellation_token: CancellationToken,
    ) -> Result<Self, ModuleError> {
        let mut registry = Self::new();
        registry.register(Arc::new(
            SystemModule::new(trace.clone()).with_cancellation(cancellation_token),
        ))?;
        registry.register(Arc::new(FilesystemModule::new(settings, trace)))?;
        Ok(registry)
    }

    /// Register every operation of `module`. Fails without registering
    /// anything if one of them is already provided by another module.
    pub fn register(&mut self, module: Arc<dyn Module>) -> Result<(), ModuleError> {
        for method in module.method_names() {
            if let Some(&index) = self.operations.get(*method) {
                return Err(ModuleError::DuplicateMethod {
                    method: method.to_string(),
                    first: self.modules[index].name().to_string(),
                    second: module.name().to_string(),
                });
            }
        }

        let index = self.modules.len();
        for method in module.method_names() {
            self.operations.insert(method.to_string(), index);
        }
        tracing::debug!(
            "Registered module '{}' with {} operations",
            module.name(),
            module.method_names().len()
        );
        self.modules.push(module);
        Ok(())
    }

    pub fn resolve(&self, operation: &str) -> Option<&Arc<dyn Module>> {
        self.operations
            .get(operation)
            .map(|&index| &self.modules[index])
    }

    /// Every registered `(module, operation)` pair, sorted by operation name.
    pub fn operations(&self) -> Vec<(&str, &str)> {
        let mut operations: Vec<(&str, &str)> = self
            .operations
            .iter()
            .map(|(operation, &index)| (self.modules[index].name(), operation.as_str()))
            .collect();
        operations.sort_by(|a, b| a.1.cmp(b.1));
        operations
    }

    /// Dispatch `method` to the module that provides it.
    pub async fn run(&self, method: &Method) -> Result<ExecutionResult, ModuleError> {
        let module = self
            .resolve(method.name())
            .ok_or_else(|| ModuleError::UnknownOperation(method.name().to_string()))?;
        tracing::debug!("Running '{}' from module '{}'", method.name(), module.name());
        module.run_method(method).await
    }
}
