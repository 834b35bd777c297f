use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::protocol::ToolSpec;
use crate::{Error, Result};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type ToolHandler = Box<dyn Fn(Value) -> BoxFuture<Result<Value>> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub schema: RootSchema,
}

/// Tools registered before `start`, immutable for the session lifetime.
///
/// Registering a handler is optional per tool name: calls for names without a
/// handler are surfaced through the facade's tool-call callback instead, and
/// the caller answers via `submit_tool_result`.
#[derive(Default)]
pub struct ToolRegistry {
    defs: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.defs
    }

    #[must_use]
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Register a tool with a typed async handler. The parameter schema is
    /// derived from `TArgs`.
    pub fn tool<TArgs, TResp, F, Fut>(&mut self, name: &str, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        self.register::<TArgs, TResp, F, Fut>(name, None, handler);
    }

    /// Register a tool with a description the model sees.
    pub fn tool_with_description<TArgs, TResp, F, Fut>(
        &mut self,
        name: &str,
        description: impl Into<String>,
        handler: F,
    ) where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        self.register::<TArgs, TResp, F, Fut>(name, Some(description.into()), handler);
    }

    /// Declare a tool without a local handler; calls for it are routed to
    /// the facade's tool-call callback.
    pub fn declare(&mut self, name: &str, description: impl Into<String>, parameters: Value) {
        let schema = serde_json::from_value(parameters).unwrap_or_else(|_| RootSchema::default());
        self.defs.push(ToolDefinition {
            name: name.to_string(),
            description: Some(description.into()),
            schema,
        });
    }

    fn register<TArgs, TResp, F, Fut>(&mut self, name: &str, description: Option<String>, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        let schema = schemars::schema_for!(TArgs);
        let name = name.to_string();
        self.defs.push(ToolDefinition {
            name: name.clone(),
            description,
            schema,
        });

        let user_handler = Arc::new(handler);
        let handler = move |value: Value| -> BoxFuture<Result<Value>> {
            let user_handler = Arc::clone(&user_handler);
            Box::pin(async move {
                let args: TArgs = serde_json::from_value(value)
                    .map_err(|e| Error::ToolBridge(e.to_string()))?;
                let resp = user_handler(args).await?;
                serde_json::to_value(resp).map_err(|e| Error::ToolBridge(e.to_string()))
            })
        };

        self.handlers.insert(name, Box::new(handler));
    }

    /// Convert all registered tools into wire-level descriptors.
    ///
    /// # Errors
    /// Returns an error if a parameter schema fails to serialize.
    #[allow(clippy::result_large_err)]
    pub fn try_as_specs(&self) -> Result<Vec<ToolSpec>> {
        let mut specs = Vec::with_capacity(self.defs.len());
        for def in &self.defs {
            let parameters = serde_json::to_value(&def.schema)?;
            specs.push(ToolSpec::function(
                def.name.clone(),
                def.description.clone(),
                parameters,
            ));
        }
        Ok(specs)
    }

    /// Run the registered handler for a call, returning the output as JSON
    /// text ready for a `function_call_output` item.
    ///
    /// # Errors
    /// Returns an error if the tool is unknown or its handler fails.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> Result<String> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| Error::ToolBridge(format!("unknown tool: {name}")))?;
        let args = serde_json::from_str(arguments)
            .unwrap_or_else(|_| Value::String(arguments.to_string()));
        let output = handler(args).await?;
        Ok(output.to_string())
    }
}
