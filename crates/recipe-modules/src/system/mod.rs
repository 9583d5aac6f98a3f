// System module: external command execution.

mod command;

pub use command::{CommandSpec, DEFAULT_TIMEOUT};

use crate::error::{ModuleError, OperationError, ValidationError};
use crate::execution_result::ExecutionResult;
use crate::module::{Method, Module};
use crate::parameters::ParameterBag;
use async_trait::async_trait;
use recipe_sdk::{ProcessInvoker, ProcessOutcome, Termination, TraceWriter};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const METHODS: &[&str] = &["run"];

/// Provides `run`.
pub struct SystemModule {
    invoker: ProcessInvoker,
    trace: Arc<dyn TraceWriter>,
    cancellation_token: CancellationToken,
}

impl SystemModule {
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            invoker: ProcessInvoker::new(trace.clone()),
            trace,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Terminate running commands when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run a shell line or argv vector and capture its standard output.
    ///
    /// Payload: `{"output": <stdout>}`. Non-zero exits, timeouts and spawn
    /// failures only clear the success flag.
    pub async fn run(&self, parameters: &ParameterBag) -> Result<ExecutionResult, ValidationError> {
        let spec = CommandSpec::from_parameters(parameters)?;

        let outcome = self
            .invoker
            .execute(
                &spec.program,
                spec.working_directory.as_deref(),
                spec.timeout,
                self.cancellation_token.child_token(),
            )
            .await;

        let (output, success) = match outcome {
            Ok(outcome) => {
                if let Some(err) = failure_of(&outcome) {
                    self.trace.warning(&err.chain_message());
                }
                let success = outcome.is_successful();
                (outcome.stdout, success)
            }
            Err(cause) => {
                self.trace
                    .warning(&OperationError::Spawn { cause }.chain_message());
                (String::new(), false)
            }
        };

        Ok(ExecutionResult::new(json!({ "output": output }), success))
    }
}

fn failure_of(outcome: &ProcessOutcome) -> Option<OperationError> {
    match outcome.termination {
        Termination::Exited(Some(0)) => None,
        Termination::Exited(Some(code)) => Some(OperationError::ExitCode(code)),
        Termination::Exited(None) => Some(OperationError::Signalled),
        Termination::TimedOut(limit) => Some(OperationError::TimedOut(limit)),
        Termination::Cancelled => Some(OperationError::Cancelled),
    }
}

#[async_trait]
impl Module for SystemModule {
    fn name(&self) -> &str {
        "system"
    }

    fn method_names(&self) -> &'static [&'static str] {
        METHODS
    }

    async fn run_method(&self, method: &Method) -> Result<ExecutionResult, ModuleError> {
        match method.name() {
            "run" => Ok(self.run(method.parameters()).await?),
            _ => Err(self.method_not_found(method)),
        }
    }
}
