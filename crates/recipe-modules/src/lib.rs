// recipe-modules: Step handlers for the recipe runner.
// The system module runs external commands, the filesystem module provides
// file and directory primitives and downloads. Both validate their parameters
// against a declarative contract before touching anything.

pub mod error;
pub mod execution_result;
pub mod filesystem;
pub mod module;
pub mod parameters;
pub mod settings;
pub mod system;

// Re-exports for convenient access
pub use error::{ModuleError, OperationError, StringProblem, ValidationError};
pub use execution_result::ExecutionResult;
pub use filesystem::{FileSystem, FileTransfer, FilesystemModule, LocalFileSystem, TransferRequest};
pub use module::{Method, Module, ModuleRegistry};
pub use parameters::{ArityBounds, ExpectedType, ParameterBag, ParameterContract, ParameterKey, Value, ValueKind};
pub use settings::ModuleSettings;
pub use system::{CommandSpec, SystemModule};
