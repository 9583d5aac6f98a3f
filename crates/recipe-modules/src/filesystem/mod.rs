// Filesystem module: file and directory primitives plus downloads.

mod file_system;
mod transfer;

pub use file_system::{FileSystem, LocalFileSystem};
pub use transfer::{
    FileTransfer, HttpClientTransport, ProgressSink, StreamTransport, TransferProgress,
    TransferRequest, Transport,
};

use transfer::write_guarded;

use crate::error::{ModuleError, OperationError, StringProblem, ValidationError};
use crate::execution_result::ExecutionResult;
use crate::module::{Method, Module};
use crate::parameters::{ExpectedType, ParameterBag, ParameterContract, Value};
use crate::settings::ModuleSettings;
use async_trait::async_trait;
use recipe_sdk::{TraceLevel, TraceWriter, DEFAULT_DIRECTORY_MODE};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const METHODS: &[&str] = &[
    "copy_file",
    "download_file",
    "make_dir",
    "mirror_dir",
    "write_file",
    "read_file",
    "remove",
];

/// Provides `copy_file`, `download_file`, `make_dir`, `mirror_dir`,
/// `write_file`, `read_file` and `remove`.
pub struct FilesystemModule {
    fs: Arc<dyn FileSystem>,
    transfer: FileTransfer,
    trace: Arc<dyn TraceWriter>,
}

impl FilesystemModule {
    pub fn new(settings: &ModuleSettings, trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            fs: Arc::new(LocalFileSystem),
            transfer: FileTransfer::new(settings, trace.clone()),
            trace,
        }
    }

    /// Replace the filesystem the primitives delegate to.
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_transfer(mut self, transfer: FileTransfer) -> Self {
        self.transfer = transfer;
        self
    }

    /// Copy a single file. Parameters: `from`, `to`.
    pub fn copy_file(&self, parameters: &ParameterBag) -> Result<ExecutionResult, ValidationError> {
        ParameterContract::exactly(2)
            .allow_names(&["from", "to"])
            .non_empty_string("from")
            .non_empty_string("to")
            .validate(parameters)?;

        let from = required_str(parameters, "from")?;
        let to = required_str(parameters, "to")?;
        let success = self.succeeded("copy_file", self.fs.copy(Path::new(from), Path::new(to)));
        Ok(ExecutionResult::empty(success))
    }

    /// Download `url` into `filename`.
    ///
    /// An unparseable URL is a validation error. Network failures, non-200
    /// answers and write failures only clear the success flag and never leave
    /// a partial `filename` behind. A trace sink that panics is ignored.
    pub async fn download_file(
        &self,
        parameters: &ParameterBag,
    ) -> Result<ExecutionResult, ValidationError> {
        ParameterContract::exactly(2)
            .allow_names(&["url", "filename"])
            .non_empty_string("url")
            .non_empty_string("filename")
            .validate(parameters)?;

        let url = required_str(parameters, "url")?;
        let filename = required_str(parameters, "filename")?;
        let request = TransferRequest::new(url, filename)?;

        write_guarded(
            self.trace.as_ref(),
            TraceLevel::Info,
            &format!("Downloading file from \"{url}\" into \"{filename}\""),
        );
        let success = match self.transfer.download(&request).await {
            Ok(bytes) => {
                tracing::debug!("Downloaded {bytes} bytes into '{filename}'");
                true
            }
            Err(err) => {
                write_guarded(self.trace.as_ref(), TraceLevel::Warning, &err.chain_message());
                false
            }
        };
        Ok(ExecutionResult::empty(success))
    }

    /// Create a directory recursively.
    ///
    /// A lone parameter is the directory, by name or position. With two
    /// parameters both must be named, `dir` and `mode`. The mode defaults to
    /// `0o777`.
    pub fn make_dir(&self, parameters: &ParameterBag) -> Result<ExecutionResult, ValidationError> {
        let contract = ParameterContract::between(1, 2);
        let contract = if parameters.len() == 1 {
            contract.allow("dir").allow(0usize)
        } else {
            contract.allow_names(&["dir", "mode"])
        };
        contract
            .non_empty_string_at("dir", 0)
            .optional("mode", ExpectedType::NonNegativeInteger)
            .validate(parameters)?;

        let dir = parameters
            .get_name_or_position("dir", 0)
            .and_then(Value::as_str)
            .ok_or_else(|| missing("dir"))?;
        let mode = match parameters.get_named("mode").and_then(Value::as_int) {
            Some(mode) => u32::try_from(mode).map_err(|_| {
                ValidationError::InvalidArgument(format!("Invalid mode value. Value found: {mode}."))
            })?,
            None => DEFAULT_DIRECTORY_MODE,
        };

        let success = self.succeeded("make_dir", self.fs.mkdir(Path::new(dir), mode));
        Ok(ExecutionResult::empty(success))
    }

    /// Copy the contents of one directory into another. Parameters: `from`, `to`.
    pub fn mirror_dir(&self, parameters: &ParameterBag) -> Result<ExecutionResult, ValidationError> {
        ParameterContract::exactly(2)
            .allow_names(&["from", "to"])
            .non_empty_string("from")
            .non_empty_string("to")
            .validate(parameters)?;

        let from = required_str(parameters, "from")?;
        let to = required_str(parameters, "to")?;
        let success = self.succeeded("mirror_dir", self.fs.mirror(Path::new(from), Path::new(to)));
        Ok(ExecutionResult::empty(success))
    }

    /// Write `content` into `filename`, replacing it.
    pub fn write_file(&self, parameters: &ParameterBag) -> Result<ExecutionResult, ValidationError> {
        ParameterContract::exactly(2)
            .allow_names(&["filename", "content"])
            .non_empty_string("filename")
            .optional("content", ExpectedType::String)
            .validate(parameters)?;

        let filename = required_str(parameters, "filename")?;
        let content = parameters
            .get_named("content")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("content"))?;
        let success = self.succeeded(
            "write_file",
            self.fs.dump_file(Path::new(filename), content.as_bytes()),
        );
        Ok(ExecutionResult::empty(success))
    }

    /// Read a file. Payload: `{"content": <text or null>}`.
    ///
    /// An empty or blank `filename` is rejected during validation like every
    /// other path parameter; a file that cannot be read gives `null` content
    /// and `success=false`.
    pub fn read_file(&self, parameters: &ParameterBag) -> Result<ExecutionResult, ValidationError> {
        ParameterContract::exactly(1)
            .allow("filename")
            .allow(0usize)
            .non_empty_string_at("filename", 0)
            .validate(parameters)?;

        let filename = parameters
            .get_name_or_position("filename", 0)
            .and_then(Value::as_str)
            .ok_or_else(|| missing("filename"))?;
        let content = self.outcome("read_file", self.fs.read_to_string(Path::new(filename)));
        let success = content.is_some();
        Ok(ExecutionResult::new(json!({ "content": content }), success))
    }

    /// Remove files, symlinks and directories given as plain values.
    pub fn remove(&self, parameters: &ParameterBag) -> Result<ExecutionResult, ValidationError> {
        ParameterContract::at_least(1)
            .every_value_non_empty_string()
            .validate(parameters)?;

        let paths: Vec<PathBuf> = parameters
            .values()
            .filter_map(Value::as_str)
            .map(PathBuf::from)
            .collect();
        let success = self.succeeded("remove", self.fs.remove(&paths));
        Ok(ExecutionResult::empty(success))
    }

    fn outcome<T>(&self, operation: &'static str, result: anyhow::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(cause) => {
                let err = OperationError::FileSystem { operation, cause };
                self.trace.warning(&err.chain_message());
                None
            }
        }
    }

    fn succeeded(&self, operation: &'static str, result: anyhow::Result<()>) -> bool {
        self.outcome(operation, result).is_some()
    }
}

fn missing(name: &str) -> ValidationError {
    ValidationError::EmptyOrNonString {
        parameter: name.into(),
        problem: StringProblem::Missing,
    }
}

fn required_str<'a>(parameters: &'a ParameterBag, name: &str) -> Result<&'a str, ValidationError> {
    parameters
        .get_named(name)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(name))
}

#[async_trait]
impl Module for FilesystemModule {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn method_names(&self) -> &'static [&'static str] {
        METHODS
    }

    async fn run_method(&self, method: &Method) -> Result<ExecutionResult, ModuleError> {
        let parameters = method.parameters();
        let result = match method.name() {
            "copy_file" => self.copy_file(parameters),
            "download_file" => self.download_file(parameters).await,
            "make_dir" => self.make_dir(parameters),
            "mirror_dir" => self.mirror_dir(parameters),
            "write_file" => self.write_file(parameters),
            "read_file" => self.read_file(parameters),
            "remove" => self.remove(parameters),
            _ => return Err(self.method_not_found(method)),
        };
        Ok(result?)
    }
}
