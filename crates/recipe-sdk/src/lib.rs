// recipe-sdk: Foundation layer for the recipe step modules.
// This crate has no dependencies on the other workspace crates and provides
// the process, trace, filesystem, url and http utilities the modules build on.

pub mod build_constants;
pub mod http_util;
pub mod io_util;
pub mod process_invoker;
pub mod string_util;
pub mod trace;
pub mod url_util;

// Re-export commonly used items at crate root
pub use build_constants::Package;
pub use http_util::{HttpClientSettings, HttpUtil};
pub use io_util::{IOUtil, DEFAULT_DIRECTORY_MODE};
pub use process_invoker::{CommandLine, ProcessInvoker, ProcessOutcome, Termination};
pub use string_util::StringUtil;
pub use trace::{CollectingTraceWriter, NullTraceWriter, TraceLevel, TraceWriter, TracingTraceWriter};
pub use url_util::UrlUtil;
