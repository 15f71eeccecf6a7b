//! Input/output handling for the CLI and the serve loop.
//!
//! - Exit codes scripts can branch on
//! - JSON envelope for `--json` output and serve responses
//! - Request line parsing for `serve`

pub mod exit_code;
pub mod format;
pub mod input;

pub use exit_code::ExitCode;
pub use format::{JsonResponse, OutputFormat, ResponseMeta};
pub use input::{QueryRequest, parse_request_line};
