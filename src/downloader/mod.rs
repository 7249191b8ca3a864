// src/downloader/mod.rs

pub mod dispatcher;
pub mod history;
pub mod job;
pub mod path;
pub mod progress;
pub mod template;
mod task_processor;
mod task_runner;

pub use dispatcher::{Target, parse_url, resolve_inputs};
pub use history::HistoryLedger;
pub use job::JobList;
pub use path::{OutputPath, resolve_output_path};
pub use progress::{
    BatchSummary, CliObserver, FailedItem, ProgressEvent, ProgressObserver, SilentObserver,
    TransferHandle,
};
pub use task_processor::TransferOptions;
pub use task_runner::{run_once, run_with_retry};
pub use template::{Template, TemplateContext, convert_legacy};
