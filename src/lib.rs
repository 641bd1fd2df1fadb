pub mod engine {
    pub mod masterlist;
    pub mod publisher;
    pub mod query;
    pub mod refresh;
    pub mod schedule;
}
pub mod models {
    pub mod cli;
    pub mod records;
}
pub mod store;
pub mod utils {
    pub mod display;
    pub mod request;
    pub mod settings;
    pub mod subscriber;
}

pub use engine::{
    publisher::Publisher,
    refresh::{CycleOutcome, CycleReport, RefreshConfig, RefreshEngine, RefreshErr, RefreshState},
};
pub use models::records::{DirectorySnapshot, RawEntry, ServerRecord};

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

/// Events logged with this name are written to the log file but never to stdout
pub const LOG_ONLY: &str = "log_only";

/// Name of the store file kept inside the data directory
pub const STORE_FILE: &str = "servers.jsonl";

#[macro_export]
macro_rules! from_static_cow_fn {
    ($variant:ident, $fn_name:ident) => {
        pub(crate) fn $fn_name<T: Into<std::borrow::Cow<'static, str>>>(msg: T) -> Self {
            Self::$variant(msg.into())
        }
    };
}

pub fn format_panic_info(info: &std::panic::PanicHookInfo) -> String {
    let payload_str = if let Some(s) = info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    };

    match info.location() {
        Some(location) => format!(
            "panicked at {}:{}: {payload_str}",
            location.file(),
            location.line()
        ),
        None => format!("panicked: {payload_str}"),
    }
}
