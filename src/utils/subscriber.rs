use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(not(debug_assertions))]
use tracing::{Event, Level, Subscriber};

#[cfg(not(debug_assertions))]
use tracing_subscriber::{
    fmt::{
        FmtContext,
        format::{FormatEvent, FormatFields, PrettyFields, Writer},
    },
    registry::LookupSpan,
};

/// Writes `PANIC` events as their bare message so the panic location stays readable
#[cfg(not(debug_assertions))]
struct PanicFormatter<E> {
    inner: E,
}

#[cfg(not(debug_assertions))]
impl<E> PanicFormatter<E> {
    fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[cfg(not(debug_assertions))]
impl<S, N, E> FormatEvent<S, N> for PanicFormatter<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    E: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        if meta.level() == &Level::ERROR && meta.name() == "PANIC" {
            ctx.field_format().format_fields(writer.by_ref(), event)?;
            writeln!(writer)
        } else {
            self.inner.format_event(ctx, writer.by_ref(), event)
        }
    }
}

/// Installs a daily rolling log file in `local_env_dir` and a stdout layer that leaves out
/// events named [`crate::LOG_ONLY`]
#[cfg(not(debug_assertions))]
pub fn init_subscriber(local_env_dir: &std::path::Path) -> std::io::Result<()> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{Layer, filter::DynFilterFn};

    let name = crate::CRATE_NAME;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(format!("{name}.log"))
        .max_log_files(7)
        .build(local_env_dir)
        .map_err(std::io::Error::other)?;

    let log_layer = fmt::layer()
        .event_format(PanicFormatter::new(
            fmt::format().with_target(false).with_ansi(false),
        ))
        .fmt_fields(PrettyFields::new())
        .with_writer(file_appender)
        .with_filter(EnvFilter::new(format!("{name}=info,reqwest=warn")));

    let exclude_log_only = DynFilterFn::new(|metadata, _| metadata.name() != crate::LOG_ONLY);

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout)
        .with_filter(EnvFilter::new(format!("{name}=info")))
        .with_filter(exclude_log_only);

    tracing_subscriber::registry()
        .with(log_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(std::io::Error::other)
}

#[cfg(debug_assertions)]
pub fn init_subscriber(_local_env_dir: &std::path::Path) -> std::io::Result<()> {
    use tracing_subscriber::{Layer, filter::LevelFilter};

    tracing_subscriber::registry()
        .with(
            fmt::layer().with_target(false).pretty().with_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            ),
        )
        .try_init()
        .map_err(std::io::Error::other)
}
