use anyhow::Result;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{format::FmtSpan, Layer as FmtLayer},
    layer::SubscriberExt as _,
    Layer as _, Registry,
};

pub(crate) struct Options {
    pub verbose: bool,
    pub color: bool,
}

impl Options {
    fn max_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::TRACE
        } else {
            LevelFilter::INFO
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.verbose {
            // include enter/exit events for detailed tracing
            FmtSpan::FULL
        } else {
            FmtSpan::NONE
        }
    }
}

/// Install the global subscriber: plain log lines on stderr, leaving stdout
/// to command output.
pub(crate) fn set_up(options: &Options) -> Result<()> {
    if options.verbose {
        eprintln!("setting up verbose logging");
    }
    let fmt_layer = FmtLayer::new()
        .with_writer(std::io::stderr)
        .with_span_events(options.span_events())
        .with_ansi(options.color)
        .with_filter(options.max_level());
    let subscriber = Registry::default().with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("failed to set up tracing: {}", e))
}
