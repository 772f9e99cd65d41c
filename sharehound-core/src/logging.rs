use std::sync::Arc;

use sharehound_common::ShareHoundConfig;
use time::{format_description, UtcOffset};
use tracing_subscriber::filter::dynamic_filter_fn;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn default_directive(config: &ShareHoundConfig) -> &'static str {
    if config.debug {
        "sharehound=debug"
    } else {
        "sharehound=info"
    }
}

pub fn init_logging(config: &ShareHoundConfig) -> anyhow::Result<()> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(default_directive(config)),
    };
    let env_filter = Arc::new(env_filter);

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let attended = console::user_attended();
    let enable_colors = attended && !config.no_colors;

    let full_fmt_layer = {
        let env_filter = env_filter.clone();
        tracing_subscriber::fmt::layer()
            .with_ansi(enable_colors)
            .with_timer(OffsetTime::new(
                offset,
                format_description::parse("[day].[month].[year] [hour]:[minute]:[second]")?,
            ))
            .with_filter(dynamic_filter_fn(move |m, c| {
                env_filter.enabled(m, c.clone())
            }))
    };
    let compact_fmt_layer = {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(enable_colors)
            .with_target(false)
            .with_timer(OffsetTime::new(
                offset,
                format_description::parse("[hour]:[minute]:[second]")?,
            ))
            .with_filter(dynamic_filter_fn(move |m, c| {
                env_filter.enabled(m, c.clone())
            }))
    };

    tracing_subscriber::registry()
        .with((!attended).then_some(full_fmt_layer))
        .with(attended.then_some(compact_fmt_layer))
        .try_init()?;
    Ok(())
}
