use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

const DEVELOPMENT_DIRECTIVES: &str =
    "info,database=debug,messaging=debug,domain_orders=debug,mongodb=warn,async_nats=warn";
const PRODUCTION_DIRECTIVES: &str = "info,mongodb=warn,async_nats=warn";

/// Output format of the installed subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// `LOG_FORMAT=json|pretty` wins; otherwise production logs JSON.
    pub fn resolve(environment: &Environment) -> Self {
        match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(f) if f.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ if environment.is_production() => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install color-eyre with the project configuration. Safe to call multiple times.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the default directives. The subscriber always carries
/// an [`tracing_error::ErrorLayer`] so span traces are attached to errors.
///
/// Calling this again after a subscriber is installed is a no-op, which keeps
/// tests that each initialise tracing independent of execution order.
pub fn init_tracing(environment: &Environment) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if environment.is_production() {
            PRODUCTION_DIRECTIVES
        } else {
            DEVELOPMENT_DIRECTIVES
        })
    });

    let format = LogFormat::resolve(environment);
    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init(),
    };

    match result {
        Ok(()) => info!(?environment, ?format, "Tracing initialized"),
        Err(_) => debug!("Tracing already initialized, skipping re-initialization"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_follows_environment() {
        temp_env::with_var_unset("LOG_FORMAT", || {
            assert_eq!(LogFormat::resolve(&Environment::Production), LogFormat::Json);
            assert_eq!(LogFormat::resolve(&Environment::Development), LogFormat::Pretty);
        });
    }

    #[test]
    fn test_log_format_override() {
        temp_env::with_var("LOG_FORMAT", Some("JSON"), || {
            assert_eq!(LogFormat::resolve(&Environment::Development), LogFormat::Json);
        });
        temp_env::with_var("LOG_FORMAT", Some("pretty"), || {
            assert_eq!(LogFormat::resolve(&Environment::Production), LogFormat::Pretty);
        });
    }

    #[test]
    fn test_init_tracing_multiple_calls() {
        init_tracing(&Environment::Development);
        init_tracing(&Environment::Production);
    }

    #[test]
    fn test_init_tracing_with_rust_log_env() {
        temp_env::with_var("RUST_LOG", Some("warn"), || {
            init_tracing(&Environment::Production);
        });
    }
}
