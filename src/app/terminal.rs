//! How a run talks to the terminal: log level, log colour and the spinner.

use std::io::{self, IsTerminal};

use tracing_subscriber::EnvFilter;

use crate::cli::Args;

/// Terminal facts read from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TerminalEnv {
    /// `NO_COLOR` is set to a non-empty value.
    pub(crate) no_color: bool,
    /// `TERM=dumb`.
    pub(crate) dumb: bool,
    pub(crate) stderr_is_terminal: bool,
}

impl TerminalEnv {
    pub(crate) fn current() -> Self {
        Self {
            no_color: std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty()),
            dumb: std::env::var("TERM").is_ok_and(|value| value.eq_ignore_ascii_case("dumb")),
            stderr_is_terminal: io::stderr().is_terminal(),
        }
    }
}

/// Output settings for one run, resolved from the flags and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputMode {
    pub(crate) log_level: &'static str,
    pub(crate) color: bool,
    /// Draw the download spinner; never on a pipe, a dumb terminal or with `-q`.
    pub(crate) spinner: bool,
    pub(crate) quiet: bool,
}

impl OutputMode {
    pub(crate) fn resolve(args: &Args, env: TerminalEnv) -> Self {
        Self {
            log_level: args.default_log_level(),
            color: !(args.no_color || env.no_color || env.dumb),
            spinner: env.stderr_is_terminal && !args.quiet && !env.dumb,
            quiet: args.quiet,
        }
    }

    /// Installs the global subscriber on stderr. `RUST_LOG` wins over `-v`/`-q`.
    pub(crate) fn init_tracing(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.log_level));
        let _ = tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_ansi(self.color)
            .with_env_filter(filter)
            .try_init();
    }
}
