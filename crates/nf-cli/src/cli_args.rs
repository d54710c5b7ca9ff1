use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "nf-cli")]
#[command(about = "Naftah evaluation runtime CLI")]
pub(crate) struct Cli {
    /// Tracing filter, e.g. `debug` or `nf_runtime=trace`. Overrides NF_LOG.
    #[arg(long = "log-level", global = true)]
    pub(crate) log_level: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    /// JSON-encoded syntax tree of the program.
    #[arg(long = "tree")]
    pub(crate) tree: String,
    /// JSON table of token display strings used in diagnostics.
    #[arg(long = "symbols")]
    pub(crate) symbols: Option<String>,
    /// Report host field access failures instead of treating them as missing.
    #[arg(long = "strict-fields")]
    pub(crate) strict_fields: bool,
    #[arg(long = "no-builtins")]
    pub(crate) no_builtins: bool,
}
