use clap::Parser;

mod cli;
mod commands;

fn main() -> anyhow::Result<()> {
    // stdout may carry pack bytes (`build-pack`), so logs go to stderr.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = cli::Cli::parse();
    commands::run_command(cli)
}
