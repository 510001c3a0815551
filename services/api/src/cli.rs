use crate::demo::{run_demo, run_penalty, DemoArgs, PenaltyArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use declara::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Declara",
    about = "Run and demonstrate the fiscal declaration engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a batch through filing, pricing, payment and plate handover
    Demo(DemoArgs),
    /// Print the late-payment penalty owed on a principal
    Penalty(PenaltyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Penalty(args) => run_penalty(args),
    }
}
