use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use cabin_lottery::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Cabin Lottery",
    about = "Run the cabin lottery service or rehearse a snake-draft drawing from the command line",
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
    /// Run trial draws for a sample drawing and print the audit logs
    Demo(DemoArgs),
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
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_accepts_repeated_seeds() {
        let cli = Cli::try_parse_from(["cabin-lottery", "demo", "--seed", "7", "--seed", "42"])
            .expect("arguments parse");

        match cli.command {
            Some(Command::Demo(args)) => assert_eq!(args.seeds, vec![7, 42]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn serve_overrides_port() {
        let cli = Cli::try_parse_from(["cabin-lottery", "serve", "--port", "8088"])
            .expect("arguments parse");

        match cli.command {
            Some(Command::Serve(args)) => {
                assert_eq!(args.port, Some(8088));
                assert!(args.host.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
