use crate::demo::{run_demo, DemoArgs};
use crate::render::{run_render, RenderArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use veteran_aid::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "veteran-aid",
    about = "Track benefit claim evidence and render application letters",
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
    /// Render a tagged application text file to PDF without any network access
    Render(RenderArgs),
    /// Walk a claim through its lifecycle using in-memory adapters
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
        Command::Render(args) => run_render(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["veteran-aid"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn render_requires_input_and_output() {
        assert!(Cli::try_parse_from(["veteran-aid", "render", "--input", "letter.txt"]).is_err());

        let cli = Cli::try_parse_from([
            "veteran-aid",
            "render",
            "--input",
            "letter.txt",
            "--output",
            "letter.pdf",
            "--title",
            "ЗАЯВА",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Render(args)) => {
                assert_eq!(args.output.to_string_lossy(), "letter.pdf");
                assert_eq!(args.title.as_deref(), Some("ЗАЯВА"));
            }
            other => panic!("expected render command, got {other:?}"),
        }
    }
}
