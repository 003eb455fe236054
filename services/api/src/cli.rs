use crate::demo::{run_demo, run_survey_check, DemoArgs, SurveyCheckArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use survey_runtime::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Survey Runtime",
    about = "Serve, check, and demonstrate dynamic questionnaires from the command line",
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
    /// Inspect survey fixtures without starting the service
    Survey {
        #[command(subcommand)]
        command: SurveyCommand,
    },
    /// Walk a scripted applicant through the bundled questionnaire
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum SurveyCommand {
    /// Load a fixture, run the import checks, and print a summary
    Check(SurveyCheckArgs),
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
        Command::Survey {
            command: SurveyCommand::Check(args),
        } => run_survey_check(args),
        Command::Demo(args) => run_demo(args),
    }
}
