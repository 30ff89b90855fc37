use crate::demo::{run_demo, DemoArgs};
use crate::infra::{run_room_import, run_seed, RoomImportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use hostel_desk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "hostel-desk",
    about = "Run and administer the hostel room allocation service",
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
    /// Create the configured admin account and sample rooms if missing
    Seed,
    /// Manage the room catalogue
    Rooms {
        #[command(subcommand)]
        command: RoomsCommand,
    },
    /// Walk through an allocation scenario against an in-memory store
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RoomsCommand {
    /// Create rooms from a `Room No,Capacity,Block` CSV export
    Import(RoomImportArgs),
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
        Command::Seed => run_seed().await,
        Command::Rooms {
            command: RoomsCommand::Import(args),
        } => run_room_import(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
