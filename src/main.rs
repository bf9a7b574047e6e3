// Module declarations
mod cli;
mod config;
mod job;
mod lease;
mod lock;
mod provider;
mod serve;
mod slice;
mod store;
mod supervisor;
mod types;
mod util;

// Re-export module items at the crate root so cross-module references stay
// flat.
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use job::*;
#[allow(unused_imports)]
pub(crate) use lease::*;
#[allow(unused_imports)]
pub(crate) use lock::*;
#[allow(unused_imports)]
pub(crate) use provider::*;
#[allow(unused_imports)]
pub(crate) use serve::*;
#[allow(unused_imports)]
pub(crate) use slice::*;
#[allow(unused_imports)]
pub(crate) use store::*;
#[allow(unused_imports)]
pub(crate) use supervisor::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;

use clap::Parser;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir);

    match cli.command {
        Command::Start { user, target, force } => {
            let store = UserStore::open(&data_dir, &user)?;
            let response = start_sync(&store, &target, force)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        Command::Status { user } => {
            let store = UserStore::open(&data_dir, &user)?;
            let envelope = JobEnvelope::success(sync_status(&store));
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }

        Command::Tick { user } => {
            let store = UserStore::open(&data_dir, &user)?;
            let envelope = JobEnvelope::success(sync_tick(&store)?);
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }

        Command::Worker { user } => {
            let store = UserStore::open(&data_dir, &user)?;
            run_worker_loop(&store)
        }

        Command::Serve { bind, port } => run_action_server(&bind, port, &data_dir),
    }
}
