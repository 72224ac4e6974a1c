//! Command dispatch: bridges CLI args -> client calls -> output formatting.

pub mod listen;
pub mod rest;

use unifi_events::UnifiEvents;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    client: &UnifiEvents,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Listen(args) => listen::handle(client, &args, global).await,
        Command::Get(args) => rest::get(client, &args, global).await,
        Command::Delete(args) => rest::delete(client, &args, global).await,
        Command::Post(args) => rest::post(client, &args, global).await,
        Command::Put(args) => rest::put(client, &args, global).await,
        // Completions are handled before a client exists
        Command::Completions(_) => unreachable!(),
    }
}
