//! One-shot REST verbs.

use serde_json::Value;
use unifi_events::UnifiEvents;

use crate::cli::{BodyArgs, GlobalOpts, PathArgs};
use crate::error::CliError;
use crate::output;

pub async fn get(client: &UnifiEvents, args: &PathArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let body = client.get(&args.path).await?;
    output::print(global.output, &body)
}

pub async fn delete(
    client: &UnifiEvents,
    args: &PathArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let body = client.delete(&args.path).await?;
    output::print(global.output, &body)
}

pub async fn post(client: &UnifiEvents, args: &BodyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let payload = parse_body(args)?;
    let body = client.post(&args.path, &payload).await?;
    output::print(global.output, &body)
}

pub async fn put(client: &UnifiEvents, args: &BodyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let payload = parse_body(args)?;
    let body = client.put(&args.path, &payload).await?;
    output::print(global.output, &body)
}

/// Validated before any request goes out.
fn parse_body(args: &BodyArgs) -> Result<Value, CliError> {
    Ok(serde_json::from_str(&args.data)?)
}
