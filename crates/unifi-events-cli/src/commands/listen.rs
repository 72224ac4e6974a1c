//! `listen`: stream events as JSON until interrupted.

use std::time::Duration;

use tracing::{debug, info, warn};
use unifi_events::{BusEvent, ConnectOutcome, ConnectionState, Lifecycle, Pattern, UnifiEvents};

use crate::cli::{GlobalOpts, ListenArgs};
use crate::error::CliError;
use crate::output;

/// Consecutive idle checks before concluding the client stopped retrying.
///
/// `Disconnected` is only reported with no socket attached and no reconnect
/// pending.
const IDLE_CHECKS: u8 = 2;

pub async fn handle(
    client: &UnifiEvents,
    args: &ListenArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let filter = EventFilter::new(&args.patterns, !args.no_lifecycle);
    // One catch-all subscription so an event matching several patterns
    // prints once.
    let mut events = client.subscribe("**");

    match client.connect().await? {
        ConnectOutcome::Connected => info!("listening for events"),
        ConnectOutcome::ReconnectScheduled => warn!("initial connect failed, retrying"),
        ConnectOutcome::Closed => return Ok(()),
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut liveness = tokio::time::interval(Duration::from_secs(1));
    let mut idle = 0u8;

    let result = loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    warn!(error = %e, "Ctrl-C handler failed");
                }
                info!("interrupted, closing");
                break Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else { break Ok(()) };
                if filter.accepts(&event) {
                    output::print(global.output, &output::event_json(&event))?;
                }
                if event.topic == Lifecycle::Closed.topic() {
                    info!("controller closed the event stream");
                    break Ok(());
                }
            }
            _ = liveness.tick() => {
                idle = if client.state() == ConnectionState::Disconnected { idle + 1 } else { 0 };
                if idle >= IDLE_CHECKS {
                    break Err(CliError::Stream {
                        message: "reconnect failed; see the last ctrl.error event".into(),
                    });
                }
            }
        }
    };

    let was_open = client.state() == ConnectionState::Connected;
    client.close();
    if was_open {
        // Give the socket task a moment to send its close frame.
        let drained = tokio::time::timeout(Duration::from_secs(1), async {
            while let Some(event) = events.recv().await {
                if event.topic == Lifecycle::Closed.topic() {
                    break;
                }
            }
        })
        .await;
        debug!(clean = drained.is_ok(), "event stream shut down");
    }
    result
}

/// Which events `listen` prints.
struct EventFilter {
    patterns: Vec<Pattern>,
    lifecycle: bool,
}

impl EventFilter {
    fn new(patterns: &[String], lifecycle: bool) -> Self {
        Self {
            patterns: patterns.iter().map(|p| Pattern::parse(p)).collect(),
            lifecycle,
        }
    }

    fn accepts(&self, event: &BusEvent) -> bool {
        if !self.lifecycle && event.topic.starts_with("ctrl.") {
            return false;
        }
        self.patterns.iter().any(|p| p.matches(&event.topic))
    }
}
