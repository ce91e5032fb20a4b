use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vigil_core::{Error, Result};

use crate::Controller;

/// Runs a set of controllers side by side under one shutdown signal.
///
/// A controller that fails is logged and the rest keep running; `run`
/// reports the first failure once every controller has returned.
pub struct Supervisor {
    controllers: Vec<Controller>,
    token: CancellationToken,
    shutdown_timeout: Duration,
}

impl Supervisor {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self { controllers: Vec::new(), token: CancellationToken::new(), shutdown_timeout }
    }

    pub fn add(&mut self, controller: Controller) {
        self.controllers.push(controller);
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Handle for signal wiring; cancelling it equals [`Supervisor::shutdown`].
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Ask every controller to stop. Idempotent.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!(controllers = self.controllers.len(), "shutdown requested");
        }
        self.token.cancel();
    }

    pub async fn run(&self) -> Result<()> {
        let mut set = JoinSet::new();
        for c in &self.controllers {
            let c = c.clone();
            let stop = self.token.child_token();
            set.spawn(async move {
                let res = c.run(stop).await;
                (c.name().to_string(), res)
            });
        }

        let mut first_err: Option<Error> = None;
        let mut deadline: Option<Instant> = None;
        let mut aborted = false;
        loop {
            let joined = tokio::select! {
                joined = set.join_next() => joined,
                _ = self.token.cancelled(), if deadline.is_none() => {
                    deadline = Some(Instant::now() + self.shutdown_timeout);
                    continue;
                }
                _ = sleep_until(deadline), if deadline.is_some() && !aborted => {
                    warn!(remaining = set.len(), "controllers did not stop in time; aborting");
                    set.abort_all();
                    aborted = true;
                    continue;
                }
            };
            let Some(joined) = joined else { break };
            match joined {
                Ok((name, Ok(()))) => info!(controller = %name, "controller finished"),
                Ok((name, Err(e))) => {
                    error!(controller = %name, error = %e, "controller failed");
                    first_err.get_or_insert(e);
                }
                Err(e) if e.is_cancelled() => warn!("controller aborted"),
                Err(e) => error!(error = %e, "controller panicked"),
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
