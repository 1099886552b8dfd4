// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The session event loop: drives the transport, keeps publish requests
//! outstanding, renews the channel token, keeps the session alive when idle, and
//! reconnects with backoff after failures.

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use ualite_types::StatusCode;

use crate::{
    retry::SessionRetryPolicy,
    transport::{SecureChannelEventLoop, TransportPollResult},
};

use super::{services::subscriptions::state::NotificationOutcome, Session, SessionState};

// Republish attempts per detected gap before giving up on it.
const MAX_REPUBLISH_ATTEMPTS: u32 = 5;
// Cadence of the housekeeping tick driving renewal, staleness and keep-alive.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Things that happen as the loop runs; exposed for observability in tests and
/// diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPollResult {
    /// The transport made progress.
    Transport(TransportPollResult),
    /// A publish response was handled.
    Publish,
    /// The connection was lost with the given status.
    ConnectionLost(StatusCode),
    /// A new connection was established and the session activated.
    Reconnected,
}

enum BackgroundOutcome {
    Publish(Result<NotificationOutcome, StatusCode>),
    Republish {
        subscription_id: u32,
        sequence_number: u32,
        attempt: u32,
        result: Result<(), StatusCode>,
    },
    Recreate(u32, Result<u32, StatusCode>),
    Renew(Result<(), StatusCode>),
    KeepAlive(Result<(), StatusCode>),
}

type BackgroundFuture = BoxFuture<'static, BackgroundOutcome>;

/// Owns the connection lifecycle of one [`Session`]. Poll it by spawning
/// [`SessionEventLoop::run`]; the session serves no calls unless this runs.
pub struct SessionEventLoop {
    session: Arc<Session>,
    retry: SessionRetryPolicy,
}

impl SessionEventLoop {
    pub(crate) fn new(session: Arc<Session>, retry: SessionRetryPolicy) -> SessionEventLoop {
        SessionEventLoop { session, retry }
    }

    /// Spawn the loop onto the tokio runtime, returning its handle. The loop ends
    /// with the final status when the session is closed or retries are exhausted.
    pub fn spawn(self) -> JoinHandle<StatusCode> {
        tokio::spawn(self.run())
    }

    /// Run the loop to completion: connect, serve, reconnect on failure with
    /// exponential backoff, until the session is deliberately closed.
    pub async fn run(self) -> StatusCode {
        let mut backoff = self.retry.new_backoff();
        loop {
            if self.session.should_close() {
                self.session.set_state(SessionState::Closed);
                return StatusCode::Good;
            }
            self.session.set_state(SessionState::Connecting);
            match self.connect_and_activate().await {
                Ok(event_loop) => {
                    info!("Session established");
                    // A fresh outage gets a fresh backoff
                    backoff = self.retry.new_backoff();
                    self.session.set_state(SessionState::Connected);
                    let status = self.run_connected(event_loop).await;
                    self.session.set_state(SessionState::Disconnected);
                    if self.session.should_close() {
                        self.session.set_state(SessionState::Closed);
                        return status;
                    }
                    warn!("Connection lost: {}", status);
                }
                Err(status) => {
                    warn!("Connection attempt failed: {}", status);
                    let Some(delay) = backoff.next() else {
                        error!("Giving up after exhausting reconnect attempts");
                        self.session.set_state(SessionState::Closed);
                        return status;
                    };
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Open the channel, create and activate the session and reattach any
    /// subscriptions, polling the transport ourselves throughout.
    async fn connect_and_activate(&self) -> Result<SecureChannelEventLoop, StatusCode> {
        let mut event_loop = self.session.channel.connect().await?;
        let session = self.session.clone();
        let setup = async move {
            session.create_session().await?;
            session.activate_session().await?;
            session.invalidate_operational_limits();
            session.recreate_all_subscriptions().await?;
            Ok::<(), StatusCode>(())
        };
        tokio::pin!(setup);
        loop {
            tokio::select! {
                r = &mut setup => {
                    r?;
                    break;
                }
                r = event_loop.poll() => {
                    if let TransportPollResult::Closed(status) = r {
                        return Err(status);
                    }
                }
            }
        }
        Ok(event_loop)
    }

    async fn run_connected(&self, mut event_loop: SecureChannelEventLoop) -> StatusCode {
        let mut background: FuturesUnordered<BackgroundFuture> = FuturesUnordered::new();
        let mut publish_in_flight = 0usize;
        // Lowered when the server pushes back with BadTooManyPublishRequests
        let mut publish_cap = self.session.config.max_inflight_publish.max(1);
        let mut recreating: HashSet<u32> = HashSet::new();
        let mut renewing = false;
        let mut keep_alive_in_flight = false;
        let mut last_activity = Instant::now();
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            // Keep the target number of publish requests outstanding
            let target = self.publish_target(publish_cap);
            while publish_in_flight < target {
                let session = self.session.clone();
                background.push(
                    async move { BackgroundOutcome::Publish(session.publish_once().await) }
                        .boxed(),
                );
                publish_in_flight += 1;
                last_activity = Instant::now();
            }

            tokio::select! {
                r = event_loop.poll() => {
                    if let TransportPollResult::Closed(status) = r {
                        return status;
                    }
                }
                Some(outcome) = background.next(), if !background.is_empty() => {
                    match outcome {
                        BackgroundOutcome::Publish(result) => {
                            publish_in_flight -= 1;
                            if let Some(status) = self.handle_publish_outcome(
                                result,
                                &mut background,
                                &mut publish_cap,
                                &mut recreating,
                            ) {
                                return status;
                            }
                        }
                        BackgroundOutcome::Republish { subscription_id, sequence_number, attempt, result } => {
                            if let Err(status) = result {
                                if attempt < MAX_REPUBLISH_ATTEMPTS
                                    && status != StatusCode::BadMessageNotAvailable
                                {
                                    self.push_republish(
                                        &mut background,
                                        subscription_id,
                                        sequence_number,
                                        attempt + 1,
                                    );
                                } else {
                                    warn!(
                                        "Giving up republishing {} on subscription {}: {}",
                                        sequence_number, subscription_id, status
                                    );
                                }
                            }
                        }
                        BackgroundOutcome::Recreate(old_id, result) => {
                            recreating.remove(&old_id);
                            match result {
                                Ok(new_id) => debug!("Subscription {} recreated as {}", old_id, new_id),
                                Err(status) => warn!("Could not recreate subscription {}: {}", old_id, status),
                            }
                        }
                        BackgroundOutcome::Renew(result) => {
                            renewing = false;
                            if let Err(status) = result {
                                error!("Token renewal failed: {}", status);
                                return status;
                            }
                        }
                        BackgroundOutcome::KeepAlive(result) => {
                            keep_alive_in_flight = false;
                            if let Err(status) = result {
                                warn!("Keep-alive failed: {}", status);
                            }
                        }
                    }
                }
                _ = tick.tick() => {
                    if self.session.should_close() {
                        return StatusCode::Good;
                    }
                    // Renew the channel token at 75% of its lifetime
                    if !renewing && self.session.channel.should_renew_security_token() {
                        renewing = true;
                        let session = self.session.clone();
                        background.push(async move {
                            BackgroundOutcome::Renew(session.channel.renew_security_token().await)
                        }.boxed());
                    }
                    // Subscriptions silent beyond their lifetime are recreated
                    let now = Instant::now();
                    for id in self.session.subscriptions.lock().stale_subscriptions(now) {
                        if recreating.insert(id) {
                            warn!("Subscription {} went silent, recreating it", id);
                            let session = self.session.clone();
                            background.push(async move {
                                BackgroundOutcome::Recreate(id, session.recreate_subscription(id).await)
                            }.boxed());
                        }
                    }
                    // An idle session needs the occasional touch to stay alive
                    if !keep_alive_in_flight
                        && publish_in_flight == 0
                        && now.duration_since(last_activity) >= self.session.config.keep_alive_interval()
                    {
                        keep_alive_in_flight = true;
                        last_activity = now;
                        let session = self.session.clone();
                        background.push(async move {
                            BackgroundOutcome::KeepAlive(session.keep_alive().await)
                        }.boxed());
                    }
                }
            }
        }
    }

    fn publish_target(&self, publish_cap: usize) -> usize {
        let subscriptions = self.session.subscriptions.lock();
        if subscriptions.is_empty() {
            0
        } else {
            (2 * subscriptions.len()).max(2).min(publish_cap)
        }
    }

    // Returns a status when the failure is fatal to the connection.
    fn handle_publish_outcome(
        &self,
        result: Result<NotificationOutcome, StatusCode>,
        background: &mut FuturesUnordered<BackgroundFuture>,
        publish_cap: &mut usize,
        recreating: &mut HashSet<u32>,
    ) -> Option<StatusCode> {
        match result {
            Ok(outcome) => {
                for (subscription_id, sequence_number) in outcome
                    .missing
                    .iter()
                    .filter_map(|seq| outcome.subscription_id.map(|id| (id, *seq)))
                {
                    self.push_republish(background, subscription_id, sequence_number, 1);
                }
                if outcome.recreate {
                    if let Some(id) = outcome.subscription_id {
                        if recreating.insert(id) {
                            let session = self.session.clone();
                            background.push(async move {
                                BackgroundOutcome::Recreate(
                                    id,
                                    session.recreate_subscription(id).await,
                                )
                            }.boxed());
                        }
                    }
                }
                None
            }
            Err(status) => match status.sub_code() {
                // The server holds publish requests until something happens; a
                // timeout just re-arms on the next pass
                StatusCode::BadTimeout => None,
                StatusCode::BadTooManyPublishRequests => {
                    *publish_cap = (*publish_cap - 1).max(1);
                    debug!("Server limited publish requests, cap is now {}", publish_cap);
                    None
                }
                StatusCode::BadNoSubscription => {
                    // Server side lost the subscriptions; recreate what we have
                    for id in self.session.subscriptions.lock().subscription_ids() {
                        if recreating.insert(id) {
                            let session = self.session.clone();
                            background.push(async move {
                                BackgroundOutcome::Recreate(
                                    id,
                                    session.recreate_subscription(id).await,
                                )
                            }.boxed());
                        }
                    }
                    None
                }
                StatusCode::BadSessionClosed
                | StatusCode::BadSessionIdInvalid
                | StatusCode::BadSecureChannelClosed
                | StatusCode::BadSecureChannelTokenUnknown
                | StatusCode::BadConnectionClosed
                | StatusCode::BadNotConnected => Some(status),
                _ => {
                    warn!("Publish failed: {}", status);
                    None
                }
            },
        }
    }

    fn push_republish(
        &self,
        background: &mut FuturesUnordered<BackgroundFuture>,
        subscription_id: u32,
        sequence_number: u32,
        attempt: u32,
    ) {
        let session = self.session.clone();
        background.push(
            async move {
                BackgroundOutcome::Republish {
                    subscription_id,
                    sequence_number,
                    attempt,
                    result: session.republish(subscription_id, sequence_number).await,
                }
            }
            .boxed(),
        );
    }
}
