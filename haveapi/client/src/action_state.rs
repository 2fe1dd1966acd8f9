//! Progress tracking of blocking actions.
//!
//! A blocking action returns right away with `action_state_id` in its
//! response meta. [`ActionStateWaiter`] polls the `action_state` resource
//! until the state reports `finished`, the caller's callback stops it, or
//! the local timeout runs out. Giving up never cancels the action on the
//! server; that is what [`ActionStateWaiter::cancel`] is for.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use haveapi_schema::{parse_datetime, Params};

use crate::client::Client;
use crate::error::{ApiError, ProtocolError};
use crate::graph::Resource;
use crate::response::ActionResponse;

const ACTION_STATE_RESOURCE: &str = "action_state";
const DEFAULT_INTERVAL_SECS: u64 = 3;

/// State of a long-running action as reported by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionState {
    pub id: i64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub finished: bool,
    /// Whether the action succeeded so far.
    #[serde(default = "succeeded")]
    pub status: bool,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub current: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total: u64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub can_cancel: bool,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn succeeded() -> bool {
    true
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .as_deref()
        .and_then(parse_datetime)
        .map(|dt| dt.with_timezone(&Utc)))
}

impl ActionState {
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        serde_json::from_value(value)
            .map_err(|e| ProtocolError::MalformedEnvelope(format!("action state: {e}")).into())
    }

    pub(crate) fn from_response(response: &ActionResponse) -> Result<Self, ApiError> {
        Self::from_value(response.payload().cloned().unwrap_or(Value::Null))
    }

    pub(crate) fn list_from(response: &ActionResponse) -> Result<Vec<Self>, ApiError> {
        match response.payload() {
            Some(Value::Array(items)) => items.iter().cloned().map(Self::from_value).collect(),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(ProtocolError::UnexpectedOutput {
                expected: "list of action states".to_string(),
                actual: other.to_string(),
            }
            .into()),
        }
    }

    /// Placeholder for a state that was never polled successfully.
    fn unpolled(id: i64) -> Self {
        Self {
            id,
            label: None,
            finished: false,
            status: true,
            current: 0,
            total: 0,
            unit: None,
            can_cancel: false,
            created_at: None,
            updated_at: None,
        }
    }

    /// Completed share of the work, when the total is known.
    pub fn progress(&self) -> Option<f64> {
        (self.total > 0).then(|| self.current as f64 / self.total as f64)
    }
}

/// What the progress callback wants the waiter to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitControl {
    Continue,
    Stop,
}

/// How waiting ended. None of these is an error; the action itself may
/// still have failed, see [`ActionState::status`].
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Finished(ActionState),
    /// The local timeout ran out; the action keeps running.
    TimedOut(ActionState),
    /// The progress callback returned [`WaitControl::Stop`].
    Stopped(ActionState),
}

impl WaitOutcome {
    /// The last state seen.
    pub fn state(&self) -> &ActionState {
        match self {
            Self::Finished(state) | Self::TimedOut(state) | Self::Stopped(state) => state,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// Finished and successful.
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Finished(state) if state.status)
    }
}

/// Polls an action state until it finishes.
#[derive(Debug, Clone)]
pub struct ActionStateWaiter {
    interval: Duration,
    timeout: Option<Duration>,
    update_in: Option<Duration>,
}

impl Default for ActionStateWaiter {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            timeout: None,
            update_in: None,
        }
    }
}

impl ActionStateWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum time between two polls. Also sent as the server's long-poll
    /// budget, capped by whatever is left of the timeout.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Gives up after this long, returning [`WaitOutcome::TimedOut`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Asks the server to answer a poll early once progress has changed and
    /// at least this much time has passed.
    pub fn update_in(mut self, update_in: Duration) -> Self {
        self.update_in = Some(update_in);
        self
    }

    /// Waits until the action finishes or the timeout runs out.
    pub async fn wait(&self, client: &Client, id: i64) -> Result<WaitOutcome, ApiError> {
        self.wait_with(client, id, |_| WaitControl::Continue).await
    }

    /// Waits, passing every polled state to `progress` first.
    ///
    /// Dropping the returned future abandons the loop; nothing is left
    /// behind locally and the action keeps running on the server.
    pub async fn wait_with<F>(&self, client: &Client, id: i64, mut progress: F) -> Result<WaitOutcome, ApiError>
    where
        F: FnMut(&ActionState) -> WaitControl + Send,
    {
        let resource = client.resource(ACTION_STATE_RESOURCE)?.arg(id);
        let started = Instant::now();
        let mut last: Option<ActionState> = None;

        loop {
            let round = Instant::now();
            let remaining = self.timeout.map(|t| t.saturating_sub(started.elapsed()));
            let budget = remaining.map_or(self.interval, |r| r.min(self.interval));
            let poll = self.poll_once(&resource, last.as_ref(), budget);
            let polled = match remaining {
                Some(remaining) => timeout(remaining, poll).await.ok(),
                None => Some(poll.await),
            };
            let Some(polled) = polled else {
                debug!(action_state = id, "poll outlasted the wait timeout");
                return Ok(WaitOutcome::TimedOut(
                    last.unwrap_or_else(|| ActionState::unpolled(id)),
                ));
            };
            let state = polled?;
            debug!(
                action_state = id,
                finished = state.finished,
                current = state.current,
                total = state.total,
                "action state polled"
            );

            let control = progress(&state);
            if state.finished {
                return Ok(WaitOutcome::Finished(state));
            }
            if control == WaitControl::Stop {
                return Ok(WaitOutcome::Stopped(state));
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    return Ok(WaitOutcome::TimedOut(state));
                }
            }

            let mut pause = self.interval.saturating_sub(round.elapsed());
            if let Some(limit) = self.timeout {
                pause = pause.min(limit.saturating_sub(started.elapsed()));
            }
            if !pause.is_zero() {
                sleep(pause).await;
            }
            last = Some(state);
        }
    }

    /// Asks the server to cancel the action.
    pub async fn cancel(client: &Client, id: i64) -> Result<ActionResponse, ApiError> {
        client
            .resource(ACTION_STATE_RESOURCE)?
            .arg(id)
            .call("cancel", Params::new())
            .await
    }

    /// One poll round. `budget` is how long the server may hold the request.
    async fn poll_once(
        &self,
        resource: &Resource,
        last: Option<&ActionState>,
        budget: Duration,
    ) -> Result<ActionState, ApiError> {
        let response = match resource.action("poll") {
            Ok(poll) => {
                let mut params = Params::new().set("timeout", budget.as_secs_f64());
                if let (Some(update_in), Some(last)) = (self.update_in, last) {
                    params.insert("update_in", update_in.as_secs_f64());
                    params.insert("status", last.status);
                    params.insert("current", last.current);
                    params.insert("total", last.total);
                }
                poll.call(params).await?
            }
            Err(ApiError::ObjectNotFound { .. }) => resource.call("show", Params::new()).await?,
            Err(e) => return Err(e),
        };
        ActionState::from_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_state() {
        let state = ActionState::from_value(json!({
            "id": 12,
            "label": "Migrate",
            "finished": false,
            "status": true,
            "current": 3,
            "total": 4,
            "unit": "steps",
            "can_cancel": true,
            "created_at": "2024-05-01T10:00:00+02:00",
            "updated_at": null
        }))
        .unwrap();
        assert_eq!(state.id, 12);
        assert_eq!(state.progress(), Some(0.75));
        assert_eq!(
            state.created_at.unwrap().to_rfc3339(),
            "2024-05-01T08:00:00+00:00"
        );
        assert!(state.updated_at.is_none());
    }

    #[test]
    fn test_defaults() {
        let state = ActionState::from_value(json!({"id": 1, "current": null})).unwrap();
        assert!(!state.finished);
        assert!(state.status);
        assert_eq!(state.current, 0);
        assert_eq!(state.progress(), None);
    }

    #[test]
    fn test_outcome() {
        let state = ActionState::from_value(json!({"id": 1, "finished": true, "status": false})).unwrap();
        let outcome = WaitOutcome::Finished(state.clone());
        assert!(outcome.is_finished());
        assert!(!outcome.succeeded());
        assert_eq!(WaitOutcome::TimedOut(state.clone()).state(), &state);
    }
}
