//! Scripted provider used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse, TokenUsage};
use super::provider::LlmProvider;
use crate::error::OracleError;

#[derive(Clone)]
enum Step {
    Reply(String),
    Fail(OracleError),
}

#[derive(Default)]
struct Lane {
    steps: VecDeque<Step>,
    delay: Duration,
    requests: Vec<ChatRequest>,
}

/// Provider whose replies are scripted per deployment.
///
/// Each deployment plays its queued steps in order; the last step repeats
/// once the queue is down to one entry.
#[derive(Default)]
pub struct ScriptedProvider {
    lanes: Mutex<HashMap<String, Lane>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lanes(&self) -> MutexGuard<'_, HashMap<String, Lane>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(self, deployment: &str, step: Step) -> Self {
        self.lanes()
            .entry(deployment.to_string())
            .or_default()
            .steps
            .push_back(step);
        self
    }

    pub fn reply(self, deployment: &str, content: &str) -> Self {
        self.push(deployment, Step::Reply(content.to_string()))
    }

    pub fn fail(self, deployment: &str, error: OracleError) -> Self {
        self.push(deployment, Step::Fail(error))
    }

    pub fn delay(self, deployment: &str, delay: Duration) -> Self {
        self.lanes()
            .entry(deployment.to_string())
            .or_default()
            .delay = delay;
        self
    }

    pub fn calls(&self, deployment: &str) -> usize {
        self.lanes().get(deployment).map_or(0, |l| l.requests.len())
    }

    pub fn requests(&self, deployment: &str) -> Vec<ChatRequest> {
        self.lanes()
            .get(deployment)
            .map(|l| l.requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, OracleError> {
        let (step, delay) = {
            let mut lanes = self.lanes();
            let Some(lane) = lanes.get_mut(&request.model) else {
                return Err(OracleError::Unknown {
                    message: format!("no script for deployment {}", request.model),
                    status: None,
                });
            };
            lane.requests.push(request.clone());
            let step = if lane.steps.len() > 1 {
                lane.steps.pop_front()
            } else {
                lane.steps.front().cloned()
            };
            (step, lane.delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match step {
            Some(Step::Reply(content)) => Ok(ChatResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
                finish_reason: Some("stop".to_string()),
            }),
            Some(Step::Fail(error)) => Err(error),
            None => Err(OracleError::Unknown {
                message: format!("script exhausted for {}", request.model),
                status: None,
            }),
        }
    }
}
