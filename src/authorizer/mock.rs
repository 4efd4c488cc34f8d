//! Scripted authorizer for tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::client::{AuthCallError, AuthResponse, Authorizer};
use crate::core_types::OwnerId;

/// Behaviour of one remote call
#[derive(Debug, Clone)]
pub enum Step {
    Respond(AuthResponse),
    Fail(AuthCallError),
    /// Never answers; only the gateway's timeout ends it
    Hang,
    Panic,
}

pub struct ScriptedAuthorizer {
    script: Mutex<VecDeque<Step>>,
    otherwise: Step,
    calls: AtomicUsize,
}

impl ScriptedAuthorizer {
    /// Play `steps` in order, then fail with a connection error
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            otherwise: Step::Fail(AuthCallError::Connect("script exhausted".into())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every call with `step`
    pub fn always(step: Step) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            otherwise: step,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for ScriptedAuthorizer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn check(&self, _owner_id: OwnerId, _amount: Decimal) -> Result<AuthResponse, AuthCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone());

        match step {
            Step::Respond(response) => Ok(response),
            Step::Fail(e) => Err(e),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(AuthCallError::Timeout)
            }
            Step::Panic => panic!("scripted authorizer panic"),
        }
    }
}
