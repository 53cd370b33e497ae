//! Bounded repair loop and one-shot improvement.
//!
//! When the current text fails to parse or render, the loop asks the
//! correction service for a fix, validates the candidate locally and adopts
//! it only once it passes. Invalid candidates become the input of the next
//! attempt together with their validation error. After
//! [`MAX_REPAIR_ATTEMPTS`] the loop gives up and the controller keeps the
//! text it had before the loop started.

use crate::collab::{CorrectionRequest, CorrectionService, Validator};
use crate::error::{CollaboratorError, SyncError};
use crate::sync::SyncController;
use std::time::Duration;

pub const MAX_REPAIR_ATTEMPTS: u32 = 3;

/// Progress of a repair run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RepairState {
    #[default]
    Idle,
    Attempting(u32),
    Succeeded {
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        last_error: String,
    },
}

impl RepairState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RepairState::Succeeded { .. } | RepairState::Exhausted { .. }
        )
    }
}

/// Drives repair attempts against a correction service.
pub struct RepairLoop {
    max_attempts: u32,
    delay: Duration,
    state: RepairState,
    /// Every state the last run passed through, in order.
    history: Vec<RepairState>,
}

impl RepairLoop {
    pub fn new(delay: Duration) -> Self {
        Self {
            max_attempts: MAX_REPAIR_ATTEMPTS,
            delay,
            state: RepairState::Idle,
            history: Vec::new(),
        }
    }

    /// Loop configured from the controller's editor settings.
    pub fn for_controller(controller: &SyncController) -> Self {
        Self::new(controller.config().repair_delay)
    }

    pub fn state(&self) -> &RepairState {
        &self.state
    }

    pub fn history(&self) -> &[RepairState] {
        &self.history
    }

    fn transition(&mut self, state: RepairState) {
        log::debug!("repair: {:?} -> {:?}", self.state, state);
        self.history.push(state.clone());
        self.state = state;
    }

    /// Run the loop to completion. Returns the final state; `Err` only when
    /// the controller could not enter the fixing state.
    pub async fn run(
        &mut self,
        controller: &mut SyncController,
        service: &impl CorrectionService,
        validator: &impl Validator,
    ) -> Result<RepairState, SyncError> {
        let ticket = controller.begin_repair()?;
        self.history.clear();
        self.transition(RepairState::Idle);

        let category = ticket.category;
        let mut content = ticket.text;
        let mut error = ticket
            .error
            .or_else(|| validator.validate(category, &content).err());
        log::info!(
            "repairing {category} diagram: {}",
            error.as_deref().unwrap_or("no recorded error")
        );

        for attempt in 1..=self.max_attempts {
            self.transition(RepairState::Attempting(attempt));
            let request = CorrectionRequest {
                content: content.clone(),
                category,
                error_message: error.clone(),
            };

            match service.correct(request).await {
                Ok(response) => match response.candidate() {
                    Some(candidate) => match validator.validate(category, candidate) {
                        Ok(()) => match controller.adopt_candidate(candidate) {
                            Ok(()) => {
                                controller.end_repair(None);
                                log::info!("repair succeeded after {attempt} attempt(s)");
                                let done = RepairState::Succeeded { attempts: attempt };
                                self.transition(done.clone());
                                return Ok(done);
                            }
                            Err(err) => {
                                content = candidate.to_string();
                                error = Some(err.to_string());
                            }
                        },
                        Err(reason) => {
                            log::warn!("repair attempt {attempt} still invalid: {reason}");
                            content = candidate.to_string();
                            error = Some(reason);
                        }
                    },
                    None => {
                        let reason = response
                            .error
                            .unwrap_or_else(|| "correction service returned no content".into());
                        log::warn!("repair attempt {attempt} produced nothing: {reason}");
                        error = Some(reason);
                    }
                },
                Err(err) => {
                    log::warn!("repair attempt {attempt} failed: {err}");
                    error = Some(err.to_string());
                }
            }

            if attempt < self.max_attempts && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        let last_error = error.unwrap_or_else(|| "repair failed".into());
        log::warn!(
            "giving up after {} attempt(s): {last_error}",
            self.max_attempts
        );
        controller.end_repair(Some(last_error.clone()));
        let done = RepairState::Exhausted {
            attempts: self.max_attempts,
            last_error,
        };
        self.transition(done.clone());
        Ok(done)
    }
}

/// Repair the controller's diagram with the default attempt budget.
pub async fn repair(
    controller: &mut SyncController,
    service: &impl CorrectionService,
    validator: &impl Validator,
) -> Result<RepairState, SyncError> {
    RepairLoop::for_controller(controller)
        .run(controller, service, validator)
        .await
}

/// Ask the correction service for an improved version of valid text.
///
/// A single request with no error message. The reply is adopted only if it
/// validates; otherwise the diagram is left as it was.
pub async fn improve(
    controller: &mut SyncController,
    service: &impl CorrectionService,
    validator: &impl Validator,
) -> Result<(), SyncError> {
    let ticket = controller.begin_repair()?;
    let request = CorrectionRequest {
        content: ticket.text,
        category: ticket.category,
        error_message: None,
    };
    let result = match service.correct(request).await {
        Ok(response) => match response.candidate() {
            Some(candidate) => match validator.validate(ticket.category, candidate) {
                Ok(()) => controller.adopt_candidate(candidate),
                Err(reason) => Err(SyncError::NotRenderable(reason)),
            },
            None => Err(CollaboratorError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "no improved content".into()),
            )
            .into()),
        },
        Err(err) => Err(err.into()),
    };
    controller.end_repair(None);
    match &result {
        Ok(()) => log::info!("improved {} diagram", ticket.category),
        Err(err) => log::warn!("improve failed: {err}"),
    }
    result
}
