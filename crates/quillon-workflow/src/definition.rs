//! Workflow definitions.
//!
//! A [`Workflow`] is a finite state machine over one string-valued record
//! field. Definitions are declarative (stored alongside the resource
//! schema); transition handlers are attached in code and therefore excluded
//! from serialization.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::TransitionHandler;

/// Error type for workflow definition validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("workflow '{workflow}' has an empty state field")]
    EmptyStateField { workflow: String },

    #[error("workflow '{workflow}' has an empty starting state")]
    EmptyStartingState { workflow: String },

    #[error(
        "workflow '{workflow}' defines duplicate transition '{action}' from state '{from_state}'"
    )]
    DuplicateTransition {
        workflow: String,
        from_state: String,
        action: String,
    },
}

/// A notification to emit after a transition commits.
///
/// Directives are collected into the transition outcome rather than sent
/// inline; delivery happens after the record write succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDirective {
    /// Message template to render.
    #[serde(rename = "templateCode")]
    pub template_code: String,

    /// Recipient expressions (user ids or feature names, resolved by the
    /// notification layer).
    #[serde(default)]
    pub recipients: Vec<String>,
}

// ============================================================================
// Transition
// ============================================================================

/// One edge of the state machine.
#[derive(Clone, Serialize, Deserialize)]
pub struct Transition {
    /// State the record must currently be in.
    #[serde(rename = "fromState")]
    pub from_state: String,

    /// Workflow action code that triggers this transition. Action codes are
    /// free-form strings scoped to the workflow (`"submit"`, `"approve"`).
    #[serde(rename = "actionCode")]
    pub action_code: String,

    /// State the record moves to.
    #[serde(rename = "toState")]
    pub to_state: String,

    /// Notifications emitted after the transition commits.
    #[serde(default)]
    pub notifications: Vec<NotificationDirective>,

    /// Optional side-effect hook, attached in code.
    #[serde(skip)]
    pub handler: Option<Arc<dyn TransitionHandler>>,
}

impl Transition {
    pub fn new(
        from_state: impl Into<String>,
        action_code: impl Into<String>,
        to_state: impl Into<String>,
    ) -> Self {
        Self {
            from_state: from_state.into(),
            action_code: action_code.into(),
            to_state: to_state.into(),
            notifications: Vec::new(),
            handler: None,
        }
    }

    /// Attaches a side-effect handler.
    pub fn with_handler(mut self, handler: Arc<dyn TransitionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Adds a post-commit notification.
    pub fn with_notification(mut self, directive: NotificationDirective) -> Self {
        self.notifications.push(directive);
        self
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from_state", &self.from_state)
            .field("action_code", &self.action_code)
            .field("to_state", &self.to_state)
            .field("notifications", &self.notifications)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .finish()
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.from_state == other.from_state
            && self.action_code == other.action_code
            && self.to_state == other.to_state
            && self.notifications == other.notifications
    }
}

// ============================================================================
// Workflow
// ============================================================================

/// A state machine bound to one resource field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow identifier, unique per resource.
    pub code: String,

    /// Record field that holds the current state.
    #[serde(rename = "stateField")]
    pub state_field: String,

    /// State assigned to records that have not entered the workflow yet.
    #[serde(rename = "startingState")]
    pub starting_state: String,

    /// Terminal states. A record in a terminal state accepts no further
    /// transitions unless `can_rollback` is set.
    #[serde(rename = "endingStates", default)]
    pub ending_states: BTreeSet<String>,

    /// Whether transitions out of terminal states are allowed.
    #[serde(rename = "canRollback", default)]
    pub can_rollback: bool,

    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl Workflow {
    pub fn new(
        code: impl Into<String>,
        state_field: impl Into<String>,
        starting_state: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            state_field: state_field.into(),
            starting_state: starting_state.into(),
            ending_states: BTreeSet::new(),
            can_rollback: false,
            transitions: Vec::new(),
        }
    }

    pub fn with_ending_state(mut self, state: impl Into<String>) -> Self {
        self.ending_states.insert(state.into());
        self
    }

    pub fn with_rollback(mut self) -> Self {
        self.can_rollback = true;
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Validates the definition at registration time.
    ///
    /// The transition relation must be a function of `(from_state, action)`:
    /// duplicates are rejected here rather than resolved by iteration order
    /// at runtime.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.state_field.is_empty() {
            return Err(DefinitionError::EmptyStateField {
                workflow: self.code.clone(),
            });
        }
        if self.starting_state.is_empty() {
            return Err(DefinitionError::EmptyStartingState {
                workflow: self.code.clone(),
            });
        }
        let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
        for transition in &self.transitions {
            if !seen.insert((transition.from_state.as_str(), transition.action_code.as_str())) {
                return Err(DefinitionError::DuplicateTransition {
                    workflow: self.code.clone(),
                    from_state: transition.from_state.clone(),
                    action: transition.action_code.clone(),
                });
            }
        }
        Ok(())
    }

    /// Whether `state` is terminal.
    pub fn is_ending(&self, state: &str) -> bool {
        self.ending_states.contains(state)
    }

    /// Finds the transition for `(from_state, action)`, if defined.
    pub fn find_transition(&self, from_state: &str, action: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.from_state == from_state && t.action_code == action)
    }

    /// Action codes available from `state`, in definition order.
    ///
    /// Empty for a terminal state when rollback is disabled.
    pub fn actions_from(&self, state: &str) -> Vec<String> {
        if self.is_ending(state) && !self.can_rollback {
            return Vec::new();
        }
        self.transitions
            .iter()
            .filter(|t| t.from_state == state)
            .map(|t| t.action_code.clone())
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
