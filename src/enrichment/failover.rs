//! Credential/model failover.
//!
//! # State Machine
//!
//! The state is a (credential index, model index) pair over an ordered
//! credential list and an ordered model list. Failures move it:
//!
//! - `InvalidCredential`: the credential is marked unusable. If an
//!   unthrottled credential is configured and not yet active, it is appended
//!   and becomes current. Otherwise the next usable credential becomes
//!   current, model unchanged.
//! - `QuotaExceeded`: next usable credential; on wrap-around the model index
//!   also advances (wrapping). Every credential is tried on a model before
//!   escalating to the next one.
//! - anything else is handed back to the caller untouched.
//!
//! Success leaves the state alone, so the next segment starts on the pair
//! that last worked. Within one attempt (`begin_attempt`) each route is
//! tried at most once; landing on a route already tried in the attempt
//! means the attempt is exhausted.

use std::collections::HashSet;

use crate::core::errors::FailureKind;
use crate::llm::{Credential, ModelCandidate};

/// The pair to call next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub credential: Credential,
    pub model: ModelCandidate,
    /// The credential is the unthrottled fallback.
    pub unthrottled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A fresh route is current; try it.
    Retry,
    /// Not a routing failure. The caller's retry loop owns it.
    Propagate,
    /// No untried usable route is left in this attempt.
    Exhausted,
}

#[derive(Debug)]
pub struct FailoverPolicy {
    credentials: Vec<Credential>,
    models: Vec<ModelCandidate>,
    unthrottled: Option<Credential>,
    unthrottled_model: Option<ModelCandidate>,
    key_index: usize,
    model_index: usize,
    unusable: HashSet<Credential>,
    tried: HashSet<(Credential, String)>,
}

impl FailoverPolicy {
    /// `unthrottled_model` is the model used whenever the unthrottled
    /// credential is current; `None` means the first candidate.
    ///
    /// With no rotating credentials the unthrottled one starts active.
    pub fn new(
        credentials: Vec<Credential>,
        models: Vec<ModelCandidate>,
        unthrottled: Option<Credential>,
        unthrottled_model: Option<ModelCandidate>,
    ) -> Self {
        let mut credentials = credentials;
        if credentials.is_empty() {
            if let Some(fallback) = &unthrottled {
                credentials.push(fallback.clone());
            }
        }
        Self {
            credentials,
            models,
            unthrottled,
            unthrottled_model,
            key_index: 0,
            model_index: 0,
            unusable: HashSet::new(),
            tried: HashSet::new(),
        }
    }

    /// `(credential index, model index)`.
    pub fn indices(&self) -> (usize, usize) {
        (self.key_index, self.model_index)
    }

    pub fn active_credentials(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn is_unusable(&self, credential: &Credential) -> bool {
        self.unusable.contains(credential)
    }

    /// True once no credential can ever be used again.
    pub fn is_exhausted(&self) -> bool {
        self.models.is_empty() || self.credentials.iter().all(|c| self.unusable.contains(c))
    }

    pub fn current(&self) -> Option<Route> {
        let credential = self.credentials.get(self.key_index)?;
        if self.unusable.contains(credential) {
            return None;
        }
        let unthrottled = self.is_unthrottled(credential);
        let model = if unthrottled {
            self.unthrottled_model
                .clone()
                .or_else(|| self.models.first().cloned())?
        } else {
            self.models.get(self.model_index)?.clone()
        };
        Some(Route {
            credential: credential.clone(),
            model,
            unthrottled,
        })
    }

    /// Starts a fresh attempt; routes tried earlier become eligible again.
    pub fn begin_attempt(&mut self) {
        self.tried.clear();
    }

    /// Sticky: the state already points at the pair that worked.
    pub fn on_success(&mut self) {
        self.tried.clear();
    }

    pub fn on_failure(&mut self, kind: FailureKind) -> Transition {
        let Some(failed) = self.current() else {
            return Transition::Exhausted;
        };

        match kind {
            FailureKind::InvalidCredential => {
                self.tried.insert((failed.credential.clone(), failed.model.id.clone()));
                self.unusable.insert(failed.credential.clone());
                if !self.engage_unthrottled() && !self.advance_credential(false) {
                    return Transition::Exhausted;
                }
            }
            FailureKind::QuotaExceeded => {
                self.tried.insert((failed.credential.clone(), failed.model.id.clone()));
                if !self.advance_credential(true) {
                    return Transition::Exhausted;
                }
            }
            FailureKind::MalformedOutput | FailureKind::Transient => return Transition::Propagate,
        }

        match self.current().map(|next| (next.credential, next.model.id)) {
            Some(key) if !self.tried.contains(&key) => Transition::Retry,
            _ => Transition::Exhausted,
        }
    }

    fn is_unthrottled(&self, credential: &Credential) -> bool {
        self.unthrottled.as_ref() == Some(credential)
    }

    /// Appends the unthrottled credential and jumps to it, once.
    fn engage_unthrottled(&mut self) -> bool {
        let Some(fallback) = self.unthrottled.clone() else {
            return false;
        };
        if self.credentials.contains(&fallback) || self.unusable.contains(&fallback) {
            return false;
        }
        self.credentials.push(fallback);
        self.key_index = self.credentials.len() - 1;
        true
    }

    /// Moves to the next usable credential. With `escalate`, wrapping past
    /// the end also advances the model. Returns false when nothing is usable.
    fn advance_credential(&mut self, escalate: bool) -> bool {
        let len = self.credentials.len();
        if len == 0 || self.models.is_empty() {
            return false;
        }

        let mut index = self.key_index;
        let mut wrapped = false;
        for _ in 0..len {
            index += 1;
            if index >= len {
                index = 0;
                wrapped = true;
            }
            if !self.unusable.contains(&self.credentials[index]) {
                self.key_index = index;
                if wrapped && escalate {
                    self.model_index = (self.model_index + 1) % self.models.len();
                }
                return true;
            }
        }
        false
    }
}
