//! In-memory participant records and the rules for changing them.
//!
//! Mutations are split in two: `plan_*` checks a request against the current
//! records and produces the [`RegistryEvent`] that would satisfy it, and
//! [`Records::apply`] makes the change. The store journals the event between the
//! two steps, so a record is only ever visible once its event is durable.

use std::collections::HashMap;

use chrono::Utc;

use super::{RegisterError, StoreError};
use crate::persistence::RegistryEvent;
use crate::types::{AttendanceStatus, NewParticipant, Participant, ParticipantId, QrToken};

/// What a compare-and-set would do.
pub(super) enum Plan {
    Commit(RegistryEvent),
    Conflict(Participant),
}

#[derive(Debug, Default)]
pub(super) struct Records {
    by_id: HashMap<ParticipantId, Participant>,
    /// Every token ever issued, mapped to its owner.
    by_token: HashMap<QrToken, ParticipantId>,
}

impl Records {
    pub(super) fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.by_id.get(id)
    }

    pub(super) fn find_by_token(&self, token: &str) -> Option<&Participant> {
        self.by_token
            .get(&QrToken::new(token))
            .and_then(|id| self.by_id.get(id))
    }

    pub(super) fn list(&self) -> Vec<Participant> {
        let mut all: Vec<Participant> = self.by_id.values().cloned().collect();
        all.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    pub(super) fn plan_register(
        &self,
        new: NewParticipant,
    ) -> Result<RegistryEvent, RegisterError> {
        let participant = Participant::registered(new, Utc::now());
        if self.by_id.contains_key(&participant.id) {
            return Err(RegisterError::DuplicateId(participant.id));
        }
        if self.by_token.contains_key(&participant.qr_token) {
            return Err(RegisterError::DuplicateToken(participant.qr_token));
        }
        Ok(RegistryEvent::Registered { participant })
    }

    pub(super) fn plan_status(
        &self,
        id: &ParticipantId,
        expected: AttendanceStatus,
        new: AttendanceStatus,
    ) -> Result<Plan, StoreError> {
        if !expected.can_advance_to(new) {
            return Err(StoreError::IllegalTransition {
                from: expected,
                to: new,
            });
        }
        let current = self
            .by_id
            .get(id)
            .ok_or_else(|| StoreError::UnknownParticipant(id.clone()))?;
        if current.status != expected {
            return Ok(Plan::Conflict(current.clone()));
        }
        Ok(Plan::Commit(RegistryEvent::StatusChanged {
            id: id.clone(),
            from: expected,
            to: new,
        }))
    }

    pub(super) fn plan_gift(&self, id: &ParticipantId) -> Result<Plan, StoreError> {
        let current = self
            .by_id
            .get(id)
            .ok_or_else(|| StoreError::UnknownParticipant(id.clone()))?;
        if current.gift_redeemed {
            return Ok(Plan::Conflict(current.clone()));
        }
        Ok(Plan::Commit(RegistryEvent::GiftRedeemed { id: id.clone() }))
    }

    pub(super) fn plan_reissue(
        &self,
        id: &ParticipantId,
        token: QrToken,
    ) -> Result<RegistryEvent, RegisterError> {
        if !self.by_id.contains_key(id) {
            return Err(RegisterError::UnknownParticipant(id.clone()));
        }
        if self.by_token.contains_key(&token) {
            return Err(RegisterError::DuplicateToken(token));
        }
        Ok(RegistryEvent::TokenReissued {
            id: id.clone(),
            token,
        })
    }

    /// Applies an event and returns the affected record.
    ///
    /// Events produced by `plan_*` always apply. Replayed events are checked the
    /// same way, so a journal that doesn't describe a valid history is rejected.
    pub(super) fn apply(&mut self, event: RegistryEvent) -> Result<Participant, StoreError> {
        match event {
            RegistryEvent::Registered { participant } => {
                if self.by_id.contains_key(&participant.id)
                    || self.by_token.contains_key(&participant.qr_token)
                {
                    return Err(StoreError::Unavailable(format!(
                        "journal registers {} twice",
                        participant.id
                    )));
                }
                self.by_token
                    .insert(participant.qr_token.clone(), participant.id.clone());
                self.by_id.insert(participant.id.clone(), participant.clone());
                Ok(participant)
            }
            RegistryEvent::StatusChanged { id, from, to } => {
                let record = self.record_mut(&id)?;
                if record.status != from || !from.can_advance_to(to) {
                    return Err(StoreError::IllegalTransition {
                        from: record.status,
                        to,
                    });
                }
                record.status = to;
                Ok(record.clone())
            }
            RegistryEvent::GiftRedeemed { id } => {
                let record = self.record_mut(&id)?;
                record.gift_redeemed = true;
                Ok(record.clone())
            }
            RegistryEvent::TokenReissued { id, token } => {
                let record = self.record_mut(&id)?;
                record.qr_token = token.clone();
                let updated = record.clone();
                self.by_token.insert(token, id);
                Ok(updated)
            }
        }
    }

    fn record_mut(&mut self, id: &ParticipantId) -> Result<&mut Participant, StoreError> {
        self.by_id
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownParticipant(id.clone()))
    }
}
