//! Session Owner Command Handlers
//!
//! Each handler runs one front-end request against the owner state and
//! describes what happened as an [`Outcome`]. Requests naming a contact or
//! message that does not exist are answered with `OperationFailed` here, so
//! an unknown id that reaches the lifecycle layer is a real defect.

use postern_core::{
    handshake::{apply_handshake, armor, dearmor, generate_handshake},
    lifecycle::{
        ack_inbound, compose, expire_inbound, open_inbound, unseal_on_handshake_complete, usage,
        Draft,
    },
    views::{ContactView, IdentityView, InboundView, OutboundView},
    AppEvent, Attachment, ContactId, MessageId, PosternError, PosternResult, Unsealer,
};
use rand_core::{CryptoRng, RngCore};
use tracing::{debug, info};

use super::state::{Outcome, OwnerState};

/// Command handlers for the session owner
pub struct CommandHandlers;

impl CommandHandlers {
    // ------------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------------

    /// Create a pending contact and hand out our key exchange for it
    pub fn handle_add_contact<R: RngCore + CryptoRng>(
        state: &mut OwnerState,
        name: &str,
        rng: &mut R,
    ) -> PosternResult<Outcome> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Outcome::failed("contact name is empty"));
        }

        let id = state.session.add_contact(name, rng)?;
        let key_exchange = armor(&generate_handshake(&mut state.session, id, rng)?);
        let contact = Self::contact_view(state, id)?;

        info!(contact = %id, name, "contact created");
        Ok(Outcome::mutation(vec![AppEvent::ContactCreated {
            contact,
            key_exchange,
        }]))
    }

    /// Show the key exchange of a contact that is still pending
    pub fn handle_show_key_exchange(state: &OwnerState, id: ContactId) -> PosternResult<Outcome> {
        let Some(contact) = state.session.contact(id) else {
            return Ok(Outcome::failed(format!("unknown contact {id}")));
        };
        match contact.kx_bytes() {
            Some(bytes) => Ok(Outcome::query(vec![AppEvent::KeyExchange {
                contact: id,
                key_exchange: armor(bytes),
            }])),
            None => Ok(Outcome::failed(format!(
                "contact {} has completed its key exchange",
                contact.name
            ))),
        }
    }

    /// Apply a peer's armored key exchange, then open its buffered messages
    pub fn handle_complete_contact(
        state: &mut OwnerState,
        id: ContactId,
        key_exchange: &str,
        unsealer: &dyn Unsealer,
    ) -> PosternResult<Outcome> {
        if state.session.contact(id).is_none() {
            return Ok(Outcome::failed(format!("unknown contact {id}")));
        }

        let bytes = dearmor(key_exchange)?;
        apply_handshake(&mut state.session, id, &bytes)?;
        let now = state.now();
        let report = unseal_on_handshake_complete(&mut state.session, id, unsealer, now)?;

        let mut events = vec![AppEvent::ContactActivated {
            contact: Self::contact_view(state, id)?,
            decoded: report.decoded.len(),
            discarded: report.discarded,
        }];
        events.extend(
            report
                .acked
                .into_iter()
                .map(|id| AppEvent::MessageAcked { id }),
        );
        Ok(Outcome::mutation(events))
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    pub fn handle_compose<R: RngCore + CryptoRng>(
        state: &mut OwnerState,
        to: ContactId,
        body: String,
        attachments: Vec<Attachment>,
        in_reply_to: Option<MessageId>,
        rng: &mut R,
    ) -> PosternResult<Outcome> {
        if state.session.contact(to).is_none() {
            return Ok(Outcome::failed(format!("unknown contact {to}")));
        }
        if let Some(inbound) = in_reply_to {
            if state.session.inbound(inbound).is_none() {
                return Ok(Outcome::failed(format!("unknown message {inbound}")));
            }
        }

        let draft = Draft {
            to,
            body: body.into_bytes(),
            attachments,
            in_reply_to,
        };
        let limit = state.config.messages.max_serialized_size;
        let now = state.now();
        let id = compose(&mut state.session, &state.queue, draft, limit, now, rng)?;

        Ok(Outcome::mutation(vec![AppEvent::MessageComposed { id, to }]))
    }

    pub fn handle_estimate_usage(
        state: &OwnerState,
        body: &str,
        is_reply: bool,
        attachments: &[Attachment],
    ) -> PosternResult<Outcome> {
        let limit = state.config.messages.max_serialized_size;
        let estimate = usage(body.as_bytes(), is_reply, attachments, limit)?;
        Ok(Outcome::query(vec![AppEvent::UsageEstimate {
            size: estimate.size,
            limit: estimate.limit,
        }]))
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    pub fn handle_ack_inbound<R: RngCore + CryptoRng>(
        state: &mut OwnerState,
        inbound: MessageId,
        rng: &mut R,
    ) -> PosternResult<Outcome> {
        if state.session.inbound(inbound).is_none() {
            return Ok(Outcome::failed(format!("unknown message {inbound}")));
        }

        let now = state.now();
        let limit = state.config.messages.max_serialized_size;
        match ack_inbound(&mut state.session, &state.queue, inbound, limit, now, rng)? {
            Some(ack) => Ok(Outcome::mutation(vec![AppEvent::AckQueued { inbound, ack }])),
            None => Ok(Outcome::failed(format!(
                "message {inbound} is already acknowledged"
            ))),
        }
    }

    pub fn handle_open_inbound(state: &mut OwnerState, id: MessageId) -> PosternResult<Outcome> {
        if state.session.inbound(id).is_none() {
            return Ok(Outcome::failed(format!("unknown message {id}")));
        }

        let lifetime = state.config.messages.lifetime();
        let message = open_inbound(&mut state.session, id, lifetime)?;
        Ok(Outcome::mutation(vec![AppEvent::InboundOpened { message }]))
    }

    pub fn handle_purge_expired(state: &mut OwnerState) -> PosternResult<Outcome> {
        let now = state.now();
        let removed = expire_inbound(&mut state.session, now, state.config.messages.lifetime());
        debug!(count = removed.len(), "purge finished");

        let mutated = !removed.is_empty();
        let events = vec![AppEvent::Expired { removed }];
        Ok(if mutated {
            Outcome::mutation(events)
        } else {
            Outcome::query(events)
        })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn handle_show_identity(state: &OwnerState) -> PosternResult<Outcome> {
        Ok(Outcome::query(vec![AppEvent::Identity {
            identity: IdentityView::of(&state.session.identity),
        }]))
    }

    pub fn handle_list_contacts(state: &OwnerState) -> PosternResult<Outcome> {
        let contacts = state.session.contacts().map(ContactView::of).collect();
        Ok(Outcome::query(vec![AppEvent::Contacts { contacts }]))
    }

    pub fn handle_list_inbox(state: &OwnerState) -> PosternResult<Outcome> {
        let lifetime = state.config.messages.lifetime();
        let messages = state
            .session
            .inbox()
            .iter()
            .map(|message| InboundView::of(message, lifetime))
            .collect();
        Ok(Outcome::query(vec![AppEvent::Inbox { messages }]))
    }

    pub fn handle_list_outbox(state: &OwnerState) -> PosternResult<Outcome> {
        let messages = state.session.outbox().iter().map(OutboundView::of).collect();
        Ok(Outcome::query(vec![AppEvent::Outbox { messages }]))
    }

    fn contact_view(state: &OwnerState, id: ContactId) -> PosternResult<ContactView> {
        state
            .session
            .contact(id)
            .map(ContactView::of)
            .ok_or(PosternError::UnknownContact { contact: id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use postern_core::{Identity, MessageQueue, PosternConfig, SessionState, SystemTimeSource};
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn owner(rng: &mut ChaCha8Rng) -> OwnerState {
        let server = format!("postern://{}@example.org", "cd".repeat(32));
        let session = SessionState::new(Identity::generate(&server, rng).unwrap());
        OwnerState::new(
            session,
            MessageQueue::new(),
            PosternConfig::testing(),
            Arc::new(SystemTimeSource),
        )
    }

    fn is_failure(outcome: &Outcome) -> bool {
        !outcome.mutated
            && matches!(outcome.events.as_slice(), [AppEvent::OperationFailed { .. }])
    }

    #[test]
    fn test_add_contact_mutates_and_returns_key_exchange() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut state = owner(&mut rng);

        let outcome = CommandHandlers::handle_add_contact(&mut state, " bob ", &mut rng).unwrap();
        assert!(outcome.mutated);
        match outcome.events.as_slice() {
            [AppEvent::ContactCreated {
                contact,
                key_exchange,
            }] => {
                assert_eq!(contact.name, "bob");
                assert!(contact.pending);
                assert!(dearmor(key_exchange).is_ok());
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_blank_contact_name_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut state = owner(&mut rng);

        let outcome = CommandHandlers::handle_add_contact(&mut state, "   ", &mut rng).unwrap();
        assert!(is_failure(&outcome));
        assert_eq!(state.session.contacts().count(), 0);
    }

    #[test]
    fn test_unknown_ids_fail_without_defect() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut state = owner(&mut rng);
        let contact = ContactId::new(5);
        let message = MessageId::new(6);

        let outcomes = [
            CommandHandlers::handle_show_key_exchange(&state, contact).unwrap(),
            CommandHandlers::handle_complete_contact(
                &mut state,
                contact,
                "",
                &postern_core::NoCipher,
            )
            .unwrap(),
            CommandHandlers::handle_compose(
                &mut state,
                contact,
                "hi".to_string(),
                Vec::new(),
                None,
                &mut rng,
            )
            .unwrap(),
            CommandHandlers::handle_ack_inbound(&mut state, message, &mut rng).unwrap(),
            CommandHandlers::handle_open_inbound(&mut state, message).unwrap(),
        ];
        assert!(outcomes.iter().all(is_failure));
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_purge_without_expired_messages_does_not_save() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut state = owner(&mut rng);

        let outcome = CommandHandlers::handle_purge_expired(&mut state).unwrap();
        assert!(!outcome.mutated);
        assert_eq!(outcome.events, vec![AppEvent::Expired { removed: Vec::new() }]);
    }
}
