//! Message lifecycle tests

use core::time::Duration;

use postern_core::config::MESSAGE_LIFETIME;
use postern_core::handshake::apply_handshake;
use postern_core::lifecycle::{
    absorb_fetched, ack_inbound, acknowledge, compose, expire_inbound, mark_sent, open_inbound,
    requeue_unsent, retry_sealed, unseal_on_handshake_complete, usage, Absorbed, Draft,
    MAX_SERIALIZED_MESSAGE,
};
use postern_core::model::{Attachment, BodyEncoding, MessageRecord, OutboundStatus};
use postern_core::{ContactId, MessageId, MessageQueue, PosternError, Timestamp};

use test_utils::{active_pair, pending_pair, seal, test_rng, FixedUnsealer, Pair, PlainUnsealer};

fn draft(to: ContactId, body: &[u8]) -> Draft {
    Draft {
        to,
        body: body.to_vec(),
        attachments: Vec::new(),
        in_reply_to: None,
    }
}

/// Alice sends `body` to Bob and Bob absorbs it; returns Bob's local id
fn deliver_to_bob(pair: &mut Pair, body: &[u8], rng: &mut rand_chacha::ChaCha8Rng) -> MessageId {
    let queue = MessageQueue::new();
    compose(
        &mut pair.alice,
        &queue,
        draft(pair.bob_at_alice, body),
        MAX_SERIALIZED_MESSAGE,
        Timestamp::new(10),
        rng,
    )
    .unwrap();
    let sent = queue.pop_front().unwrap();
    match absorb_fetched(
        &mut pair.bob,
        pair.alice_at_bob,
        seal(&sent.record),
        &PlainUnsealer,
        Timestamp::new(20),
        rng,
    )
    .unwrap()
    {
        Absorbed::Stored(id) => id,
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_compose_then_sent_confirmation() {
    let mut rng = test_rng(200);
    let mut pair = active_pair(&mut rng);
    let queue = MessageQueue::new();

    let scalar_before = *pair
        .alice
        .contact(pair.bob_at_alice)
        .unwrap()
        .dh_private()
        .previous()
        .unwrap();

    let id = compose(
        &mut pair.alice,
        &queue,
        draft(pair.bob_at_alice, b"hello bob"),
        MAX_SERIALIZED_MESSAGE,
        Timestamp::new(1_000),
        &mut rng,
    )
    .unwrap();

    let message = pair.alice.outbound(id).unwrap();
    assert_eq!(message.status(), OutboundStatus::Queued);
    assert_eq!(message.record.time, 1_000);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.snapshot()[0].id, id);

    // The record announces the public half of the new current scalar
    let contact = pair.alice.contact(pair.bob_at_alice).unwrap();
    let current = contact.dh_private().current().unwrap();
    assert_eq!(
        message.record.my_next_dh,
        postern_core::crypto::dh_public(current)
    );
    assert_eq!(contact.dh_private().previous(), Some(&scalar_before));

    assert!(mark_sent(&mut pair.alice, id, Timestamp::new(1_005)).unwrap());
    let message = pair.alice.outbound(id).unwrap();
    assert_eq!(message.status(), OutboundStatus::Sent);
    assert_eq!(message.sent(), Some(Timestamp::new(1_005)));
    assert_eq!(message.acked(), None);
}

#[test]
fn test_size_bound_is_exact() {
    let mut rng = test_rng(201);
    let mut pair = active_pair(&mut rng);
    let queue = MessageQueue::new();
    let attachments = vec![Attachment {
        filename: "notes.txt".to_string(),
        contents: vec![7u8; 300],
    }];

    let base = usage(b"x", false, &attachments, MAX_SERIALIZED_MESSAGE)
        .unwrap()
        .size;
    let limit = base + 100;
    let body = vec![b'a'; 101];

    let estimate = usage(&body, false, &attachments, limit).unwrap();
    assert_eq!(estimate.size, limit);
    assert!(estimate.fits());

    let mut at_limit = draft(pair.bob_at_alice, &body);
    at_limit.attachments = attachments.clone();
    compose(&mut pair.alice, &queue, at_limit, limit, Timestamp::new(5), &mut rng).unwrap();

    let over_body = vec![b'a'; 102];
    let estimate = usage(&over_body, false, &attachments, limit).unwrap();
    assert_eq!(estimate.size, limit + 1);
    assert!(!estimate.fits());

    let ratchet_before = *pair.alice.contact(pair.bob_at_alice).unwrap().dh_private();
    let mut over = draft(pair.bob_at_alice, &over_body);
    over.attachments = attachments;
    let result = compose(&mut pair.alice, &queue, over, limit, Timestamp::new(6), &mut rng);
    assert!(matches!(
        result,
        Err(PosternError::MessageTooLarge { size, max }) if size == limit + 1 && max == limit
    ));

    assert_eq!(pair.alice.outbox().len(), 1);
    assert_eq!(queue.len(), 1);
    assert_eq!(
        *pair.alice.contact(pair.bob_at_alice).unwrap().dh_private(),
        ratchet_before
    );
}

#[test]
fn test_reply_usage_matches_compose() {
    let mut rng = test_rng(202);
    let mut pair = active_pair(&mut rng);
    let inbound = deliver_to_bob(&mut pair, b"question?", &mut rng);

    let body = b"answer".to_vec();
    let estimate = usage(&body, true, &[], MAX_SERIALIZED_MESSAGE).unwrap();

    let queue = MessageQueue::new();
    let id = compose(
        &mut pair.bob,
        &queue,
        Draft {
            to: pair.alice_at_bob,
            body,
            attachments: Vec::new(),
            in_reply_to: Some(inbound),
        },
        estimate.size,
        Timestamp::new(30),
        &mut rng,
    )
    .unwrap();

    let reply = pair.bob.outbound(id).unwrap();
    assert_eq!(reply.record.serialize().unwrap().len(), estimate.size);
    let original_id = pair.bob.inbound(inbound).unwrap().record().unwrap().id;
    assert_eq!(reply.record.in_reply_to, Some(original_id));
    assert!(pair.bob.inbound(inbound).unwrap().acked);
}

#[test]
fn test_empty_body_is_padded() {
    let mut rng = test_rng(203);
    let mut pair = active_pair(&mut rng);
    let queue = MessageQueue::new();
    let id = compose(
        &mut pair.alice,
        &queue,
        draft(pair.bob_at_alice, b""),
        MAX_SERIALIZED_MESSAGE,
        Timestamp::new(1),
        &mut rng,
    )
    .unwrap();
    assert_eq!(pair.alice.outbound(id).unwrap().record.body, b" ".to_vec());
}

#[test]
fn test_compose_to_pending_contact_rejected() {
    let mut rng = test_rng(204);
    let (mut pair, _, _) = pending_pair(&mut rng);
    let queue = MessageQueue::new();
    let result = compose(
        &mut pair.alice,
        &queue,
        draft(pair.bob_at_alice, b"too early"),
        MAX_SERIALIZED_MESSAGE,
        Timestamp::new(1),
        &mut rng,
    );
    assert!(matches!(result, Err(PosternError::ContactPending { .. })));
    assert!(queue.is_empty());
    assert!(pair.alice.outbox().is_empty());
}

#[test]
fn test_status_never_moves_backward() {
    let mut rng = test_rng(205);
    let mut pair = active_pair(&mut rng);
    let queue = MessageQueue::new();
    let id = compose(
        &mut pair.alice,
        &queue,
        draft(pair.bob_at_alice, b"status"),
        MAX_SERIALIZED_MESSAGE,
        Timestamp::new(1),
        &mut rng,
    )
    .unwrap();

    // Ack before sent implies sent
    assert!(acknowledge(&mut pair.alice, id, Timestamp::new(50)).unwrap());
    let message = pair.alice.outbound(id).unwrap();
    assert_eq!(message.status(), OutboundStatus::Acked);
    assert_eq!(message.sent(), Some(Timestamp::new(50)));

    assert!(!mark_sent(&mut pair.alice, id, Timestamp::new(60)).unwrap());
    assert!(!acknowledge(&mut pair.alice, id, Timestamp::new(70)).unwrap());
    let message = pair.alice.outbound(id).unwrap();
    assert_eq!(message.status(), OutboundStatus::Acked);
    assert_eq!(message.acked(), Some(Timestamp::new(50)));

    let unknown = mark_sent(&mut pair.alice, MessageId::new(12345), Timestamp::new(1));
    assert!(matches!(&unknown, Err(e) if e.is_defect()));
}

#[test]
fn test_delivery_advances_peer_ratchet() {
    let mut rng = test_rng(206);
    let mut pair = active_pair(&mut rng);
    let inbound = deliver_to_bob(&mut pair, b"hi", &mut rng);

    let message = pair.bob.inbound(inbound).unwrap();
    assert!(!message.is_sealed());
    assert_eq!(message.record().unwrap().body, b"hi".to_vec());
    assert_eq!(message.received, Timestamp::new(20));

    let alice_current = *pair
        .alice
        .contact(pair.bob_at_alice)
        .unwrap()
        .dh_private()
        .current()
        .unwrap();
    let alice_at_bob = pair.bob.contact(pair.alice_at_bob).unwrap();
    assert_eq!(
        alice_at_bob.their_dh_public().current(),
        Some(&postern_core::crypto::dh_public(&alice_current))
    );
    assert!(alice_at_bob.their_dh_public().previous().is_some());
}

#[test]
fn test_ack_round_trip() {
    let mut rng = test_rng(207);
    let mut pair = active_pair(&mut rng);
    let queue = MessageQueue::new();
    let original = compose(
        &mut pair.alice,
        &queue,
        draft(pair.bob_at_alice, b"please ack"),
        MAX_SERIALIZED_MESSAGE,
        Timestamp::new(1),
        &mut rng,
    )
    .unwrap();
    let outgoing = queue.pop_front().unwrap();
    mark_sent(&mut pair.alice, original, Timestamp::new(2)).unwrap();

    let inbound = match absorb_fetched(
        &mut pair.bob,
        pair.alice_at_bob,
        seal(&outgoing.record),
        &PlainUnsealer,
        Timestamp::new(3),
        &mut rng,
    )
    .unwrap()
    {
        Absorbed::Stored(id) => id,
        other => panic!("unexpected {other:?}"),
    };

    let bob_queue = MessageQueue::new();
    let ack = ack_inbound(
        &mut pair.bob,
        &bob_queue,
        inbound,
        MAX_SERIALIZED_MESSAGE,
        Timestamp::new(4),
        &mut rng,
    )
    .unwrap()
    .unwrap();
    assert!(pair.bob.inbound(inbound).unwrap().acked);
    assert_eq!(
        ack_inbound(
            &mut pair.bob,
            &bob_queue,
            inbound,
            MAX_SERIALIZED_MESSAGE,
            Timestamp::new(5),
            &mut rng,
        )
        .unwrap(),
        None
    );

    let ack_message = bob_queue.pop_front().unwrap();
    assert_eq!(ack_message.id, ack);
    assert!(ack_message.record.is_ack());
    assert_eq!(ack_message.record.in_reply_to, Some(original));

    let inbox_before = pair.alice.inbox().len();
    let absorbed = absorb_fetched(
        &mut pair.alice,
        pair.bob_at_alice,
        seal(&ack_message.record),
        &PlainUnsealer,
        Timestamp::new(6),
        &mut rng,
    )
    .unwrap();
    assert_eq!(absorbed, Absorbed::Ack(Some(original)));
    assert_eq!(pair.alice.inbox().len(), inbox_before);

    let message = pair.alice.outbound(original).unwrap();
    assert_eq!(message.status(), OutboundStatus::Acked);
    assert_eq!(message.sent(), Some(Timestamp::new(2)));
}

#[test]
fn test_ack_respects_configured_limit() {
    let mut rng = test_rng(214);
    let mut pair = active_pair(&mut rng);
    let inbound = deliver_to_bob(&mut pair, b"ack me", &mut rng);
    let queue = MessageQueue::new();

    let result = ack_inbound(&mut pair.bob, &queue, inbound, 16, Timestamp::new(30), &mut rng);
    assert!(matches!(result, Err(PosternError::MessageTooLarge { max: 16, .. })));
    assert!(!pair.bob.inbound(inbound).unwrap().acked);
    assert!(queue.is_empty());
    assert!(pair.bob.outbox().is_empty());
}

fn record_from_bob(id: u64, body: &[u8], in_reply_to: Option<MessageId>, dh: u8) -> MessageRecord {
    MessageRecord {
        id: MessageId::new(id),
        time: 100,
        body: body.to_vec(),
        body_encoding: BodyEncoding::Raw,
        in_reply_to,
        my_next_dh: [dh; 32],
        files: Vec::new(),
    }
}

#[test]
fn test_unseal_after_handshake_leaves_nothing_sealed() {
    let mut rng = test_rng(208);
    let (mut pair, _, bob_kx) = pending_pair(&mut rng);

    let sealed = vec![
        seal(&record_from_bob(1, b"first", None, 1)),
        seal(&record_from_bob(2, b"", Some(MessageId::new(999)), 2)),
        b"garbage that will not unseal".to_vec(),
        seal(&record_from_bob(3, b"second", None, 3)),
    ];
    for bytes in sealed {
        let absorbed = absorb_fetched(
            &mut pair.alice,
            pair.bob_at_alice,
            bytes,
            &PlainUnsealer,
            Timestamp::new(10),
            &mut rng,
        )
        .unwrap();
        assert!(matches!(absorbed, Absorbed::Stored(_)));
    }
    assert_eq!(pair.alice.inbox().len(), 4);
    assert!(pair.alice.inbox().iter().all(|m| m.is_sealed()));

    apply_handshake(&mut pair.alice, pair.bob_at_alice, &bob_kx).unwrap();
    let report = unseal_on_handshake_complete(
        &mut pair.alice,
        pair.bob_at_alice,
        &PlainUnsealer,
        Timestamp::new(11),
    )
    .unwrap();

    assert_eq!(report.decoded.len(), 2);
    assert_eq!(report.discarded, 2);
    assert!(report.acked.is_empty());
    assert_eq!(pair.alice.inbox().len(), 2);
    assert!(pair.alice.inbox().iter().all(|m| !m.is_sealed()));

    let bodies: Vec<_> = pair
        .alice
        .inbox()
        .iter()
        .map(|m| m.record().unwrap().body.clone())
        .collect();
    assert_eq!(bodies, vec![b"first".to_vec(), b"second".to_vec()]);

    // Ids and receipt times survive decoding
    assert_eq!(report.decoded, pair.alice.inbox().iter().map(|m| m.id).collect::<Vec<_>>());
    assert!(pair.alice.inbox().iter().all(|m| m.received == Timestamp::new(10)));

    let ratchet = pair.alice.contact(pair.bob_at_alice).unwrap().their_dh_public();
    assert_eq!(ratchet.current(), Some(&[3u8; 32]));
    assert_eq!(ratchet.previous(), Some(&[2u8; 32]));
}

#[test]
fn test_unseal_requires_active_contact() {
    let mut rng = test_rng(209);
    let (mut pair, _, _) = pending_pair(&mut rng);
    let result = unseal_on_handshake_complete(
        &mut pair.alice,
        pair.bob_at_alice,
        &PlainUnsealer,
        Timestamp::new(1),
    );
    assert!(matches!(result, Err(PosternError::ContactPending { .. })));
}

#[test]
fn test_message_from_unknown_contact_dropped() {
    let mut rng = test_rng(210);
    let mut pair = active_pair(&mut rng);
    let absorbed = absorb_fetched(
        &mut pair.alice,
        ContactId::new(42),
        seal(&record_from_bob(1, b"who?", None, 1)),
        &PlainUnsealer,
        Timestamp::new(1),
        &mut rng,
    )
    .unwrap();
    assert_eq!(absorbed, Absorbed::Dropped);
    assert!(pair.alice.inbox().is_empty());
}

#[test]
fn test_record_that_fails_to_unseal_is_kept_for_retry() {
    let mut rng = test_rng(215);
    let mut pair = active_pair(&mut rng);
    let record = record_from_bob(1, b"out of order", None, 4);

    let absorbed = absorb_fetched(
        &mut pair.alice,
        pair.bob_at_alice,
        b"not yet openable".to_vec(),
        &PlainUnsealer,
        Timestamp::new(1),
        &mut rng,
    )
    .unwrap();
    let Absorbed::Deferred(id) = absorbed else {
        panic!("expected deferred message, got {absorbed:?}");
    };
    assert!(pair.alice.inbound(id).unwrap().is_sealed());

    // Still failing: the message stays
    let report = retry_sealed(
        &mut pair.alice,
        pair.bob_at_alice,
        &PlainUnsealer,
        Timestamp::new(2),
    )
    .unwrap();
    assert_eq!(report.retained, 1);
    assert!(report.decoded.is_empty());
    assert_eq!(pair.alice.inbox().len(), 1);

    let opens = FixedUnsealer(record.clone());
    let report = retry_sealed(&mut pair.alice, pair.bob_at_alice, &opens, Timestamp::new(3)).unwrap();
    assert_eq!(report.decoded, vec![id]);
    assert_eq!(report.retained, 0);
    let message = pair.alice.inbound(id).unwrap();
    assert_eq!(message.record(), Some(&record));
    assert_eq!(message.received, Timestamp::new(1));
}

#[test]
fn test_open_and_expire() {
    let mut rng = test_rng(211);
    let mut pair = active_pair(&mut rng);
    let inbound = deliver_to_bob(&mut pair, b"read me", &mut rng);

    let view = open_inbound(&mut pair.bob, inbound, MESSAGE_LIFETIME).unwrap();
    assert!(view.read);
    assert_eq!(view.body.as_deref(), Some("read me"));
    assert_eq!(view.erase_time, Timestamp::new(20 + 7 * 24 * 60 * 60));
    assert!(pair.bob.inbound(inbound).unwrap().read);

    let lifetime = Duration::from_secs(100);
    assert!(expire_inbound(&mut pair.bob, Timestamp::new(119), lifetime).is_empty());
    assert_eq!(
        expire_inbound(&mut pair.bob, Timestamp::new(120), lifetime),
        vec![inbound]
    );
    assert!(pair.bob.inbox().is_empty());
}

#[test]
fn test_sealed_message_cannot_be_opened() {
    let mut rng = test_rng(212);
    let (mut pair, _, _) = pending_pair(&mut rng);
    let absorbed = absorb_fetched(
        &mut pair.alice,
        pair.bob_at_alice,
        seal(&record_from_bob(1, b"hidden", None, 1)),
        &PlainUnsealer,
        Timestamp::new(1),
        &mut rng,
    )
    .unwrap();
    let Absorbed::Stored(id) = absorbed else {
        panic!("expected stored message");
    };
    assert!(matches!(
        open_inbound(&mut pair.alice, id, MESSAGE_LIFETIME),
        Err(PosternError::MessageSealed { .. })
    ));
}

#[test]
fn test_requeue_unsent_on_reload() {
    let mut rng = test_rng(213);
    let mut pair = active_pair(&mut rng);
    let queue = MessageQueue::new();
    let mut ids = Vec::new();
    for (body, time) in [(b"one", 1), (b"two", 2)] {
        let id = compose(
            &mut pair.alice,
            &queue,
            draft(pair.bob_at_alice, body),
            MAX_SERIALIZED_MESSAGE,
            Timestamp::new(time),
            &mut rng,
        )
        .unwrap();
        ids.push(id);
    }
    let (first, second) = (ids[0], ids[1]);
    mark_sent(&mut pair.alice, first, Timestamp::new(3)).unwrap();

    let fresh = MessageQueue::new();
    assert_eq!(requeue_unsent(&pair.alice, &fresh), 1);
    assert_eq!(fresh.drain()[0].id, second);
}
