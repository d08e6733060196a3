use super::GO_GET_LOST_AVATAR_DELETED;
use crate::connection::ConnectionId;
use crate::testing::{Harness, DISTRICT, TOON, TREE};
use otp_core::msgtypes::{client, stateserver};
use otp_core::{
    puppet_channel, Channel, ClientMessage, Datagram, DatagramIterator, DoId, Location, ZoneId, CHAT_MANAGER_CHANNEL,
    STATE_SERVER_CHANNEL,
};

const S1: Channel = 4000;

fn add_interest(harness: &mut Harness, id: ConnectionId, handle: u16, parent_id: DoId, zones: &[ZoneId]) {
    harness.send_client(
        id,
        ClientMessage::AddInterest {
            handle,
            context: u32::from(handle) + 100,
            parent_id,
            zones: zones.to_vec(),
        },
    );
}

fn object_id(code: u16, payload: &[u8]) -> DoId {
    let mut di = DatagramIterator::new(payload);
    if code == client::CREATE_OBJECT_REQUIRED_OTHER {
        di.get_u32().unwrap();
        di.get_u32().unwrap();
        di.get_u16().unwrap();
    }
    di.get_u32().unwrap()
}

/// Ids carried by every message of `code` queued for `id`.
fn ids(messages: &[(u16, Vec<u8>)], code: u16) -> Vec<DoId> {
    messages
        .iter()
        .filter(|(c, _)| *c == code)
        .map(|(c, payload)| object_id(*c, payload))
        .collect()
}

fn position(x: f64, y: f64) -> Vec<u8> {
    let mut dg = Datagram::new();
    dg.add_f64(x);
    dg.add_f64(y);
    dg.into_bytes()
}

/// A client playing a stored toon that stands at (100, 200).
fn playing_client(harness: &mut Harness) -> (ConnectionId, DoId) {
    let av_id = harness.store_avatar("Flippy");
    let id = harness.client();
    harness.send_client(id, ClientMessage::SetAvatar { av_id });
    harness.send_client(
        id,
        ClientMessage::ObjectLocation {
            do_id: av_id,
            location: Location::new(100, 200),
        },
    );
    harness.frames(id);
    (id, av_id)
}

#[test]
fn interest_update_and_overwrite_scenario() {
    let mut harness = Harness::new();
    let s1 = harness.participant(Some("AI"), &[S1]);
    harness.generate(s1, S1, TOON, 42, 100, 200);
    harness.generate(s1, S1, TOON, 43, 100, 300);
    let c = harness.client();

    add_interest(&mut harness, c, 1, 100, &[200]);
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::CREATE_OBJECT_REQUIRED_OTHER), vec![42]);
    assert_eq!(messages.last().unwrap().0, client::DONE_INTEREST_RESP);
    assert_eq!(messages.last().unwrap().1, vec![1, 0, 101, 0, 0, 0]);

    let set_pos = harness.field_id(TOON, "setPos");
    let mut dg = Datagram::new();
    dg.add_u32(42);
    dg.add_u16(set_pos);
    dg.append_data(&position(2.0, 3.0));
    harness.send_envelope(s1, vec![42], S1, stateserver::OBJECT_UPDATE_FIELD, dg);

    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::OBJECT_UPDATE_FIELD), vec![42]);
    assert_eq!(messages.len(), 1);
    assert!(harness.envelopes(s1).is_empty());

    add_interest(&mut harness, c, 1, 100, &[300]);
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::OBJECT_DISABLE), vec![42]);
    assert_eq!(ids(&messages, client::CREATE_OBJECT_REQUIRED_OTHER), vec![43]);
}

#[test]
fn create_payload_carries_broadcast_fields() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    harness.generate(s1, S1, TOON, 42, 100, 200);
    let c = harness.client();
    add_interest(&mut harness, c, 1, 100, &[200]);

    let (code, payload) = harness.client_messages(c).remove(0);
    assert_eq!(code, client::CREATE_OBJECT_REQUIRED_OTHER);
    let mut di = DatagramIterator::new(&payload);
    assert_eq!(di.get_u32().unwrap(), 100);
    assert_eq!(di.get_u32().unwrap(), 200);
    assert_eq!(di.get_u16().unwrap(), harness.class_id(TOON));
    assert_eq!(di.get_u32().unwrap(), 42);
    assert_eq!(di.get_string().unwrap(), "Toon");
    assert_eq!(di.get_u16().unwrap(), 0);
    assert_eq!(di.remaining_size(), 0);
}

#[test]
fn overwriting_an_interest_sends_only_the_difference() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    harness.generate(s1, S1, TREE, 10, 7, 10);
    harness.generate(s1, S1, TREE, 20, 7, 20);
    harness.generate(s1, S1, TREE, 30, 7, 30);
    let c = harness.client();

    add_interest(&mut harness, c, 4, 7, &[10, 20]);
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::CREATE_OBJECT_REQUIRED_OTHER), vec![10, 20]);

    add_interest(&mut harness, c, 4, 7, &[20, 30]);
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::OBJECT_DISABLE), vec![10]);
    assert_eq!(ids(&messages, client::CREATE_OBJECT_REQUIRED_OTHER), vec![30]);
}

#[test]
fn overlapping_interests_do_not_duplicate() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    harness.generate(s1, S1, TREE, 10, 7, 10);
    let c = harness.client();

    add_interest(&mut harness, c, 1, 7, &[10]);
    add_interest(&mut harness, c, 2, 7, &[10, 11]);
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::CREATE_OBJECT_REQUIRED_OTHER), vec![10]);

    // Still covered by handle 2.
    harness.send_client(c, ClientMessage::RemoveInterest { handle: 1, context: 0 });
    let messages = harness.client_messages(c);
    assert!(ids(&messages, client::OBJECT_DISABLE).is_empty());
    assert_eq!(messages.last().unwrap().0, client::DONE_INTEREST_RESP);

    harness.send_client(c, ClientMessage::RemoveInterest { handle: 2, context: 0 });
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::OBJECT_DISABLE), vec![10]);
}

#[test]
fn creates_are_ordered_by_class_then_id() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    harness.generate(s1, S1, TREE, 5, 7, 50);
    harness.generate(s1, S1, TOON, 30, 7, 50);
    harness.generate(s1, S1, DISTRICT, 40, 7, 50);
    harness.generate(s1, S1, TOON, 20, 7, 50);
    let c = harness.client();

    add_interest(&mut harness, c, 1, 7, &[50]);
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::CREATE_OBJECT_REQUIRED_OTHER), vec![40, 20, 30, 5]);
}

#[test]
fn visgroups_widen_an_interest() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    harness.generate(s1, S1, TREE, 1, 7, 2206);
    harness.generate(s1, S1, TREE, 2, 7, 2200);
    harness.generate(s1, S1, TREE, 3, 7, 2207);
    let c = harness.client();

    add_interest(&mut harness, c, 1, 7, &[2205]);
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::CREATE_OBJECT_REQUIRED_OTHER), vec![1, 2]);
}

#[test]
fn quiet_zone_is_never_visible() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    harness.generate(s1, S1, TREE, 1, 7, 1);
    let c = harness.client();

    add_interest(&mut harness, c, 1, 7, &[1]);
    let messages = harness.client_messages(c);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, client::DONE_INTEREST_RESP);

    harness.generate(s1, S1, TREE, 2, 7, 1);
    assert!(harness.client_messages(c).is_empty());
}

#[test]
fn objects_entering_and_leaving_an_interest() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    let c = harness.client();
    add_interest(&mut harness, c, 1, 7, &[10, 11]);
    harness.frames(c);

    harness.generate(s1, S1, TREE, 5, 7, 10);
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::CREATE_OBJECT_REQUIRED_OTHER), vec![5]);

    let mut dg = Datagram::new();
    dg.add_u32(7);
    dg.add_u32(11);
    harness.send_envelope(s1, vec![5], S1, stateserver::OBJECT_SET_ZONE, dg);
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::OBJECT_LOCATION), vec![5]);
    assert_eq!(&messages[0].1[4..], &[7, 0, 0, 0, 11, 0, 0, 0]);

    let mut dg = Datagram::new();
    dg.add_u32(7);
    dg.add_u32(99);
    harness.send_envelope(s1, vec![5], S1, stateserver::OBJECT_SET_ZONE, dg);
    assert_eq!(ids(&harness.client_messages(c), client::OBJECT_DISABLE), vec![5]);

    let mut dg = Datagram::new();
    dg.add_u32(7);
    dg.add_u32(10);
    harness.send_envelope(s1, vec![5], S1, stateserver::OBJECT_SET_ZONE, dg);
    assert_eq!(
        ids(&harness.client_messages(c), client::CREATE_OBJECT_REQUIRED_OTHER),
        vec![5]
    );

    let mut dg = Datagram::new();
    dg.add_u32(5);
    harness.send_envelope(s1, vec![5], S1, stateserver::OBJECT_DELETE_RAM, dg);
    assert_eq!(ids(&harness.client_messages(c), client::OBJECT_DISABLE), vec![5]);
}

#[test]
fn choosing_an_avatar_generates_it() {
    let mut harness = Harness::new();
    let av_id = harness.store_avatar("Flippy");
    let c = harness.client();
    harness.send_client(c, ClientMessage::SetAvatar { av_id });

    let messages = harness.client_messages(c);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, client::GET_AVATAR_DETAILS_RESP);
    let mut di = DatagramIterator::new(&messages[0].1);
    assert_eq!(di.get_u32().unwrap(), av_id);
    assert_eq!(di.get_u8().unwrap(), 0);
    assert_eq!(di.get_string().unwrap(), "Flippy");
    assert_eq!(di.remaining_size(), 0);

    let avatar = harness.dispatcher.state_server().object(av_id).unwrap();
    assert_eq!(avatar.senders, vec![Channel::from(av_id)]);
    assert_eq!(avatar.field(harness.field_id(TOON, "setHp")), Some(&15i16.to_le_bytes()[..]));
    assert_eq!(harness.dispatcher.agent().session(c).unwrap().avatar_id, Some(av_id));
}

#[test]
fn avatar_choice_errors_kick_the_client() {
    let mut harness = Harness::new();
    let av_id = harness.store_avatar("Flippy");

    let c = harness.client();
    harness.send_client(c, ClientMessage::SetAvatar { av_id: 12_345 });
    assert!(harness.was_kicked(c));

    let c = harness.client();
    harness.send_client(c, ClientMessage::SetAvatar { av_id });
    harness.send_client(c, ClientMessage::SetAvatar { av_id });
    assert!(harness.was_kicked(c));

    let c = harness.client();
    harness.send_client(c, ClientMessage::SetAvatar { av_id: 0 });
    assert!(harness.was_kicked(c));
}

#[test]
fn unknown_codes_are_not_fatal() {
    let mut harness = Harness::new();
    let c = harness.client();
    harness.dispatcher.receive(c, &[0xe7, 0x03, 1, 2]);
    harness.send_client(c, ClientMessage::Heartbeat);
    assert!(!harness.was_kicked(c));

    harness.dispatcher.receive(c, &[client::SET_AVATAR as u8]);
    assert!(harness.was_kicked(c));
}

#[test]
fn updates_need_an_avatar_and_a_sendable_field() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    harness.generate(s1, S1, TOON, 42, 100, 200);
    let set_pos = harness.field_id(TOON, "setPos");

    let c = harness.client();
    harness.send_client(
        c,
        ClientMessage::ObjectUpdateField {
            do_id: 42,
            field_id: set_pos,
            value: position(1.0, 1.0),
        },
    );
    assert!(harness.was_kicked(c));

    let (c, av_id) = playing_client(&mut harness);
    harness.send_client(
        c,
        ClientMessage::ObjectUpdateField {
            do_id: 42,
            field_id: set_pos,
            value: position(5.0, 6.0),
        },
    );
    assert!(!harness.was_kicked(c));
    let object = harness.dispatcher.state_server().object(42).unwrap();
    assert_eq!(object.field(set_pos), Some(position(5.0, 6.0).as_slice()));

    // ownsend only applies to the client's own avatar.
    let set_talk = harness.field_id(TOON, "setTalk");
    let mut talk = Datagram::new();
    talk.add_string("hi");
    harness.send_client(
        c,
        ClientMessage::ObjectUpdateField {
            do_id: 42,
            field_id: set_talk,
            value: talk.into_bytes(),
        },
    );
    assert!(harness.was_kicked(c));

    let c = harness.client();
    harness.send_client(c, ClientMessage::SetAvatar { av_id });
    let mut money = Datagram::new();
    money.add_u32(1_000_000);
    harness.send_client(
        c,
        ClientMessage::ObjectUpdateField {
            do_id: av_id,
            field_id: harness.field_id(TOON, "setMoney"),
            value: money.into_bytes(),
        },
    );
    assert!(harness.was_kicked(c));
}

#[test]
fn talk_is_relayed_from_the_chat_manager() {
    let mut harness = Harness::new();
    let (c, av_id) = playing_client(&mut harness);
    let watcher = harness.participant(None, &[Channel::from(av_id)]);

    let set_talk = harness.field_id(TOON, "setTalk");
    let mut talk = Datagram::new();
    talk.add_string("hello");
    harness.send_client(
        c,
        ClientMessage::ObjectUpdateField {
            do_id: av_id,
            field_id: set_talk,
            value: talk.clone().into_bytes(),
        },
    );

    let heard = harness.envelopes(watcher);
    assert_eq!(heard.len(), 1);
    assert_eq!(heard[0].sender, CHAT_MANAGER_CHANNEL);
    assert_eq!(heard[0].code, stateserver::OBJECT_UPDATE_FIELD);

    // The speaker sees its own line.
    let messages = harness.client_messages(c);
    assert_eq!(ids(&messages, client::OBJECT_UPDATE_FIELD), vec![av_id]);
    assert_eq!(&messages[0].1[6..], talk.as_bytes());
}

#[test]
fn ownrecv_fields_reach_only_the_owner() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    let (owner, av_id) = playing_client(&mut harness);
    let other = harness.client();
    add_interest(&mut harness, other, 1, 100, &[200]);
    harness.frames(other);

    let mut dg = Datagram::new();
    dg.add_u32(av_id);
    dg.add_u16(harness.field_id(TOON, "setMoney"));
    dg.add_u32(50);
    harness.send_envelope(s1, vec![Channel::from(av_id)], S1, stateserver::OBJECT_UPDATE_FIELD, dg);

    assert_eq!(ids(&harness.client_messages(owner), client::OBJECT_UPDATE_FIELD), vec![av_id]);
    assert!(harness.client_messages(other).is_empty());
}

#[test]
fn moving_the_avatar_is_seen_by_others() {
    let mut harness = Harness::new();
    let other = harness.client();
    add_interest(&mut harness, other, 1, 100, &[200]);
    harness.frames(other);

    let (c, av_id) = playing_client(&mut harness);
    assert_eq!(
        harness.dispatcher.state_server().object(av_id).unwrap().location,
        Location::new(100, 200)
    );
    assert!(harness.client_messages(c).is_empty());
    assert_eq!(
        ids(&harness.client_messages(other), client::CREATE_OBJECT_REQUIRED_OTHER),
        vec![av_id]
    );

    harness.send_client(
        c,
        ClientMessage::ObjectLocation {
            do_id: 42,
            location: Location::new(100, 300),
        },
    );
    assert!(harness.was_kicked(c));
}

#[test]
fn own_avatar_is_left_out_of_interest_changes() {
    let mut harness = Harness::new();
    let (c, av_id) = playing_client(&mut harness);

    add_interest(&mut harness, c, 1, 100, &[200]);
    let messages = harness.client_messages(c);
    assert!(ids(&messages, client::CREATE_OBJECT_REQUIRED_OTHER).is_empty());

    harness.send_client(c, ClientMessage::RemoveInterest { handle: 1, context: 3 });
    let messages = harness.client_messages(c);
    assert!(ids(&messages, client::OBJECT_DISABLE).is_empty());
    assert_eq!(messages, vec![(client::DONE_INTEREST_RESP, vec![1, 0, 3, 0, 0, 0])]);
    assert_eq!(harness.dispatcher.agent().session(c).unwrap().avatar_id, Some(av_id));
}

#[test]
fn deleting_a_played_avatar_logs_the_client_out() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    let (c, av_id) = playing_client(&mut harness);
    add_interest(&mut harness, c, 1, 100, &[200]);
    let other = harness.client();
    add_interest(&mut harness, other, 1, 100, &[200]);
    harness.frames(c);
    harness.frames(other);

    let mut dg = Datagram::new();
    dg.add_u32(av_id);
    harness.send_envelope(s1, vec![STATE_SERVER_CHANNEL], S1, stateserver::OBJECT_DELETE_RAM, dg);

    let messages = harness.client_messages(c);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, client::GO_GET_LOST);
    let mut di = DatagramIterator::new(&messages[0].1);
    assert_eq!(di.get_u16().unwrap(), GO_GET_LOST_AVATAR_DELETED);
    assert_eq!(di.get_string().unwrap(), "Your avatar was deleted.");
    assert!(harness.was_kicked(c));

    let session = harness.dispatcher.agent().session(c).unwrap();
    assert_eq!(session.avatar_id, None);
    assert!(session.interests.is_empty());

    assert_eq!(ids(&harness.client_messages(other), client::OBJECT_DISABLE), vec![av_id]);
}

#[test]
fn removing_an_unknown_interest_kicks() {
    let mut harness = Harness::new();
    let c = harness.client();
    harness.send_client(c, ClientMessage::RemoveInterest { handle: 9, context: 0 });
    assert!(harness.was_kicked(c));
}

#[test]
fn puppet_channel_updates_reach_the_player() {
    let mut harness = Harness::new();
    let s1 = harness.participant(None, &[S1]);
    let (c, av_id) = playing_client(&mut harness);

    let mut dg = Datagram::new();
    dg.add_u32(av_id);
    dg.add_u16(harness.field_id(TOON, "setHp"));
    dg.add_i16(3);
    let expected = dg.as_bytes().to_vec();
    harness.send_envelope(s1, vec![puppet_channel(av_id)], S1, stateserver::OBJECT_UPDATE_FIELD, dg);

    assert_eq!(harness.client_messages(c), vec![(client::OBJECT_UPDATE_FIELD, expected)]);
}

#[test]
fn disconnecting_releases_the_avatar() {
    let mut harness = Harness::new();
    let (c, av_id) = playing_client(&mut harness);
    harness.disconnect(c);

    assert!(harness.dispatcher.state_server().object(av_id).is_none());
    assert!(harness.dispatcher.agent().session(c).is_none());
}

#[test]
fn an_unplaced_avatar_is_kept_on_release() {
    let mut harness = Harness::new();
    let av_id = harness.store_avatar("Flippy");
    let c = harness.client();
    harness.send_client(c, ClientMessage::SetAvatar { av_id });
    harness.send_client(c, ClientMessage::SetAvatar { av_id: 0 });

    assert!(!harness.was_kicked(c));
    assert!(harness.dispatcher.state_server().object(av_id).unwrap().is_placeholder());
    assert_eq!(harness.dispatcher.agent().session(c).unwrap().avatar_id, None);
}
