//! In-process harness driving a [`Dispatcher`] through fake connections.

use crate::config::ServerConfig;
use crate::connection::{ConnectionId, ConnectionKind, Outbound};
use crate::dispatch::Dispatcher;
use otp_core::{
    Channel, ClientMessage, ControlMessage, Datagram, DatagramIterator, DirectorDatagram, DoId, Envelope, FieldId,
    MemoryStore, TomlSchema, VisGroups,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub const DISTRICT: &str = "DistributedDistrict";
pub const TOON: &str = "DistributedToon";
pub const TREE: &str = "DistributedTree";
pub const ACCOUNT: &str = "Account";

pub const SCHEMA: &str = r#"
    [[class]]
    name = "DistributedDistrict"

    [[class.field]]
    name = "setName"
    keywords = ["required", "broadcast", "ram"]
    params = ["string"]
    default = ["District"]

    [[class]]
    name = "DistributedToon"

    [[class.field]]
    name = "DcObjectType"
    keywords = ["db"]
    params = ["string"]

    [[class.field]]
    name = "setName"
    keywords = ["required", "broadcast", "ram", "db"]
    params = ["string"]
    default = ["Toon"]

    [[class.field]]
    name = "setHp"
    keywords = ["broadcast", "ram", "db", "airecv"]
    params = ["int16"]
    default = [15]

    [[class.field]]
    name = "setTalk"
    keywords = ["broadcast", "ownsend", "airecv"]
    params = ["string"]

    [[class.field]]
    name = "setPos"
    keywords = ["broadcast", "ram", "clsend"]
    params = ["float64", "float64"]

    [[class.field]]
    name = "setMoney"
    keywords = ["ownrecv", "ram", "db"]
    params = ["uint32"]

    [[class.field]]
    name = "setSecret"
    keywords = ["ram", "airecv"]
    params = ["uint8"]

    [[class]]
    name = "DistributedTree"

    [[class.field]]
    name = "setHeight"
    keywords = ["required", "broadcast", "ram"]
    params = ["uint8"]
    default = [3]

    [[class]]
    name = "Account"

    [[class.field]]
    name = "DcObjectType"
    keywords = ["db"]
    params = ["string"]

    [[class.field]]
    name = "ACCOUNT_AV_SET"
    keywords = ["db"]
    params = ["uint32[]"]
"#;

/// Visibility used by the interest tests: 2205 sees 2206.
pub const VISGROUPS: &str = r#"
    [[visgroup]]
    zone = 2205
    visibles = [2206]
"#;

/// A dispatcher plus the outbound queues of every fake connection.
pub struct Harness {
    pub dispatcher: Dispatcher,
    schema: Arc<TomlSchema>,
    outbound: HashMap<ConnectionId, UnboundedReceiver<Outbound>>,
    closed: HashMap<ConnectionId, String>,
    next_id: ConnectionId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self::with_schema(config, SCHEMA)
    }

    pub fn with_schema(config: ServerConfig, schema: &str) -> Self {
        let schema = Arc::new(TomlSchema::parse(schema).expect("fixture schema"));
        let geometry = Arc::new(VisGroups::parse(VISGROUPS).expect("fixture visgroups"));
        let dispatcher = Dispatcher::new(&config, schema.clone(), geometry, Box::new(MemoryStore::new()));
        Self {
            dispatcher,
            schema,
            outbound: HashMap::new(),
            closed: HashMap::new(),
            next_id: 1,
        }
    }

    fn connect(&mut self, kind: ConnectionKind) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.dispatcher
            .connect(id, kind, SocketAddr::from(([127, 0, 0, 1], 20_000 + id as u16)), tx);
        self.outbound.insert(id, rx);
        id
    }

    /// Connects a Director participant subscribed to `channels`.
    pub fn participant(&mut self, name: Option<&str>, channels: &[Channel]) -> ConnectionId {
        let id = self.connect(ConnectionKind::Director);
        if let Some(name) = name {
            self.control(id, ControlMessage::SetConnectionName(name.to_string()));
        }
        for channel in channels {
            self.control(id, ControlMessage::SetChannel(*channel));
        }
        id
    }

    pub fn client(&mut self) -> ConnectionId {
        self.connect(ConnectionKind::Client)
    }

    pub fn control(&mut self, id: ConnectionId, message: ControlMessage) {
        self.dispatcher.receive(id, message.to_datagram().as_bytes());
    }

    /// Sends a routed message as participant `id`.
    pub fn send_envelope(&mut self, id: ConnectionId, channels: Vec<Channel>, sender: Channel, code: u16, payload: Datagram) {
        let envelope = Envelope::new(channels, sender, code, payload.into_bytes());
        let bytes = envelope.encode().expect("envelope");
        self.dispatcher.receive(id, bytes.as_bytes());
    }

    pub fn send_client(&mut self, id: ConnectionId, message: ClientMessage) {
        self.dispatcher.receive(id, message.to_datagram().as_bytes());
    }

    pub fn disconnect(&mut self, id: ConnectionId) {
        self.dispatcher.disconnect(id);
    }

    /// Frame bodies queued for `id` since the last call.
    pub fn frames(&mut self, id: ConnectionId) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        if let Some(rx) = self.outbound.get_mut(&id) {
            while let Ok(outbound) = rx.try_recv() {
                match outbound {
                    Outbound::Frame(frame) => frames.push(frame[2..].to_vec()),
                    Outbound::Close(reason) => {
                        self.closed.insert(id, reason);
                    }
                }
            }
        }
        frames
    }

    /// Routed messages queued for participant `id`.
    pub fn envelopes(&mut self, id: ConnectionId) -> Vec<Envelope> {
        self.frames(id)
            .into_iter()
            .filter_map(|frame| match DirectorDatagram::decode(&frame) {
                Ok(DirectorDatagram::Routed(envelope)) => Some(envelope),
                _ => None,
            })
            .collect()
    }

    /// `(code, payload)` pairs queued for client `id`.
    pub fn client_messages(&mut self, id: ConnectionId) -> Vec<(u16, Vec<u8>)> {
        self.frames(id)
            .into_iter()
            .map(|frame| {
                let mut di = DatagramIterator::new(&frame);
                let code = di.get_u16().expect("client code");
                (code, di.get_remaining_bytes().to_vec())
            })
            .collect()
    }

    pub fn codes(&mut self, id: ConnectionId) -> Vec<u16> {
        self.client_messages(id).into_iter().map(|(code, _)| code).collect()
    }

    /// Whether `id` was asked to close; drains its queue first.
    pub fn was_kicked(&mut self, id: ConnectionId) -> bool {
        self.frames(id);
        self.closed.contains_key(&id)
    }

    pub fn class_id(&self, name: &str) -> u16 {
        use otp_core::CodecProvider;
        self.schema.class_by_name(name).expect("fixture class").id
    }

    pub fn field_id(&self, class: &str, name: &str) -> FieldId {
        use otp_core::CodecProvider;
        let class_id = self.class_id(class);
        self.schema.field_by_name(class_id, name).expect("fixture field").id
    }

    /// Generate payload with the default required fields of `class`.
    pub fn generate_payload(&self, class: &str, do_id: DoId, parent_id: DoId, zone_id: u32) -> Datagram {
        use otp_core::CodecProvider;
        let class_id = self.class_id(class);
        let mut dg = Datagram::new();
        dg.add_u32(parent_id);
        dg.add_u32(zone_id);
        dg.add_u16(class_id);
        dg.add_u32(do_id);
        let class = self.schema.class(class_id).expect("fixture class");
        for field in class.fields.iter().filter_map(|id| self.schema.field(*id)) {
            if field.is_required() && field.is_atomic() {
                dg.append_data(&field.default);
            }
        }
        dg
    }

    /// Generates an object through the root channel as participant `id`.
    pub fn generate(&mut self, id: ConnectionId, sender: Channel, class: &str, do_id: DoId, parent_id: DoId, zone_id: u32) {
        let payload = self.generate_payload(class, do_id, parent_id, zone_id);
        self.send_envelope(
            id,
            vec![otp_core::STATE_SERVER_CHANNEL],
            sender,
            otp_core::msgtypes::stateserver::OBJECT_GENERATE_WITH_REQUIRED,
            payload,
        );
    }

    /// Stores a toon named `name`, returning its id.
    pub fn store_avatar(&mut self, name: &str) -> DoId {
        let schema = self.schema.clone();
        let database = self.dispatcher.database_mut();
        let mut avatar = database.create(schema.as_ref(), TOON).expect("create avatar");
        let mut value = Datagram::new();
        value.add_string(name);
        avatar.fields.insert("setName".to_string(), value.into_bytes());
        database.save(&avatar).expect("save avatar");
        avatar.do_id
    }
}
