//! Numeric message codes.
//!
//! Codes are grouped by the component that consumes them. The control and
//! State Server groups overlap numerically; the channel a message is routed
//! to decides which table applies.

/// Director control sub-protocol, valid only on [`crate::types::CONTROL_CHANNEL`].
pub mod control {
    pub const SET_CHANNEL: u16 = 2001;
    pub const REMOVE_CHANNEL: u16 = 2002;
    pub const SET_CON_NAME: u16 = 2004;
    pub const SET_CON_URL: u16 = 2005;
    pub const ADD_POST_REMOVE: u16 = 2010;
}

/// Object life-cycle protocol handled by the State Server.
pub mod stateserver {
    pub const OBJECT_GENERATE_WITH_REQUIRED: u16 = 2001;
    pub const OBJECT_GENERATE_WITH_REQUIRED_OTHER: u16 = 2003;
    pub const OBJECT_UPDATE_FIELD: u16 = 2004;
    pub const OBJECT_DELETE_RAM: u16 = 2007;
    pub const OBJECT_SET_ZONE: u16 = 2008;
    pub const OBJECT_CHANGE_ZONE: u16 = 2009;
    pub const OBJECT_NOTFOUND: u16 = 2015;
    pub const QUERY_OBJECT_ALL: u16 = 2020;
    pub const QUERY_OBJECT_ALL_RESP: u16 = 2030;
    pub const OBJECT_LEAVING_AI_INTEREST: u16 = 2033;
    pub const SHARD_REST: u16 = 2063;
    pub const OBJECT_ENTERZONE_WITH_REQUIRED_OTHER: u16 = 2066;
}

/// Persistent-store adapter protocol.
pub mod dbserver {
    pub const CREATE_STORED_OBJECT: u16 = 1003;
    pub const CREATE_STORED_OBJECT_RESP: u16 = 1004;
    pub const DELETE_STORED_OBJECT: u16 = 1008;
    pub const GET_STORED_VALUES: u16 = 1012;
    pub const GET_STORED_VALUES_RESP: u16 = 1013;
    pub const SET_STORED_VALUES: u16 = 1014;
}

/// Client-facing protocol spoken on the client listener.
pub mod client {
    pub const GO_GET_LOST: u16 = 4;
    pub const GET_AVATAR_DETAILS_RESP: u16 = 15;
    pub const OBJECT_UPDATE_FIELD: u16 = 24;
    pub const OBJECT_DISABLE: u16 = 25;
    pub const SET_AVATAR: u16 = 32;
    pub const CREATE_OBJECT_REQUIRED_OTHER: u16 = 35;
    pub const DONE_INTEREST_RESP: u16 = 48;
    pub const HEARTBEAT: u16 = 52;
    pub const ADD_INTEREST: u16 = 97;
    pub const REMOVE_INTEREST: u16 = 99;
    pub const OBJECT_LOCATION: u16 = 102;
}
