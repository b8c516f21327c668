//! Wire packet for Arcadia signaling connections.
//!
//! One packet per text frame, JSON-encoded. The same packet shape is used on
//! both hops (browser <-> Coordinator and worker <-> Coordinator); routing
//! metadata that does not apply to a given kind is left at its empty default
//! and ignored by readers.

use common::{RoomId, SessionId, WorkerId};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// The closed set of packet kinds this protocol speaks.
///
/// Kinds are matched exactly on the wire; anything else decodes to
/// [`PacketKind::Unknown`] and is dropped by dispatch rather than treated as
/// a protocol fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Liveness echo, sent periodically by whichever side dials out.
    Heartbeat,
    /// An ICE candidate from the browser; accumulated, never replied to.
    IceCandidate,
    /// A signaling offer going in; the matching answer comes back as `sdp`.
    InitWebrtc,
    /// A signaling answer pushed toward the browser.
    Sdp,
    /// Join-or-create a room. The reply carries the definitive room id.
    Start,
    /// Persist the current room state. Replies `"ok"` or `"error"` in-band.
    Save,
    /// Restore the current room state. Replies `"ok"` or `"error"` in-band.
    Load,
    /// Explicit teardown requested by the browser.
    Quit,
    /// Worker -> Coordinator: this worker now owns the room in `data`.
    RegisterRoom,
    /// Worker -> Coordinator: who owns the room in `data`? Empty reply data
    /// means "nobody" and signals the caller to create the room itself.
    GetRoom,
    /// Worker -> browser (via the Coordinator): produce a fresh signaling
    /// offer. Used only while bridging a join across two workers.
    RequestOffer,
    /// Coordinator -> worker: your assigned worker id, pushed once at
    /// registration.
    WorkerAssign,
    /// Coordinator -> worker: the browser session in `session_id` is gone;
    /// release whatever it held.
    TerminateSession,
    /// The canonical no-op sentinel (empty kind, empty payload). A handler
    /// returning this sends nothing back.
    Noop,
    /// Any kind this build does not recognize. Ignored by dispatch.
    Unknown,
}

impl PacketKind {
    /// The tag this kind carries on the wire.
    #[must_use]
    pub fn as_wire_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::IceCandidate => "icecandidate",
            Self::InitWebrtc => "initwebrtc",
            Self::Sdp => "sdp",
            Self::Start => "start",
            Self::Save => "save",
            Self::Load => "load",
            Self::Quit => "quit",
            Self::RegisterRoom => "registerRoom",
            Self::GetRoom => "getRoom",
            Self::RequestOffer => "requestOffer",
            Self::WorkerAssign => "workerID",
            Self::TerminateSession => "terminateSession",
            Self::Noop => "",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a wire tag. Unrecognized tags become [`PacketKind::Unknown`].
    #[must_use]
    pub fn from_wire_str(tag: &str) -> Self {
        match tag {
            "heartbeat" => Self::Heartbeat,
            "icecandidate" => Self::IceCandidate,
            "initwebrtc" => Self::InitWebrtc,
            "sdp" => Self::Sdp,
            "start" => Self::Start,
            "save" => Self::Save,
            "load" => Self::Load,
            "quit" => Self::Quit,
            "registerRoom" => Self::RegisterRoom,
            "getRoom" => Self::GetRoom,
            "requestOffer" => Self::RequestOffer,
            "workerID" => Self::WorkerAssign,
            "terminateSession" => Self::TerminateSession,
            "" => Self::Noop,
            _ => Self::Unknown,
        }
    }
}

impl Default for PacketKind {
    fn default() -> Self {
        Self::Noop
    }
}

impl Serialize for PacketKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire_str())
    }
}

impl<'de> Deserialize<'de> for PacketKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_wire_str(&tag))
    }
}

/// One protocol unit on the wire.
///
/// `packet_id` is the correlation id: stamped on every outgoing request and
/// echoed verbatim on its reply. `session_id` identifies the browser session
/// a relayed packet belongs to, and `target_id` names the destination worker
/// during bridging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Packet kind tag.
    #[serde(rename = "id", default)]
    pub kind: PacketKind,

    /// Kind-specific payload, often itself JSON or base64.
    #[serde(default)]
    pub data: String,

    /// Room this packet is scoped to, when joined.
    #[serde(default)]
    pub room_id: RoomId,

    /// 1-based player slot within the room.
    #[serde(default)]
    pub player_index: u8,

    /// Destination worker id; bridging only.
    #[serde(rename = "target_id", default)]
    pub target_worker_id: WorkerId,

    /// Correlation id matching a reply to its request.
    #[serde(rename = "packet_id", default)]
    pub correlation_id: String,

    /// Browser session this packet belongs to.
    #[serde(default)]
    pub session_id: SessionId,
}

impl Packet {
    /// A packet of the given kind with everything else unset.
    #[must_use]
    pub fn new(kind: PacketKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// A packet of the given kind carrying a payload.
    #[must_use]
    pub fn with_data(kind: PacketKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
            ..Self::default()
        }
    }

    /// The canonical no-op sentinel reply.
    #[must_use]
    pub fn noop() -> Self {
        Self::default()
    }

    /// True for the no-op sentinel: empty kind and empty payload.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.kind == PacketKind::Noop && self.data.is_empty()
    }

    /// Builder-style room id.
    #[must_use]
    pub fn in_room(mut self, room_id: RoomId) -> Self {
        self.room_id = room_id;
        self
    }

    /// Builder-style session id.
    #[must_use]
    pub fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    /// Builder-style bridging target.
    #[must_use]
    pub fn to_worker(mut self, worker_id: WorkerId) -> Self {
        self.target_worker_id = worker_id;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let packet = Packet {
            kind: PacketKind::Start,
            data: "game.rom".to_string(),
            room_id: RoomId::from("r-1"),
            player_index: 2,
            target_worker_id: WorkerId::from("w-1"),
            correlation_id: "c-1".to_string(),
            session_id: SessionId::from("s-1"),
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&packet).unwrap()).unwrap();

        assert_eq!(json["id"], "start");
        assert_eq!(json["data"], "game.rom");
        assert_eq!(json["room_id"], "r-1");
        assert_eq!(json["player_index"], 2);
        assert_eq!(json["target_id"], "w-1");
        assert_eq!(json["packet_id"], "c-1");
        assert_eq!(json["session_id"], "s-1");
    }

    #[test]
    fn test_decode_with_missing_fields_defaults() {
        let packet: Packet = serde_json::from_str(r#"{"id":"heartbeat"}"#).unwrap();
        assert_eq!(packet.kind, PacketKind::Heartbeat);
        assert!(packet.data.is_empty());
        assert!(packet.room_id.is_empty());
        assert_eq!(packet.player_index, 0);
        assert!(packet.correlation_id.is_empty());
    }

    #[test]
    fn test_unknown_kind_decodes_to_unknown() {
        let packet: Packet = serde_json::from_str(r#"{"id":"gamelist","data":"x"}"#).unwrap();
        assert_eq!(packet.kind, PacketKind::Unknown);
    }

    #[test]
    fn test_noop_sentinel() {
        assert!(Packet::noop().is_noop());
        assert!(!Packet::new(PacketKind::Heartbeat).is_noop());
        // An empty kind with a payload is not the sentinel.
        assert!(!Packet::with_data(PacketKind::Noop, "x").is_noop());

        let decoded: Packet = serde_json::from_str(r#"{"id":"","data":""}"#).unwrap();
        assert!(decoded.is_noop());
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            PacketKind::Heartbeat,
            PacketKind::IceCandidate,
            PacketKind::InitWebrtc,
            PacketKind::Sdp,
            PacketKind::Start,
            PacketKind::Save,
            PacketKind::Load,
            PacketKind::Quit,
            PacketKind::RegisterRoom,
            PacketKind::GetRoom,
            PacketKind::RequestOffer,
            PacketKind::WorkerAssign,
            PacketKind::TerminateSession,
            PacketKind::Noop,
        ] {
            assert_eq!(PacketKind::from_wire_str(kind.as_wire_str()), kind);

            let json = serde_json::to_string(&Packet::new(kind)).unwrap();
            let back: Packet = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kind, kind);
        }
    }
}
