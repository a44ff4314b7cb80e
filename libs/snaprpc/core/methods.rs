//! Snapcast method and notification names, and the params each verb takes

use serde_json::{json, Value};

pub const SERVER_GET_STATUS: &str = "Server.GetStatus";
pub const SERVER_GET_RPC_VERSION: &str = "Server.GetRPCVersion";

pub const CLIENT_SET_VOLUME: &str = "Client.SetVolume";
pub const CLIENT_SET_LATENCY: &str = "Client.SetLatency";
pub const CLIENT_SET_NAME: &str = "Client.SetName";
pub const CLIENT_GET_TIME_STATS: &str = "Client.GetTimeStats";

pub const GROUP_SET_MUTE: &str = "Group.SetMute";
pub const GROUP_SET_STREAM: &str = "Group.SetStream";
pub const GROUP_SET_NAME: &str = "Group.SetName";

pub const CLIENT_ON_CONNECT: &str = "Client.OnConnect";
pub const CLIENT_ON_DISCONNECT: &str = "Client.OnDisconnect";
pub const CLIENT_ON_VOLUME_CHANGED: &str = "Client.OnVolumeChanged";
pub const CLIENT_ON_LATENCY_CHANGED: &str = "Client.OnLatencyChanged";
pub const CLIENT_ON_NAME_CHANGED: &str = "Client.OnNameChanged";
pub const GROUP_ON_MUTE: &str = "Group.OnMute";
pub const GROUP_ON_STREAM_CHANGED: &str = "Group.OnStreamChanged";
pub const GROUP_ON_NAME_CHANGED: &str = "Group.OnNameChanged";
pub const STREAM_ON_UPDATE: &str = "Stream.OnUpdate";
pub const STREAM_ON_PROPERTIES: &str = "Stream.OnProperties";
pub const SERVER_ON_UPDATE: &str = "Server.OnUpdate";

/// Maximum volume percent accepted by the server
pub const MAX_VOLUME: u8 = 100;

pub fn client_id_params(client_id: &str) -> Value {
    json!({"id": client_id})
}

pub fn client_volume_params(client_id: &str, percent: u8, muted: bool) -> Value {
    json!({
        "id": client_id,
        "volume": {"percent": percent.min(MAX_VOLUME), "muted": muted},
    })
}

/// Mute toggle without touching the level
pub fn client_mute_params(client_id: &str, muted: bool) -> Value {
    json!({"id": client_id, "volume": {"muted": muted}})
}

pub fn client_latency_params(client_id: &str, latency_ms: i32) -> Value {
    json!({"id": client_id, "latency": latency_ms})
}

pub fn client_name_params(client_id: &str, name: &str) -> Value {
    json!({"id": client_id, "name": name})
}

pub fn group_mute_params(group_id: &str, muted: bool) -> Value {
    json!({"id": group_id, "mute": muted})
}

pub fn group_stream_params(group_id: &str, stream_id: &str) -> Value {
    json!({"id": group_id, "stream_id": stream_id})
}

pub fn group_name_params(group_id: &str, name: &str) -> Value {
    json!({"id": group_id, "name": name})
}
