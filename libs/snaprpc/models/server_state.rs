//! Typed snapshot of a Snapcast server
//!
//! Parsed from the `Server.GetStatus` result. The wire format nests
//! everything under `server`, with clients living inside their groups; we
//! flatten clients into one list and keep only their ids on the group.
//! Missing fields take defaults rather than failing the whole snapshot.

use crate::error::{Result, SnapError};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Information about the server host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerInfo {
    pub name: String,
    pub host: String,
    pub version: String,
    pub mac: String,
}

/// A set of clients playing the same stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub stream_id: String,
    pub muted: bool,
    pub client_ids: Vec<String>,
}

impl Group {
    pub fn client_count(&self) -> usize {
        self.client_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.client_ids.is_empty()
    }
}

/// An audio endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Client {
    pub id: String,
    pub host: String,
    pub name: String,
    pub mac: String,
    /// Always within 0..=100
    pub volume: u8,
    pub muted: bool,
    pub connected: bool,
    /// Latency offset in milliseconds
    pub latency: i32,
    pub snapclient_version: String,
    pub last_seen_sec: u64,
    pub last_seen_usec: u64,
    pub host_os: String,
    pub host_arch: String,
    pub host_name: String,
}

impl Client {
    /// Configured name, or the host when unnamed
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.host
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceStatus {
    Playing,
    #[default]
    Idle,
    Unknown,
}

impl SourceStatus {
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "playing" => SourceStatus::Playing,
            "idle" => SourceStatus::Idle,
            _ => SourceStatus::Unknown,
        }
    }
}

/// An audio stream offered by the server
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub status: SourceStatus,
    pub codec: String,
    pub sample_format: String,
    pub uri_scheme: String,
    pub uri_raw: String,
    pub meta_title: String,
    pub meta_artist: String,
    pub meta_album: String,
    pub meta_art_url: String,
}

impl Source {
    pub fn is_playing(&self) -> bool {
        self.status == SourceStatus::Playing
    }
}

/// Complete server snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerState {
    pub server: ServerInfo,
    pub groups: Vec<Group>,
    pub clients: Vec<Client>,
    pub sources: Vec<Source>,
}

impl ServerState {
    /// Parse the result object of `Server.GetStatus`
    pub fn from_status(result: Value) -> Result<Self> {
        let raw: RawStatus = serde_json::from_value(result)
            .map_err(|e| SnapError::ProtocolViolation(format!("malformed server status: {}", e)))?;
        Ok(raw.into())
    }

    pub fn get_client(&self, client_id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == client_id)
    }

    pub fn get_group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    pub fn get_source(&self, source_id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == source_id)
    }

    /// The group a client belongs to
    pub fn group_of(&self, client_id: &str) -> Option<&Group> {
        self.groups
            .iter()
            .find(|g| g.client_ids.iter().any(|id| id == client_id))
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn connected_client_count(&self) -> usize {
        self.clients.iter().filter(|c| c.connected).count()
    }
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawStatus {
    server: RawServer,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawServer {
    server: RawServerInfo,
    groups: Vec<RawGroup>,
    streams: Vec<RawStream>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawServerInfo {
    snapserver: RawSnapserver,
    host: RawHost,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSnapserver {
    version: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawHost {
    name: String,
    ip: String,
    mac: String,
    os: String,
    arch: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawGroup {
    id: String,
    name: String,
    stream_id: String,
    muted: bool,
    clients: Vec<RawClient>,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawClient {
    id: String,
    connected: bool,
    config: RawClientConfig,
    host: RawHost,
    snapclient: RawSnapclient,
    #[serde(rename = "lastSeen")]
    last_seen: RawLastSeen,
}

impl Default for RawClient {
    fn default() -> Self {
        Self {
            id: String::new(),
            connected: true,
            config: RawClientConfig::default(),
            host: RawHost::default(),
            snapclient: RawSnapclient::default(),
            last_seen: RawLastSeen::default(),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawClientConfig {
    name: String,
    latency: i32,
    volume: RawVolume,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawVolume {
    percent: i64,
    muted: bool,
}

impl Default for RawVolume {
    fn default() -> Self {
        Self {
            percent: 50,
            muted: false,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSnapclient {
    version: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawLastSeen {
    sec: u64,
    usec: u64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawStream {
    id: String,
    status: String,
    uri: RawUri,
    properties: RawStreamProperties,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawUri {
    scheme: String,
    raw: String,
    query: RawUriQuery,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawUriQuery {
    name: Option<String>,
    codec: String,
    sampleformat: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawStreamProperties {
    codec: Option<RawCodec>,
    #[serde(rename = "sampleFormat")]
    sample_format: Option<String>,
    metadata: Option<RawMetadata>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawCodec {
    name: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawMetadata {
    title: Option<Value>,
    artist: Option<Value>,
    album: Option<Value>,
    #[serde(rename = "artUrl")]
    art_url: Option<Value>,
}

/// Render a metadata value as display text; lists are comma-joined
fn metadata_text(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

impl From<RawStatus> for ServerState {
    fn from(raw: RawStatus) -> Self {
        let RawServer {
            server: info,
            groups: raw_groups,
            streams,
        } = raw.server;

        let host = if info.host.ip.is_empty() {
            info.host.name.clone()
        } else {
            info.host.ip.clone()
        };
        let server = ServerInfo {
            name: if info.host.name.is_empty() {
                "Unknown".to_string()
            } else {
                info.host.name.clone()
            },
            host,
            version: info.snapserver.version,
            mac: info.host.mac,
        };

        let mut groups = Vec::with_capacity(raw_groups.len());
        let mut clients = Vec::new();
        for g in raw_groups {
            let client_ids = g.clients.iter().map(|c| c.id.clone()).collect();
            clients.extend(g.clients.into_iter().map(Client::from));
            groups.push(Group {
                id: g.id,
                name: g.name,
                stream_id: g.stream_id,
                muted: g.muted,
                client_ids,
            });
        }

        let sources = streams.into_iter().map(Source::from).collect();

        ServerState {
            server,
            groups,
            clients,
            sources,
        }
    }
}

impl From<RawClient> for Client {
    fn from(c: RawClient) -> Self {
        let percent = c.config.volume.percent;
        let volume = percent.clamp(0, 100);
        if volume != percent {
            warn!("Client {} volume {} out of range, clamped to {}", c.id, percent, volume);
        }

        Client {
            id: c.id,
            host: c.host.ip,
            name: c.config.name,
            mac: c.host.mac,
            volume: volume as u8,
            muted: c.config.volume.muted,
            connected: c.connected,
            latency: c.config.latency,
            snapclient_version: c.snapclient.version,
            last_seen_sec: c.last_seen.sec,
            last_seen_usec: c.last_seen.usec,
            host_os: c.host.os,
            host_arch: c.host.arch,
            host_name: c.host.name,
        }
    }
}

impl From<RawStream> for Source {
    fn from(s: RawStream) -> Self {
        let RawUri { scheme, raw, query } = s.uri;
        let properties = s.properties;

        // Newer servers report the codec under properties, older ones only in the URI query
        let codec = properties
            .codec
            .map(|c| c.name)
            .filter(|name| !name.is_empty())
            .unwrap_or(query.codec);
        let sample_format = properties.sample_format.unwrap_or(query.sampleformat);
        let metadata = properties.metadata.unwrap_or_default();

        Source {
            name: query.name.unwrap_or_else(|| s.id.clone()),
            id: s.id,
            status: SourceStatus::parse(&s.status),
            codec,
            sample_format,
            uri_scheme: scheme,
            uri_raw: raw,
            meta_title: metadata_text(metadata.title),
            meta_artist: metadata_text(metadata.artist),
            meta_album: metadata_text(metadata.album),
            meta_art_url: metadata_text(metadata.art_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_status() -> Value {
        json!({
            "server": {
                "server": {
                    "snapserver": {"version": "0.28.0"},
                    "host": {"name": "media", "ip": "10.0.0.2", "mac": "aa:bb:cc:dd:ee:ff"}
                },
                "groups": [
                    {
                        "id": "g1",
                        "name": "Downstairs",
                        "stream_id": "spotify",
                        "muted": false,
                        "clients": [
                            {
                                "id": "kitchen",
                                "connected": true,
                                "host": {"ip": "10.0.0.10", "name": "kitchen-pi", "os": "Raspbian", "arch": "armv7l"},
                                "config": {"name": "Kitchen", "latency": 20, "volume": {"percent": 35, "muted": false}},
                                "snapclient": {"version": "0.28.0"},
                                "lastSeen": {"sec": 1700000000, "usec": 5}
                            },
                            {
                                "id": "lounge",
                                "connected": false,
                                "host": {"ip": "10.0.0.11"},
                                "config": {"volume": {"percent": 180, "muted": true}}
                            }
                        ]
                    },
                    {"id": "g2", "clients": []}
                ],
                "streams": [
                    {
                        "id": "spotify",
                        "status": "playing",
                        "uri": {"scheme": "librespot", "raw": "librespot:///x", "query": {"name": "Spotify", "codec": "flac"}},
                        "properties": {
                            "metadata": {"title": "Song", "artist": ["A", "B"], "album": "LP", "artUrl": "http://art"}
                        }
                    },
                    {"id": "radio", "status": "idle", "properties": {"codec": {"name": "pcm"}, "sampleFormat": "48000:16:2"}}
                ]
            }
        })
    }

    #[test]
    fn test_parse_full_status() {
        let state = ServerState::from_status(sample_status()).unwrap();

        assert_eq!(state.server.name, "media");
        assert_eq!(state.server.host, "10.0.0.2");
        assert_eq!(state.server.version, "0.28.0");
        assert_eq!(state.group_count(), 2);
        assert_eq!(state.client_count(), 2);
        assert_eq!(state.source_count(), 2);

        let group = state.get_group("g1").unwrap();
        assert_eq!(group.client_ids, vec!["kitchen", "lounge"]);
        assert!(state.get_group("g2").unwrap().is_empty());

        let kitchen = state.get_client("kitchen").unwrap();
        assert_eq!(kitchen.display_name(), "Kitchen");
        assert_eq!(kitchen.volume, 35);
        assert_eq!(kitchen.latency, 20);
        assert_eq!(kitchen.host_os, "Raspbian");
        assert_eq!(state.group_of("kitchen").unwrap().id, "g1");
    }

    #[test]
    fn test_volume_clamped_and_defaults_applied() {
        let state = ServerState::from_status(sample_status()).unwrap();
        let lounge = state.get_client("lounge").unwrap();

        assert_eq!(lounge.volume, 100);
        assert!(lounge.muted);
        assert!(!lounge.connected);
        assert_eq!(lounge.display_name(), "10.0.0.11");
        assert_eq!(state.connected_client_count(), 1);
    }

    #[test]
    fn test_stream_fields() {
        let state = ServerState::from_status(sample_status()).unwrap();

        let spotify = state.get_source("spotify").unwrap();
        assert!(spotify.is_playing());
        assert_eq!(spotify.name, "Spotify");
        assert_eq!(spotify.codec, "flac");
        assert_eq!(spotify.meta_artist, "A, B");
        assert_eq!(spotify.meta_art_url, "http://art");

        let radio = state.get_source("radio").unwrap();
        assert_eq!(radio.name, "radio");
        assert_eq!(radio.codec, "pcm");
        assert_eq!(radio.sample_format, "48000:16:2");
        assert_eq!(radio.status, SourceStatus::Idle);
    }

    #[test]
    fn test_empty_status() {
        let state = ServerState::from_status(json!({})).unwrap();
        assert_eq!(state.server.name, "Unknown");
        assert_eq!(state.client_count(), 0);
    }

    #[test]
    fn test_malformed_status() {
        let result = ServerState::from_status(json!({"server": {"groups": "nope"}}));
        assert!(matches!(result, Err(SnapError::ProtocolViolation(_))));
    }
}
