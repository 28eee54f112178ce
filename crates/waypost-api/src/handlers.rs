//! HTTP API handlers. Exposes the registry as JSON.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use waypost_core::names::{is_valid_channel_name, is_valid_topic_name};
use waypost_core::wire::NodeInfo;
use waypost_registry::{Category, PeerIdentity, Producer, Registration, RegistrationDb, ANY};

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<RegistrationDb>,
    pub node_info: Arc<NodeInfo>,
}

impl ApiState {
    pub fn new(registry: Arc<RegistrationDb>, node_info: Arc<NodeInfo>) -> Self {
        Self {
            registry,
            node_info,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// A 4xx answer. The body is `{"message": "<CODE>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: &'static str,
}

impl ApiError {
    fn bad_request(message: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn not_found(message: &'static str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.message.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

// ── Query parameters ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct Params {
    pub topic: Option<String>,
    pub channel: Option<String>,
    pub node: Option<String>,
}

impl Params {
    fn topic(&self) -> Result<&str, ApiError> {
        let topic = self
            .topic
            .as_deref()
            .ok_or(ApiError::bad_request("MISSING_ARG_TOPIC"))?;
        if !is_valid_topic_name(topic) {
            return Err(ApiError::bad_request("INVALID_ARG_TOPIC"));
        }
        Ok(topic)
    }

    fn topic_and_channel(&self) -> Result<(&str, &str), ApiError> {
        let topic = self.topic()?;
        let channel = self
            .channel
            .as_deref()
            .ok_or(ApiError::bad_request("MISSING_ARG_CHANNEL"))?;
        if !is_valid_channel_name(channel) {
            return Err(ApiError::bad_request("INVALID_ARG_CHANNEL"));
        }
        Ok((topic, channel))
    }

    fn node(&self) -> Result<&str, ApiError> {
        self.node
            .as_deref()
            .filter(|node| !node.is_empty())
            .ok_or(ApiError::bad_request("MISSING_ARG_NODE"))
    }
}

// ── Shared views ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    pub remote_address: String,
    pub hostname: String,
    pub broadcast_address: String,
    pub tcp_port: u16,
    pub http_port: u16,
    pub version: String,
}

impl From<&PeerIdentity> for PeerInfo {
    fn from(identity: &PeerIdentity) -> Self {
        Self {
            remote_address: identity.remote_address.to_string(),
            hostname: identity.hostname.clone(),
            broadcast_address: identity.broadcast_address.clone(),
            tcp_port: identity.tcp_port,
            http_port: identity.http_port,
            version: identity.version.clone(),
        }
    }
}

fn peer_infos(producers: &[Producer]) -> Vec<PeerInfo> {
    producers
        .iter()
        .map(|p| PeerInfo::from(p.identity().as_ref()))
        .collect()
}

// ── /ping, /info ──────────────────────────────────────────────────────────────

pub async fn handle_ping() -> &'static str {
    "OK"
}

#[derive(Serialize, Deserialize)]
pub struct InfoResponse {
    pub version: String,
}

pub async fn handle_info(State(state): State<ApiState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        version: state.node_info.version.clone(),
    })
}

// ── /topics, /channels ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicsResponse {
    pub topics: Vec<String>,
}

pub async fn handle_topics(State(state): State<ApiState>) -> Json<TopicsResponse> {
    let topics = state
        .registry
        .find_registrations(Category::Topic.as_str(), ANY, "")
        .into_iter()
        .map(|key| key.topic)
        .collect();
    Json(TopicsResponse { topics })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelsResponse {
    pub channels: Vec<String>,
}

fn channel_names(registry: &RegistrationDb, topic: &str) -> Vec<String> {
    registry
        .find_registrations(Category::Channel.as_str(), topic, ANY)
        .into_iter()
        .map(|key| key.channel)
        .collect()
}

pub async fn handle_channels(
    State(state): State<ApiState>,
    Query(params): Query<Params>,
) -> Result<Json<ChannelsResponse>, ApiError> {
    let topic = params.topic()?;
    Ok(Json(ChannelsResponse {
        channels: channel_names(&state.registry, topic),
    }))
}

// ── /lookup ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct LookupResponse {
    pub channels: Vec<String>,
    pub producers: Vec<PeerInfo>,
}

pub async fn handle_lookup(
    State(state): State<ApiState>,
    Query(params): Query<Params>,
) -> Result<Json<LookupResponse>, ApiError> {
    let topic = params.topic()?;
    let key = Registration::topic(topic);
    if state
        .registry
        .find_registrations(Category::Topic.as_str(), topic, "")
        .is_empty()
    {
        return Err(ApiError::not_found("TOPIC_NOT_FOUND"));
    }

    let producers = state
        .registry
        .find_producers(key.category.as_str(), &key.topic, &key.channel);
    Ok(Json(LookupResponse {
        channels: channel_names(&state.registry, topic),
        producers: peer_infos(&producers),
    }))
}

// ── /nodes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct NodesResponse {
    pub producers: Vec<NodeEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeEntry {
    #[serde(flatten)]
    pub peer: PeerInfo,
    pub topics: Vec<String>,
    /// Parallel to `topics`: whether the producer is tombstoned under it.
    pub tombstones: Vec<bool>,
}

pub async fn handle_nodes(State(state): State<ApiState>) -> Json<NodesResponse> {
    let producers = state
        .registry
        .all_producers()
        .into_iter()
        .map(|producer| {
            let id = producer.id();
            let (topics, tombstones) = state
                .registry
                .lookup_registrations(id)
                .into_iter()
                .filter(|key| key.category == Category::Topic)
                .map(|key| {
                    let tombstoned = state
                        .registry
                        .get_producer(&key, id)
                        .is_some_and(|p| p.is_tombstoned());
                    (key.topic, tombstoned)
                })
                .unzip();
            NodeEntry {
                peer: PeerInfo::from(producer.identity().as_ref()),
                topics,
                tombstones,
            }
        })
        .collect();
    Json(NodesResponse { producers })
}

// ── /debug ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct DebugProducer {
    #[serde(flatten)]
    pub peer: PeerInfo,
    pub last_update_ms_ago: u64,
    pub tombstoned: bool,
    pub tombstoned_ms_ago: Option<u64>,
}

/// Every registration, keyed `topic:<t>` or `channel:<t>:<c>`.
pub async fn handle_debug(
    State(state): State<ApiState>,
) -> Json<BTreeMap<String, Vec<DebugProducer>>> {
    let now = Instant::now();
    let ms_ago = |at: Instant| now.saturating_duration_since(at).as_millis() as u64;
    let snapshot = state
        .registry
        .snapshot()
        .into_iter()
        .map(|(key, producers)| {
            let producers = producers
                .iter()
                .map(|p| DebugProducer {
                    peer: PeerInfo::from(p.identity().as_ref()),
                    last_update_ms_ago: ms_ago(p.last_update()),
                    tombstoned: p.is_tombstoned(),
                    tombstoned_ms_ago: p.tombstoned_at().map(ms_ago),
                })
                .collect();
            (key.to_string(), producers)
        })
        .collect();
    Json(snapshot)
}

// ── Topic and channel admin ──────────────────────────────────────────────────

pub async fn handle_topic_create(
    State(state): State<ApiState>,
    Query(params): Query<Params>,
) -> Result<StatusCode, ApiError> {
    let topic = params.topic()?;
    if state.registry.add_registration(Registration::topic(topic)) {
        tracing::info!(topic, "topic created");
    }
    Ok(StatusCode::OK)
}

pub async fn handle_topic_delete(
    State(state): State<ApiState>,
    Query(params): Query<Params>,
) -> Result<StatusCode, ApiError> {
    let topic = params.topic()?;

    let removed = state.registry.remove_topic(topic);
    if removed.is_empty() {
        return Err(ApiError::not_found("TOPIC_NOT_FOUND"));
    }
    let channels = removed
        .iter()
        .filter(|key| key.category == Category::Channel)
        .count();
    tracing::info!(topic, channels, "topic deleted");
    Ok(StatusCode::OK)
}

pub async fn handle_topic_tombstone(
    State(state): State<ApiState>,
    Query(params): Query<Params>,
) -> Result<StatusCode, ApiError> {
    let topic = params.topic()?;
    let node = params.node()?;
    let key = Registration::topic(topic);

    let mut tombstoned = 0;
    for producer in state
        .registry
        .find_producers(key.category.as_str(), &key.topic, &key.channel)
    {
        if producer.identity().http_endpoint() != node {
            continue;
        }
        if state.registry.tombstone(&key, producer.id()).is_ok() {
            tracing::info!(topic, node, producer = %producer.id(), "producer tombstoned");
            tombstoned += 1;
        }
    }

    if tombstoned == 0 {
        return Err(ApiError::not_found("PRODUCER_NOT_FOUND"));
    }
    Ok(StatusCode::OK)
}

pub async fn handle_channel_create(
    State(state): State<ApiState>,
    Query(params): Query<Params>,
) -> Result<StatusCode, ApiError> {
    let (topic, channel) = params.topic_and_channel()?;
    if state
        .registry
        .add_registration(Registration::channel(topic, channel))
    {
        tracing::info!(topic, channel, "channel created");
    }
    Ok(StatusCode::OK)
}

pub async fn handle_channel_delete(
    State(state): State<ApiState>,
    Query(params): Query<Params>,
) -> Result<StatusCode, ApiError> {
    let (topic, channel) = params.topic_and_channel()?;
    state
        .registry
        .remove_registration(&Registration::channel(topic, channel))
        .map_err(|_| ApiError::not_found("CHANNEL_NOT_FOUND"))?;
    tracing::info!(topic, channel, "channel deleted");
    Ok(StatusCode::OK)
}
