use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account id used by single-account deployments that predate multi-account
/// channel support. Session keys for this account carry no account suffix.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Markers channels append to a peer id when a conversation is threaded
/// (Telegram forum topics, Discord threads). The main session ignores them.
const THREAD_MARKERS: [&str; 2] = [":topic:", ":thread:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PeerKind {
    Dm,
    Channel,
    Group,
}

/// The remote end of a conversation: a direct chat, a shared channel, or a
/// group, identified by the channel adapter's native id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub kind: PeerKind,
    pub id: String,
}

impl Peer {
    pub fn new(kind: PeerKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// The peer's primary context: the same peer with any sub-thread suffix
    /// stripped from its id.
    pub fn primary(&self) -> Peer {
        let id = THREAD_MARKERS
            .iter()
            .filter_map(|marker| self.id.find(marker))
            .min()
            .map_or_else(|| self.id.clone(), |cut| self.id[..cut].to_string());
        Peer {
            kind: self.kind,
            id,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Addressing input for one inbound or outbound operation.
#[derive(Debug, Clone)]
pub struct RouteRequest<'a> {
    pub channel: &'a str,
    pub account_id: &'a str,
    pub peer: Peer,
}

/// A resolved addressing result. Computed fresh per operation; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRoute {
    pub agent_id: String,
    pub channel: String,
    pub account_id: String,
    pub peer: Peer,
    pub session_key: String,
    pub main_session_key: String,
}

/// Derive the session identifiers for `(agent, channel, account, peer)`.
///
/// Resolution is total: unknown channels or accounts still produce a
/// syntactically valid key. Distinct non-default accounts on the same channel
/// and peer always produce distinct keys, so two bot accounts sharing one
/// channel never share conversation state. The default account's key carries
/// no account suffix, keeping pre-multi-account session stores addressable.
pub fn resolve_agent_route(config: &Config, request: &RouteRequest<'_>) -> AgentRoute {
    let agent_id = config.agents.default_agent_id().to_string();
    let channel = request.channel.trim().to_ascii_lowercase();
    let account_id = normalize_account_id(request.account_id);

    let session_key = session_key_for(&agent_id, &channel, &request.peer, &account_id);
    let main_session_key = session_key_for(&agent_id, &channel, &request.peer.primary(), &account_id);

    AgentRoute {
        agent_id,
        channel,
        account_id,
        peer: request.peer.clone(),
        session_key,
        main_session_key,
    }
}

fn normalize_account_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_ACCOUNT_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

fn session_key_for(agent_id: &str, channel: &str, peer: &Peer, account_id: &str) -> String {
    let mut key = format!("agent:{agent_id}:{channel}:{}:{}", peer.kind, peer.id);
    if account_id != DEFAULT_ACCOUNT_ID {
        key.push(':');
        key.push_str(account_id);
    }
    key
}
