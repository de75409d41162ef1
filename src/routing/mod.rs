mod resolver;

pub use resolver::{
    AgentRoute, DEFAULT_ACCOUNT_ID, Peer, PeerKind, RouteRequest, resolve_agent_route,
};
