pub mod authorization;
pub mod context;
pub mod error;
pub mod forwarder;
pub mod gateway;
pub mod route_table;
pub mod targets;
pub mod token;

pub use context::RequestContext;
pub use error::GatewayError;
pub use forwarder::ProxyForwarder;
pub use gateway::GatewayService;
pub use route_table::{Access, RouteMatch, RouteRule, RouteTable, RouteTableError};
pub use targets::{ServiceTarget, TargetResolver};
pub use token::{AuthError, TokenClaims, TokenValidator};
