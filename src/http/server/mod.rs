use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

use crate::capability::CapabilityRegistry;
use crate::provider::TokenBroker;

pub mod endpoints;

use endpoints::{
    capability::capability_endpoint,
    client::client_endpoint,
    discovery::discovery_endpoint,
    oauth::oauth_endpoint,
};

use super::encoding::error::handle_reject;

#[derive(Debug)]
pub struct Server {
    provider: Arc<TokenBroker>,
    registry: Arc<CapabilityRegistry>,
}

impl Server {
    pub fn new(provider: Arc<TokenBroker>, registry: Arc<CapabilityRegistry>) -> Self {
        Self { provider, registry }
    }

    /// The complete route tree, without the transport.
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let provider = Arc::clone(&self.provider);

        let oauth = warp::path("oauth")
            .and(oauth_endpoint(provider.clone()).or(client_endpoint(provider.clone())));

        let discovery = discovery_endpoint(provider.clone());

        let api = warp::path("api").and(capability_endpoint(Arc::clone(&self.registry)));

        let cors = warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
            .allow_headers(vec!["authorization", "content-type", "mcp-session-id"]);

        oauth
            .or(discovery)
            .or(api)
            .recover(handle_reject)
            .with(warp::log("dcr-broker::http"))
            .with(cors)
    }

    pub async fn serve(self, address: SocketAddr) {
        let routes = self.routes();
        warp::serve(routes).run(address).await;
    }
}
