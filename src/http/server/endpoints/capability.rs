use std::sync::Arc;

use warp::Filter;

use crate::capability::CapabilityRegistry;
use crate::http::encoding::{self, reply};

pub fn capability_endpoint(
    registry: Arc<CapabilityRegistry>,
) -> impl warp::Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_registry = warp::any().map(move || registry.clone());

    let index = warp::path::end()
        .and(warp::get())
        .and(with_registry.clone())
        .map(|registry: Arc<CapabilityRegistry>| warp::reply::json(&registry.names()));

    let list = warp::path!(String)
        .and(warp::get())
        .and(with_registry.clone())
        .and_then(|name: String, registry: Arc<CapabilityRegistry>| async move {
            reply::json_encode(registry.list(&name))
        });

    let invoke = warp::path!(String / String)
        .and(warp::post())
        .and(with_registry.clone())
        .and(encoding::bearer())
        .and(
            warp::body::json::<serde_json::Value>()
                .or(warp::any().map(|| serde_json::Value::Null))
                .unify(),
        )
        .and_then(
            |name: String, operation: String, registry: Arc<CapabilityRegistry>, token, args| async move {
                reply::json_encode(registry.invoke(&token, &name, &operation, args).await)
            },
        );

    index.or(list).or(invoke)
}
