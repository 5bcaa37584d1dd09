use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use stylist_core::{ModelSlot, Phi3Loader};
use stylist_server::{
    config::RecommenderArgs,
    recommender::{self, RecommenderState},
    serve, telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let args = RecommenderArgs::parse();

    let state = Arc::new(RecommenderState {
        slot: ModelSlot::new(Phi3Loader::new(args.device_map()), &args.model),
        sampling: args.sampling(),
    });

    if args.lazy {
        tracing::info!(model = %state.slot.default_source(), "model will be loaded on first request");
    } else if let Err(err) = state.slot.get(None, None).await {
        tracing::warn!(%err, "preload failed, model will be loaded on first request");
    }

    serve(recommender::router(state), &args.host, args.port).await
}
