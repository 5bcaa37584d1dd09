use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use stylist_core::{ModelSlot, StableDiffusionLoader};
use stylist_server::{
    config::EditorArgs,
    editor::{self, EditorState},
    serve, telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let args = EditorArgs::parse();

    let loader = StableDiffusionLoader::new(args.device_map());
    let state = Arc::new(EditorState {
        slot: ModelSlot::new(loader, &args.model),
    });

    if args.lazy {
        tracing::info!(model = %state.slot.default_source(), "model will be loaded on first request");
    } else if let Err(err) = state.slot.get(None, None).await {
        tracing::warn!(%err, "preload failed, model will be loaded on first request");
    }

    serve(editor::router(state), &args.host, args.port).await
}
