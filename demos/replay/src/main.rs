//! SPATIA Replay Demo
//!
//! Drives the full pipeline with a synthetic camera and a seeded pose model:
//! - landmark dropouts at a chosen severity
//! - hold-last-valid and hide-after-timeout per stream
//! - damped face anchor
//!
//! Usage: spatia-replay [config.json] [seconds] [clean|flaky|hostile]

mod summary;

use std::sync::Arc;
use std::time::Duration;

use spatia_core::StreamKind;
use spatia_runtime::{init_logging, FrameDispatchLoop, PipelineConfig, PipelineParts, TokioClock};
use spatia_test::{
    run_for, DropoutConfig, LandmarkGenerator, PlaneEnvironment, ScriptedGraph, SyntheticSource,
    VecFramePool,
};

use summary::SummarySink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let config = match args.next().filter(|a| a != "-") {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(5);
    let dropouts = match args.next().as_deref() {
        Some("clean") => DropoutConfig::clean(),
        Some("hostile") => DropoutConfig::hostile(),
        _ => DropoutConfig::flaky(),
    };

    init_logging(&config.logging);

    println!("SPATIA replay: {:?} dispatch, {}s, dropouts {:?}", config.dispatch.mode, seconds, dropouts);

    let mut generator = LandmarkGenerator::with_seed(dropouts, 0x5EED);
    let graph = ScriptedGraph::new(move |frame_id| generator.holistic(frame_id));
    let sink = Arc::new(SummarySink::new());
    let pipeline = FrameDispatchLoop::new(
        &config,
        PipelineParts {
            source: Box::new(SyntheticSource::small()),
            pool: Box::new(VecFramePool::new()),
            graph: Box::new(graph),
            environment: Arc::new(PlaneEnvironment::wall()),
            sink: sink.clone(),
            clock: Arc::new(TokioClock::new()),
        },
    )?;
    let streams = pipeline.stream_kinds();

    let (pipeline, result) = run_for(pipeline, Duration::from_secs(seconds)).await;
    result?;

    let stats = pipeline.stats();
    println!();
    println!("iterations         {}", stats.iterations);
    println!("frames submitted   {}", stats.frames_submitted);
    println!("capture failures   {}", stats.readback_failures);
    println!("pool waits         {}", stats.pool_waits);
    println!("lists dispatched   {}", stats.results_dispatched);
    println!("out of order       {}", stats.out_of_order_dropped);
    println!();

    for kind in streams {
        if kind == StreamKind::FaceAnchor {
            let anchor = sink.anchor();
            println!("{:<13} shown {} times, {} poses", kind.name(), anchor.shows, anchor.poses);
            continue;
        }
        let summary = sink.stream(kind);
        println!(
            "{:<13} {} frames, {} visible, {} held points drawn",
            kind.name(),
            summary.frames,
            summary.visible,
            summary.held_points
        );
    }

    tracing::info!("replay finished");
    Ok(())
}
