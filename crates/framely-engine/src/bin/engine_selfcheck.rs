use framely_engine::logging::init_tracing;
use framely_engine::metrics::{init_metrics, names};
use framely_engine::{EngineConfig, Phase, ResourcePool, StageGraph};
use framely_vl_client::VlClient;
use metrics_exporter_prometheus::PrometheusHandle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let metrics = init_metrics()?;

    let config = EngineConfig::load()?;
    println!(
        "engine-selfcheck: starting with config={} gpu_semaphore={}",
        config.source.display(),
        config.analysis.runtime.gpu_semaphore
    );

    ensure_stage_graph();
    ensure_pool(config.analysis.runtime.gpu_semaphore).await?;
    ensure_metrics(&metrics)?;
    check_reasoning_service().await;

    println!("engine-selfcheck: ok");
    Ok(())
}

fn ensure_stage_graph() {
    let graph = StageGraph::standard();
    for (i, group) in graph.groups().iter().enumerate() {
        let names: Vec<&str> = group.iter().map(|s| s.as_str()).collect();
        println!("engine-selfcheck: group {} [{}]", i, names.join(", "));
    }
    println!(
        "engine-selfcheck: {} accelerator stages in the GPU phase",
        graph.stages_in(Phase::Gpu).len()
    );
}

async fn ensure_pool(max: usize) -> anyhow::Result<()> {
    let pool = ResourcePool::new(max);
    let permit = pool
        .acquire()
        .await
        .map_err(|e| anyhow::anyhow!("resource pool unusable: {}", e))?;
    if pool.active() != 1 {
        return Err(anyhow::anyhow!(
            "resource pool reports {} active holders, expected 1",
            pool.active()
        ));
    }
    drop(permit);
    Ok(())
}

/// The pool check must have reached the installed recorder.
fn ensure_metrics(handle: &PrometheusHandle) -> anyhow::Result<()> {
    let rendered = handle.render();
    if !rendered.contains(names::POOL_ACTIVE) {
        return Err(anyhow::anyhow!(
            "metrics recorder did not receive {}",
            names::POOL_ACTIVE
        ));
    }
    println!(
        "engine-selfcheck: metrics recorder ok ({} series lines)",
        rendered.lines().filter(|l| !l.starts_with('#')).count()
    );
    Ok(())
}

/// The reasoning service is optional at startup; report but do not fail.
async fn check_reasoning_service() {
    match VlClient::from_env() {
        Ok(client) => match client.health_check().await {
            Ok(true) => println!(
                "engine-selfcheck: reasoning service reachable at {}",
                client.config().base_url
            ),
            _ => println!(
                "engine-selfcheck: warning: reasoning service unreachable at {}",
                client.config().base_url
            ),
        },
        Err(e) => println!("engine-selfcheck: warning: reasoning client init failed: {}", e),
    }
}
