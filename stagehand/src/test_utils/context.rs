use crate::runtime::{Builder, Runtime, local, stealing};
use anyhow::Result;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_local_runtime(builder: Option<Builder>) -> Result<(Runtime, local::Handle)> {
    let builder = builder.unwrap_or(Builder::new_local());
    let runtime = builder.try_build()?;
    let handle = runtime.expect_local_scheduler();

    Ok((runtime, handle))
}

pub(crate) fn init_stealing_runtime(
    worker_threads: usize,
    builder: Option<Builder>,
) -> Result<(Runtime, stealing::Handle)> {
    let builder = builder
        .unwrap_or(Builder::new_stealing())
        .worker_threads(worker_threads);

    let runtime = builder.try_build()?;
    let handle = runtime.expect_stealing_scheduler();

    Ok((runtime, handle))
}

/// Installs a test writer subscriber once per process. Filter with
/// `RUST_LOG`, e.g. `RUST_LOG=stagehand=trace`.
pub(crate) fn init_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
