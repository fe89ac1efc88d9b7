// Service entry point: the datagram dispatcher plus (optionally) the HTTP front door,
// sharing one output store, until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use chroma_lens::config::ServerConfig;
use chroma_lens::server::{self, DatagramServer};
use log::info;
use tokio::sync::watch;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let cfg = ServerConfig::from_env().context("reading configuration from the environment")?;
    info!(
        "output: {} ({} naming, .{}), {} worker thread(s)",
        cfg.output_dir.display(),
        cfg.naming,
        cfg.format.extension(),
        cfg.worker_threads
    );

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.worker_threads)
        .enable_all()
        .build()
        .context("building the tokio runtime")?
        .block_on(serve(cfg))
}

async fn serve(cfg: ServerConfig) -> anyhow::Result<()> {
    let store = Arc::new(cfg.output_store());
    let (stop_tx, stop_rx) = watch::channel(false);

    let dispatcher = DatagramServer::bind(cfg.udp_bind.as_str(), Arc::clone(&store))
        .await
        .with_context(|| format!("binding datagram socket {}", cfg.udp_bind))?;
    let udp = tokio::spawn(dispatcher.run_until(stopped(stop_rx.clone())));

    let http = match &cfg.http_bind {
        Some(bind) => {
            let listener = tokio::net::TcpListener::bind(bind.as_str())
                .await
                .with_context(|| format!("binding http listener {bind}"))?;
            let app = server::router(Arc::clone(&store), cfg.max_body_bytes);
            Some(tokio::spawn(server::http::serve(listener, app, stopped(stop_rx))))
        }
        None => {
            info!("http front door disabled");
            None
        }
    };

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutdown requested");
    let _ = stop_tx.send(true);

    udp.await.context("datagram dispatcher task")?.context("datagram dispatcher")?;
    if let Some(http) = http {
        http.await.context("http task")?.context("http front door")?;
    }
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
