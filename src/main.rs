use distributed_cache::group::cache::Group;
use distributed_cache::group::handlers;
use distributed_cache::group::registry::GroupRegistry;
use distributed_cache::group::types::ByteView;
use distributed_cache::peers::pool::PeerPool;
use distributed_cache::peers::registry::PeerRegistry;
use distributed_cache::peers::types::PeerPoolOptions;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

fn flag_value<'a>(args: &'a [String], i: usize) -> anyhow::Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing value for {}", args[i]))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--peer <http://addr:port>]... [--base-path <path>] [--replicas <n>]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:8000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:8001 --peer http://127.0.0.1:8000",
            args[0]
        );

        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut peer_urls: Vec<String> = vec![];
    let mut options = PeerPoolOptions::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(flag_value(&args, i)?.parse()?);
                i += 2;
            }
            "--peer" => {
                peer_urls.push(flag_value(&args, i)?.trim_end_matches('/').to_string());
                i += 2;
            }
            "--base-path" => {
                options.base_path = flag_value(&args, i)?.to_string();
                i += 2;
            }
            "--replicas" => {
                options.replicas = flag_value(&args, i)?.parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.ok_or_else(|| anyhow::anyhow!("--bind is required"))?;
    let self_url = format!("http://{}", bind_addr);

    tracing::info!("Starting node on {}", self_url);
    if !peer_urls.is_empty() {
        tracing::info!("Peers: {:?}", peer_urls);
    } else {
        tracing::info!("Starting as a single node");
    }

    // 1. Peer pool:
    let peers = PeerRegistry::new();
    let pool = PeerPool::new(self_url.clone(), options, &peers)?;
    if !peer_urls.contains(&self_url) {
        peer_urls.push(self_url.clone());
    }
    pool.set(peer_urls);

    // 2. Cache groups:
    let groups = GroupRegistry::new();

    let squares = Group::new("squares", peers.clone(), |ctx, key: String| async move {
        tracing::info!(request_id = %ctx.request_id, "Computing square of {}", key);
        let n: i64 = key.parse()?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok::<_, anyhow::Error>(
            ByteView::new((n * n).to_string())
                .with_expire(SystemTime::now() + Duration::from_secs(60)),
        )
    });
    groups.register(squares);

    // 3. HTTP Router:
    let app = handlers::router(groups.clone()).merge(pool.router(groups.clone()));

    // 4. Spawn stats reporter:
    let stats_groups = groups.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            tracing::info!("Cache stats: {} groups", stats_groups.group_count());
            for name in stats_groups.list_groups() {
                let Some(group) = stats_groups.get(&name) else {
                    continue;
                };
                let stats = group.stats().snapshot();
                let oldest = group
                    .flights()
                    .longest_running_start_time()
                    .and_then(|start| start.elapsed().ok());
                tracing::info!(
                    "  - {} entries={} gets={} hits={} peer_loads={} local_loads={} in_flight={} oldest_flight={:?}",
                    name,
                    group.local_entry_count(),
                    stats.gets,
                    stats.cache_hits,
                    stats.peer_loads,
                    stats.local_loads,
                    group.flights().count(),
                    oldest
                );
            }
        }
    });

    // 5. Start HTTP server:
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
