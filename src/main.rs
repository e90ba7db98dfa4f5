use booking_backend::{
    config::{get_config, init_config},
    database::pool::{create_pool, run_migrations},
    routes::build_router,
    utils::crypto::hash_password,
    AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("booking_backend=info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("hash-password") {
        let Some(plain) = args.next() else {
            anyhow::bail!("usage: booking-backend hash-password <password>");
        };
        let hash = hash_password(&plain).map_err(|e| anyhow::anyhow!("hashing failed: {}", e))?;
        println!("{}", hash);
        return Ok(());
    }

    init_tracing();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    run_migrations(&pool).await?;

    let app_state = AppState::new(pool)?;

    if config.outbox_worker_enabled {
        let worker = app_state.outbox_worker();
        tokio::spawn(async move {
            info!("Outbox worker started");
            loop {
                match worker.run_once().await {
                    Ok(n) if n > 0 => {}
                    Ok(_) => {
                        tokio::time::sleep(Duration::from_millis(1000)).await;
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Outbox worker error");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    } else {
        info!("Outbox worker disabled");
    }

    let app = build_router(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
