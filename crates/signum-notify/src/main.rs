mod cli;

use std::sync::Arc;

use clap::Parser;
use eyre::{eyre, WrapErr};
use tokio::sync::mpsc;

use signum_notify_core::watermark::NewMonitoredAccount;
use signum_notify_core::{
    MemoryWatermarkStore, NotifierEvent, Service, SignumClient, SqliteWatermarkStore,
    WatermarkStore,
};

use cli::{Cli, Command, WatchArgs};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let config = args.config();
    config.validate().wrap_err("invalid configuration")?;

    let client = Arc::new(SignumClient::from_config(&config).wrap_err("build Signum API client")?);

    match &args.command {
        None | Some(Command::Run) => {
            let store = open_store(&args)?;
            run(client, store, &config, args.event_buffer).await
        }
        Some(Command::Watch(watch)) => {
            let store = open_store(&args)?;
            watch_account(&client, store.as_ref(), watch).await
        }
        Some(Command::Nodes) => print_nodes(&client).await,
    }
}

fn open_store(args: &Cli) -> eyre::Result<Arc<dyn WatermarkStore>> {
    if args.in_memory {
        tracing::warn!("watermarks are kept in memory and lost on exit");
        return Ok(Arc::new(MemoryWatermarkStore::new()));
    }
    let store = SqliteWatermarkStore::open(&args.db)
        .wrap_err_with(|| format!("open watermark database `{}`", args.db.display()))?;
    tracing::info!(path = %args.db.display(), "opened watermark database");
    Ok(Arc::new(store))
}

async fn run(
    client: Arc<SignumClient>,
    store: Arc<dyn WatermarkStore>,
    config: &signum_notify_core::Config,
    buffer: usize,
) -> eyre::Result<()> {
    let (events_tx, mut events_rx) = mpsc::channel::<NotifierEvent>(buffer.max(1));
    let service = Service::start(client, store, config, events_tx)
        .await
        .wrap_err("start background tasks")?;

    // The notifier owns the sender, so this ends once the service stops.
    let output = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            tracing::info!(
                chat_id = event.chat_id,
                user = %event.user_name,
                account = %event.account_rs,
                kind = %event.kind,
                "notification"
            );
            println!("{}\n", event.body);
        }
    });

    shutdown_signal().await?;
    tracing::info!("shutdown requested");
    service.shutdown().await.wrap_err("stop background tasks")?;
    output.await.wrap_err("drain notifications")?;
    Ok(())
}

async fn shutdown_signal() -> eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate()).wrap_err("install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.wrap_err("listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.wrap_err("listen for ctrl-c")?;
    Ok(())
}

async fn watch_account(
    client: &SignumClient,
    store: &dyn WatermarkStore,
    watch: &WatchArgs,
) -> eyre::Result<()> {
    client.refresh_upstreams().await;
    let account = client
        .get_account(&watch.account)
        .await
        .wrap_err_with(|| format!("look up account `{}`", watch.account))?;
    if account.account.is_empty() {
        return Err(eyre!("node returned no account id for `{}`", watch.account));
    }

    let row = store
        .register(&NewMonitoredAccount {
            chat_id: watch.chat_id,
            user_name: watch.user_name.clone(),
            account_id: account.account.clone(),
            account_rs: account.account_rs.clone(),
            notify: watch.notify(),
        })
        .await
        .wrap_err("register monitored account")?;

    tracing::info!(
        row,
        account = %account.account_rs,
        chat_id = watch.chat_id,
        "account is now monitored"
    );
    Ok(())
}

async fn print_nodes(client: &SignumClient) -> eyre::Result<()> {
    let reachable = client.refresh_upstreams().await;
    if reachable == 0 {
        return Err(eyre!(
            "none of the {} configured nodes answered",
            client.pool().hosts().len()
        ));
    }
    for upstream in client.pool().snapshot().await.iter() {
        println!(
            "{}\theight {}\t{} ms",
            upstream.host,
            upstream.observed_height,
            upstream.observed_latency.as_millis()
        );
    }
    Ok(())
}
