mod config;

use clap::Parser;
use common::Version;
use journal::{CallerType, Entry, Level, Logger};
use proto_alioth::alioth_restoration_server::AliothRestorationServer;
use proto_alioth::alioth_stellar_server::AliothStellarServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stellar::store::{Backend, PgStore, RedisStore};
use tracing_subscriber::prelude::*;

/// Version under which the collector registers itself in the registry.
const SELF_VERSION: Version = Version {
    major: 1,
    minor: 0,
    patch: 0,
    build: 0,
};

/// The Alioth platform server: service registry and log collector.
#[derive(Debug, clap::Parser)]
struct Args {
    /// Path of the YAML configuration document.
    #[clap(long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // A configuration failure is logged at panic level through a
    // bootstrap journal; the writer terminates the process after drain.
    let config = match config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            let logger = Logger::new("logs")?;
            die(&logger, "failed to initialize config file", err).await
        }
    };

    let logger = Logger::new(&config.log.output_dir)?;
    let filter = if config.database.debug_mode {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            journal::layer::Layer::new(logger.clone())
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
    logger.spawn_signal_handler();

    // The registry backend, per the configured selector.
    let backend = match config.stellar.storage.as_str() {
        "redis" => {
            let password = (!config.redis.password.is_empty()).then_some(config.redis.password.as_str());
            match RedisStore::connect(
                &config.redis.host,
                config.redis.port,
                password,
                &config.redis.key_prefix,
            )
            .await
            {
                Ok(store) => Backend::Redis(store),
                Err(err) => die(&logger, "failed to initialize redis", err).await,
            }
        }
        _ => {
            let store = match PgStore::connect(
                &config.database.host,
                config.database.port,
                &config.database.username,
                &config.database.password,
                &config.database.database,
                config.database.max_idle,
                config.database.max_open,
            )
            .await
            {
                Ok(store) => store,
                Err(err) => die(&logger, "failed to initialize database", err).await,
            };
            if config.database.sync_models {
                if let Err(err) = store.sync_models().await {
                    die(&logger, "failed to sync database models", err).await;
                }
            }
            Backend::Postgres(store)
        }
    };

    let registry = Arc::new(stellar::Stellar::new(Arc::new(backend)));
    let collector_logger = if config.restoration.logger.is_empty() {
        logger.clone()
    } else {
        Logger::new(&config.restoration.logger)?
    };
    let collector = Arc::new(restoration::Service::new(collector_logger));

    let grpc_addr: SocketAddr =
        format!("{}:{}", config.grpc.listen_ip, config.grpc.listen_port).parse()?;
    let http_addr: SocketAddr =
        format!("{}:{}", config.http.listen_ip, config.http.listen_port).parse()?;

    let rpc_server = tonic::transport::Server::builder()
        .add_service(AliothStellarServer::new(stellar::RpcServer::new(
            registry.clone(),
        )))
        .add_service(AliothRestorationServer::new(restoration::RpcServer::new(
            collector.clone(),
        )))
        .serve(grpc_addr);

    let app = axum::Router::new().nest(
        &config.http.route_prefix,
        restoration::router(collector.clone()).merge(stellar::router(registry.clone())),
    );
    let http_server = axum::Server::bind(&http_addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tracing::info!(grpc = %grpc_addr, http = %http_addr, "server(s) started");

    // Publish our own collector endpoint into the registry, best-effort.
    let self_client = stellar::client::Client::new(
        &format!("127.0.0.1:{}", config.grpc.listen_port),
        Duration::from_secs(config.grpc.timeout_seconds),
    )?;
    let grpc_port = config.grpc.listen_port;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        match self_client
            .register("alioth-restoration", SELF_VERSION, grpc_port as i32)
            .await
        {
            Ok((address, handler)) => {
                tracing::info!(%address, %handler, "restoration endpoint registered")
            }
            Err(err) => tracing::warn!(err = %err, "restoration self-registration failed"),
        }
    });

    tokio::select! {
        result = rpc_server => match result {
            Ok(()) => die(&logger, "rpc server exit", "serve loop returned").await,
            Err(err) => die(&logger, "rpc server exit", err).await,
        },
        result = http_server => match result {
            Ok(()) => die(&logger, "http server exit", "serve loop returned").await,
            Err(err) => die(&logger, "http server exit", err).await,
        },
    }
}

/// Log `err` at panic level and park; the journal writer drains the
/// queue and terminates the process.
async fn die(logger: &Logger, message: &str, err: impl ToString) -> ! {
    logger
        .log(
            Entry::new(message)
                .with_level(Level::Panic)
                .with_caller(CallerType::Internal)
                .with_extra(err.to_string().into()),
        )
        .await;
    std::future::pending::<()>().await;
    unreachable!("the journal writer exits the process first")
}
