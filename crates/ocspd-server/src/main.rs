use chrono::Utc;
use clap::Parser;
use ocspd_proto::{ReadOnlyCacheStore, ResponderIdentity, ResponseCacheStore};
use ocspd_server::batch::{quiesce_channel, CacheBatch};
use ocspd_server::config::{Config, LogFormat};
use ocspd_server::handler::CacheHandler;
use ocspd_server::source::{DynamoSource, FileSource, RevocationSource};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable carrying the responder private key PEM, mutually
/// exclusive with `responder.key` in the configuration file.
const PRIVATE_KEY_ENV: &str = "OCSPD_PRIVATE_KEY";

/// Pre-signing OCSP responder
#[derive(Parser, Debug)]
#[command(name = "ocspd", version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,
}

fn setup_logging(config: &Config) {
    let filter = EnvFilter::builder()
        .parse_lossy(format!("ocspd={0},ocspd_server={0},ocspd_proto={0}", config.log.level));

    match config.log.format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn read_pki_file(label: &str, path: &std::path::Path) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("error: {label}: {}: {err}", path.display());
            process::exit(1);
        }
    }
}

/// Loads the PEM material and builds the verified responder identity.
/// Any failure here is fatal: a responder with unusable PKI material must
/// not start serving.
fn build_responder(config: &Config) -> ResponderIdentity {
    let cert_pem = read_pki_file("responder certificate", &config.responder.certificate);

    let env_key = std::env::var(PRIVATE_KEY_ENV).ok().filter(|key| !key.is_empty());
    let key_pem = match (&config.responder.key, env_key) {
        (Some(_), Some(_)) => {
            eprintln!("error: {PRIVATE_KEY_ENV} and responder.key are exclusive");
            process::exit(1);
        }
        (Some(path), None) => read_pki_file("responder key", path),
        (None, Some(key)) => key.into_bytes(),
        (None, None) => {
            eprintln!("error: responder key is not configured; set responder.key or {PRIVATE_KEY_ENV}");
            process::exit(1);
        }
    };

    let issuer_pem = read_pki_file("issuer certificate", &config.responder.issuer_certificate);

    match ResponderIdentity::build(&cert_pem, &key_pem, &issuer_pem, Utc::now()) {
        Ok(responder) => responder,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}

async fn build_source(config: &Config) -> Arc<dyn RevocationSource> {
    if let Some(file) = &config.db.file {
        return Arc::new(FileSource::new(config.responder.ca.clone(), file.path.clone()));
    }

    let dynamo = config.db.dynamodb.as_ref().expect("config validation enforces a db section");

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(dynamo.region.clone()));
    if dynamo.retry_max_attempts > 0 {
        loader = loader.retry_config(
            aws_config::retry::RetryConfig::standard()
                .with_max_attempts(dynamo.retry_max_attempts),
        );
    }
    if let Some(endpoint) = &dynamo.endpoint {
        loader = loader.endpoint_url(endpoint.clone());
    }
    let sdk_config = loader.load().await;

    Arc::new(DynamoSource::new(
        aws_sdk_dynamodb::Client::new(&sdk_config),
        config.responder.ca.clone(),
        dynamo.table_name.clone(),
        dynamo.ca_gsi.clone(),
        dynamo.timeout,
    ))
}

async fn run(config: Config, responder: Arc<ResponderIdentity>) {
    let store = Arc::new(ResponseCacheStore::new());
    let source = build_source(&config).await;

    let (quiesce_handle, quiesce) = quiesce_channel();
    let batch = match CacheBatch::builder(
        config.responder.ca.clone(),
        Arc::clone(&store),
        source,
        Arc::clone(&responder),
        Utc::now(),
    )
    .interval_secs(config.cache.interval)
    .delay_secs(config.cache.delay)
    .strict(config.strict)
    .expiration(config.expiration)
    .quiesce(quiesce)
    .build()
    {
        Ok(batch) => batch,
        Err(err) => {
            error!(error = %err, "invalid cache batch configuration");
            process::exit(1);
        }
    };
    let batch_task = tokio::spawn(batch.run());

    let handler = CacheHandler::new(
        ReadOnlyCacheStore::new(Arc::clone(&store)),
        responder,
        config.http.max_request_bytes,
        config.cache_control_max_age(),
    );
    let app = ocspd_server::server::app(handler, Duration::from_secs(config.http.read_timeout));

    let listener = match tokio::net::TcpListener::bind(&config.http.listen).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, listen = %config.http.listen, "could not bind listener");
            process::exit(1);
        }
    };
    info!(listen = %config.http.listen, "listening for OCSP requests");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "could not install shutdown signal handler");
        }
    };

    let server = async move { axum::serve(listener, app).with_graceful_shutdown(shutdown).await };

    let serve_result = tokio::select! {
        result = server => result,
        batch_result = batch_task => {
            match batch_result {
                Ok(Ok(())) => error!("cache batch loop stopped unexpectedly"),
                Ok(Err(err)) => error!(error = %err, "cache batch loop aborted"),
                Err(err) => error!(error = %err, "cache batch task panicked"),
            }
            process::exit(1);
        }
    };

    // Deterministic shutdown: the batch finishes its wait or current pass,
    // acknowledges, and only then does the process exit.
    match quiesce_handle.quiesce("server shutdown").await {
        Some(ack) => info!(ack = %ack, "cache batch loop stopped"),
        None => warn!("cache batch loop did not acknowledge quiesce"),
    }

    if let Err(err) = serve_result {
        error!(error = %err, "server terminated with error");
        process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: config file: {err}");
            process::exit(1);
        }
    };

    if let Err(errs) = config.validate() {
        for err in errs {
            eprintln!("error: config file: {err}");
        }
        process::exit(1);
    }

    if cli.validate {
        println!("validation success");
        return;
    }

    setup_logging(&config);

    let responder = Arc::new(build_responder(&config));
    info!(
        ca = %config.responder.ca,
        authorized_type = ?responder.authorized_type(),
        key_algorithm = ?responder.key_algorithm(),
        "responder identity verified"
    );

    run(config, responder).await;
}
