//! Mission Engine - operator CLI

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mission_engine::{
    auth::{Caller, JwtValidator},
    cli::{execute_command, resolve_caller, Command},
    config::Args,
    db::{MongoClient, MongoStore},
    engine::{Engine, Stores},
    missions::InstagramGraphProvider,
    notify::{FcmPushProvider, LogPushProvider, PushProvider},
    store::MemoryStore,
    types::RequestContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mission_engine={},info", args.log_level).into());
    let (json_layer, text_layer) = if args.json_logs() {
        (
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
            None,
        )
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let secret = args
        .jwt_secret()
        .context("JWT secret is not configured")?;
    let validator = JwtValidator::new(&secret);

    if let Command::Token {
        user_id,
        role,
        name,
        ttl,
    } = &args.command
    {
        if !args.dev_mode {
            error!("Token issuance is only available in dev mode");
            std::process::exit(1);
        }
        let token = validator.issue(&Caller::new(user_id.clone(), *role, name.clone()), *ttl)?;
        println!("{}", token);
        return Ok(());
    }

    info!("======================================");
    info!("  Mission Engine");
    info!("======================================");
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
    info!("Request timeout: {}ms", args.request_timeout_ms);
    info!(
        "Push: {}",
        args.push_endpoint.as_deref().unwrap_or("log only")
    );
    info!(
        "Instagram mentions: {}",
        if args.instagram_config().is_some() { "enabled" } else { "disabled" }
    );
    info!("======================================");

    // Connect to MongoDB (in-memory fallback in dev mode)
    let stores = match MongoClient::connect(
        &args.mongodb_uri,
        &args.mongodb_db,
        args.mongodb_connect_timeout(),
    )
    .await
    {
        Ok(client) => {
            Stores::mongo(MongoStore::open(&client).await?)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                Stores::memory(MemoryStore::new())
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let push: Arc<dyn PushProvider> = match args.fcm_config() {
        Some(config) => Arc::new(FcmPushProvider::new(config)),
        None => {
            warn!("Push endpoint not configured, deliveries are only logged");
            Arc::new(LogPushProvider)
        }
    };

    let mut builder = Engine::builder(stores)
        .push(push)
        .config(args.engine_config());
    if let Some(config) = args.instagram_config() {
        builder = builder.social_feed(Arc::new(InstagramGraphProvider::new(config)));
    }
    let engine = builder.build();

    let caller = match resolve_caller(&validator, args.token.as_deref()) {
        Ok(caller) => caller,
        Err(e) => {
            error!("Caller token rejected: {}", e);
            std::process::exit(2);
        }
    };
    let ctx = match caller {
        Some(caller) => RequestContext::new(caller),
        None => RequestContext::anonymous(),
    }
    .with_timeout(args.request_timeout());

    info!(
        request_id = %ctx.request_id,
        caller = ctx.caller.as_ref().map(|c| c.user_id.as_str()).unwrap_or("anonymous"),
        "Running command"
    );

    match execute_command(&engine, &ctx, args.command.clone()).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            let body = serde_json::json!({
                "error": e.to_string(),
                "status": e.status_code(),
                "requestId": ctx.request_id,
            });
            eprintln!("{}", body);
            std::process::exit(1);
        }
    }
}
