//! Stowage CLI entry point.
//!
//! This binary is the composition root. It:
//!
//! 1. **Wires logging**: `tracing-subscriber` with an `EnvFilter` read from
//!    `RUST_LOG` (default `info`) and a JSON formatting layer on stderr.
//! 2. **Loads configuration**: a JSON [`ClientConfig`] from the file named by
//!    `STOWAGE_CONFIG` (default `stowage.json`), plus credentials from
//!    `STOWAGE_APPLICATION_ID`, `STOWAGE_CLIENT_KEY`, `STOWAGE_MASTER_KEY`,
//!    and `STOWAGE_SESSION_TOKEN`.
//! 3. **Constructs infrastructure**: one [`Dispatcher`] over a
//!    [`ReqwestTransport`] and, for `watch`, one [`LiveQueryClient`] over a
//!    [`WsConnector`].
//! 4. **Runs one command** and exits.

mod command;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use dispatch::{Dispatcher, ReqwestTransport};
use livequery::{LiveQuery, LiveQueryClient, SubscriptionEvent, WsConnector};
use objects::{
    ClientConfig, Credentials, DomainObject, FieldValue, MemorySecretStore, ObjectGraph,
    StaticCredentials,
};

use crate::command::{Command, CONFIG_ENV, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let command = Command::parse(std::env::args().skip(1))?;
    let config = load_config()?;
    let credentials = Arc::new(StaticCredentials::new(credentials_from_env()?));

    match command {
        Command::Create { class_name, fields } => {
            let dispatcher = dispatcher(&config, credentials)?;
            let mut object = DomainObject::new(class_name);
            for (key, value) in &fields {
                object.set(key.clone(), FieldValue::from_wire(value)?);
            }
            let mut graph = ObjectGraph::new();
            let key = graph.insert(object);
            dispatcher.save(&mut graph, key).await?;
            if let Some(id) = graph.get(key).and_then(DomainObject::object_id) {
                println!("{id}");
            }
        }
        Command::Fetch {
            class_name,
            object_id,
        } => {
            let dispatcher = dispatcher(&config, credentials)?;
            let mut graph = ObjectGraph::new();
            let key = graph.insert(DomainObject::with_id(class_name, object_id));
            dispatcher.fetch(&mut graph, key).await?;
            if let Some(object) = graph.get(key) {
                print_object(object);
            }
        }
        Command::Delete {
            class_name,
            object_id,
        } => {
            let dispatcher = dispatcher(&config, credentials)?;
            let mut graph = ObjectGraph::new();
            let key = graph.insert(DomainObject::with_id(class_name, object_id));
            dispatcher.delete(&graph, key).await?;
            println!("deleted");
        }
        Command::Watch {
            class_name,
            constraints,
        } => {
            let secrets = MemorySecretStore::new();
            let client =
                LiveQueryClient::new(&config, Arc::new(WsConnector), credentials, &secrets)?;
            watch(&client, LiveQuery::all(class_name).matching(constraints)).await?;
        }
    }
    Ok(())
}

fn dispatcher(config: &ClientConfig, credentials: Arc<StaticCredentials>) -> Result<Dispatcher> {
    let transport = Arc::new(ReqwestTransport::new(config)?);
    Ok(Dispatcher::new(config, transport, credentials))
}

fn load_config() -> Result<ClientConfig> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config: ClientConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    config.validate()?;
    tracing::debug!(path, server_url = %config.server_url, "configuration loaded");
    Ok(config)
}

fn credentials_from_env() -> Result<Credentials> {
    let optional = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    Ok(Credentials {
        application_id: std::env::var("STOWAGE_APPLICATION_ID")
            .context("STOWAGE_APPLICATION_ID must be set")?,
        client_key: optional("STOWAGE_CLIENT_KEY"),
        master_key: optional("STOWAGE_MASTER_KEY"),
        session_token: optional("STOWAGE_SESSION_TOKEN"),
        installation_id: None,
    })
}

async fn watch(client: &LiveQueryClient, query: LiveQuery) -> Result<()> {
    let mut subscription = client.subscribe(query)?;
    client.open().await?;
    loop {
        tokio::select! {
            event = subscription.next_event() => match event {
                Some(SubscriptionEvent::Subscribed) => tracing::info!("subscribed"),
                Some(SubscriptionEvent::Event { kind, object }) => {
                    println!("{kind:?}");
                    print_object(&object);
                }
                Some(SubscriptionEvent::Error(err)) => {
                    tracing::warn!(error = %err, "subscription error");
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    client.shutdown().await;
    Ok(())
}

fn print_object(object: &DomainObject) {
    let id = object.object_id().map_or("(unsaved)", |id| id.as_str());
    println!("{} {id}", object.class_name());
    for (key, value) in object.fields() {
        println!("  {key}: {value:?}");
    }
}
