use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use otagent::args::Args;
use otagent::constants::settings as keys;
use otagent::{Agent, AgentConfig, KeyMaterial, SettingsStore, SimEngine};

fn main() -> Result<()> {
    otagent::logging::init();

    let args = Args::parse();

    // The settings file is read twice on purpose: once here to pick up
    // persisted counts and keys, and again inside the agent, which
    // owns the store for the rest of the run.
    let settings = SettingsStore::open(&args.settings)
        .with_context(|| format!("loading settings from '{}'", args.settings.display()))?;

    let clients = args.effective_clients(settings.get_int(keys::SECTION, keys::CLIENTS));
    let servers = args.effective_servers(settings.get_int(keys::SECTION, keys::SERVERS));
    let key_material = KeyMaterial::load_or_generate(&settings)?;
    drop(settings);

    info!(
        clients,
        servers,
        socket_path = %args.socket_path,
        "Starting agent"
    );

    let context = Arc::new(zmq::Context::new());

    // Development harness: the agent runs against the in-process
    // engine simulator until linked with a real engine.
    let engine = Arc::new(SimEngine::new(Arc::clone(&context))?);

    let _agent = Agent::new(
        AgentConfig {
            clients,
            servers,
            socket_path: args.socket_path.clone(),
            endpoints: args.endpoints.clone(),
            settings_path: args.settings.clone(),
            keys: key_material,
        },
        engine,
        context,
    )?;

    info!("Agent running; terminate with SIGINT");

    loop {
        std::thread::park();
    }
}
