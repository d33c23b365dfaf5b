//! Beeconnect CLI
//!
//!   beeconnect serve [--relay <url>] [--port <port>]   → run engine + HTTP surface
//!   beeconnect link <url>                              → parse a connection link, output JSON
//!   beeconnect sessions [clear]                        → list (or clear) stored sessions
//!   beeconnect sweep [--hours <n>]                     → drop sessions idle longer than n hours
//!   beeconnect disconnect <session-id>                 → forget one stored session
//!
//! Configuration (CLI args win over env):
//!   --app / BEECONNECT_APP, --relay / BEECONNECT_RELAY_URL,
//!   --network / BEECONNECT_NETWORK, --port / BEECONNECT_PORT,
//!   --bind / BEECONNECT_BIND (default 127.0.0.1), --token / BEECONNECT_API_TOKEN
//!
//! Output is JSON, pretty on a tty.

use beeconnect::logging::init_logging;
use beeconnect::core::random_id;
use beeconnect::storage::FileStorage;
use beeconnect::{
    install_signal_handlers, Collaborators, ConnectionLink, Engine, EngineConfig, Network, ServerConfig,
    SessionManager, Shutdown, Storage,
};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::info;

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);
    init_logging(opts.verbose);
    let _ = rustls::crypto::ring::default_provider().install_default();

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("beeconnect {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("serve") => cmd_serve(&opts),
        Some("link") => cmd_link(&opts),
        Some("sessions") => cmd_sessions(&opts),
        Some("sweep") => cmd_sweep(&opts),
        Some("disconnect") => cmd_disconnect(&opts),
        Some(cmd) => Err(format!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = opts.pretty || std::io::stdout().is_terminal();
    let render = |value: &Value| {
        let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
        rendered.unwrap_or_else(|_| value.to_string())
    };
    match result {
        Ok(output) => println!("{}", render(&output)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": e})));
            std::process::exit(1);
        }
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    target: Option<String>,
    app: Option<String>,
    relay: Option<String>,
    network: Option<String>,
    hours: Option<u64>,
    port: Option<u16>,
    bind: Option<String>,
    token: Option<String>,
    pretty: bool,
    verbose: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--pretty" => opts.pretty = true,
                "--verbose" | "-v" => opts.verbose = true,
                "--app" | "-a" => {
                    opts.app = value;
                    i += 1;
                }
                "--relay" | "-r" => {
                    opts.relay = value;
                    i += 1;
                }
                "--network" | "-n" => {
                    opts.network = value;
                    i += 1;
                }
                "--hours" => {
                    opts.hours = value.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "--port" | "-p" => {
                    opts.port = value.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "--bind" => {
                    opts.bind = value;
                    i += 1;
                }
                "--token" => {
                    opts.token = value;
                    i += 1;
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        let mut positional = positional.into_iter();
        opts.command = positional.next();
        opts.target = positional.next();

        // Apply environment variables (lower priority than CLI args)
        if opts.app.is_none() {
            opts.app = env::var("BEECONNECT_APP").ok().filter(|s| !s.is_empty());
        }
        if opts.relay.is_none() {
            opts.relay = env::var("BEECONNECT_RELAY_URL").ok().filter(|s| !s.is_empty());
        }
        if opts.network.is_none() {
            opts.network = env::var("BEECONNECT_NETWORK").ok().filter(|s| !s.is_empty());
        }
        if opts.port.is_none() {
            opts.port = env::var("BEECONNECT_PORT").ok().and_then(|v| v.parse().ok());
        }
        if opts.bind.is_none() {
            opts.bind = env::var("BEECONNECT_BIND").ok().filter(|s| !s.is_empty());
        }
        if opts.token.is_none() {
            opts.token = env::var("BEECONNECT_API_TOKEN").ok().filter(|s| !s.is_empty());
        }

        opts
    }

    fn app(&self) -> String {
        self.app.clone().unwrap_or_else(|| "beeconnect".to_string())
    }

    fn config(&self) -> Result<EngineConfig, String> {
        let mut config = EngineConfig::new(self.app()).apply_env();
        if let Some(relay) = &self.relay {
            config = config.with_relay(relay.clone());
        }
        if let Some(network) = &self.network {
            let network = Network::from_str(network).ok_or_else(|| format!("Unknown network: {}", network))?;
            config = config.with_network(network);
        }
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

fn print_usage() {
    println!(
        r#"beeconnect - wallet-side connect engine

USAGE:
    beeconnect <command> [target] [options]

COMMANDS:
    serve                   Run the engine with its HTTP surface
    link <url>              Parse a tc:// or universal connection link
    sessions [clear]        List stored sessions (or clear them)
    sweep                   Remove sessions idle longer than --hours
    disconnect <id>         Forget one stored session

OPTIONS:
    --app, -a <name>        Storage namespace (env: BEECONNECT_APP)
    --relay, -r <url>       Relay WebSocket URL (env: BEECONNECT_RELAY_URL)
    --network, -n <net>     mainnet|testnet (env: BEECONNECT_NETWORK)
    --port, -p <port>       HTTP port for serve (default: 8080, env: BEECONNECT_PORT)
    --bind <addr>           HTTP bind address (default: 127.0.0.1, env: BEECONNECT_BIND)
    --token <token>         Host token for every route but /health (env: BEECONNECT_API_TOKEN;
                            generated and printed to stderr when unset)
    --hours <n>             Inactivity threshold for sweep (default: 24)
    --pretty                Pretty-print JSON
    --verbose, -v           Debug logging for beeconnect targets
    --version, -V           Print version

HTTP ROUTES (serve, all but /health need "Authorization: Bearer <token>"):
    GET    /health                  Engine status
    GET    /wallets                 Registered wallets
    GET    /sessions                Paired sessions
    DELETE /sessions                Disconnect all
    DELETE /sessions/:id            Disconnect one
    POST   /links                   {{"link": "tc://..."}}
    GET    /requests                Pending approvals
    POST   /requests/:key/approve   {{"wallet": "<public key>"}}
    POST   /requests/:key/reject    {{"reason": "..."}}

ENVIRONMENT:
    BEECONNECT_ROOT         Data root (default: platform data dir)
    BEECONNECT_LOG          Log filter (falls back to RUST_LOG, then warn,beeconnect=info)
    BEECONNECT_LOG_JSON=1   JSON log lines
    RUST_LOG                Log filter (default: info)
"#
    );
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))
}

fn open_storage(opts: &ParsedArgs) -> Result<Arc<dyn Storage>, String> {
    let storage = FileStorage::open(&opts.app()).map_err(|e| format!("Failed to open storage: {}", e))?;
    Ok(Arc::new(storage))
}

fn cmd_link(opts: &ParsedArgs) -> Result<Value, String> {
    let raw = opts.target.as_deref().ok_or("Usage: beeconnect link <url>")?;
    let link = ConnectionLink::parse(raw).map_err(|e| e.to_string())?;
    Ok(json!({
        "version": link.version,
        "client_id": link.client_id,
        "request": link.request,
        "return": link.return_strategy,
    }))
}

fn cmd_sessions(opts: &ParsedArgs) -> Result<Value, String> {
    let storage = open_storage(opts)?;
    runtime()?.block_on(async {
        let sessions = SessionManager::load(storage).await;
        if opts.target.as_deref() == Some("clear") {
            let count = sessions.list_sessions().len();
            sessions.clear_sessions().await;
            return Ok::<Value, String>(json!({"cleared": count}));
        }
        let list = sessions.list_sessions();
        Ok(json!({"count": list.len(), "sessions": list}))
    })
}

fn cmd_sweep(opts: &ParsedArgs) -> Result<Value, String> {
    let storage = open_storage(opts)?;
    let hours = opts.hours.unwrap_or(opts.config()?.session_max_inactive_hours);
    runtime()?.block_on(async {
        let sessions = SessionManager::load(storage).await;
        let removed = sessions.cleanup_inactive_sessions(hours).await;
        Ok::<Value, String>(json!({"removed": removed, "max_inactive_hours": hours}))
    })
}

fn cmd_disconnect(opts: &ParsedArgs) -> Result<Value, String> {
    let id = opts.target.clone().ok_or("Usage: beeconnect disconnect <session-id>")?;
    let storage = open_storage(opts)?;
    runtime()?.block_on(async {
        let sessions = SessionManager::load(storage).await;
        let removed = sessions.remove_session(&id).await;
        Ok::<Value, String>(json!({"session_id": id, "removed": removed}))
    })
}

fn cmd_serve(opts: &ParsedArgs) -> Result<Value, String> {
    let port = opts.port.unwrap_or(8080);
    let bind = opts.bind.clone().unwrap_or_else(|| "127.0.0.1".to_string());
    let config = opts.config()?;
    let token = opts.token.clone().unwrap_or_else(|| {
        let generated = random_id();
        eprintln!("host token: {}", generated);
        generated
    });
    let server = ServerConfig::new(config.app.clone(), token);
    let storage = open_storage(opts)?;

    runtime()?.block_on(async {
        let shutdown = Shutdown::new();
        install_signal_handlers(shutdown.clone());

        let engine = Engine::start(config, Collaborators::new(storage))
            .await
            .map_err(|e| format!("Failed to start engine: {}", e))?;

        let router = beeconnect::create_router(engine.clone(), &server);
        let addr = format!("{}:{}", bind, port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind: {}", e))?;
        info!("Beeconnect listening on http://{}", addr);

        let mut shutdown_rx = shutdown.subscribe();
        tokio::select! {
            result = axum::serve(listener, router) => {
                result.map_err(|e| format!("Server error: {}", e))?;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping engine...");
            }
        }

        engine.stop().await;
        Ok::<Value, String>(json!({"status": "stopped"}))
    })
}
