//! DART pump-interface gateway daemon.
//!
//! Opens one RS-485 segment, decodes traffic from the pump at
//! `--pump-address`, and exposes the supervisor request/event surface
//! over two newline-delimited-JSON TCP listeners.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use dart_gateway::config::GatewayConfig;
use dart_gateway::engine::ProtocolEngine;
use dart_gateway::events::EventBus;
use dart_gateway::supervisor::{parse_pump_address, PumpAddressInput};
use dart_gateway::supervisor_net::{serve_events, serve_requests, GatewayHandle};
use dart_gateway::transport::{SerialParams, Transport};

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    /// Serial device path.
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Baud rate.
    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Pump address, decimal (80..111) or hex (0x50..0x6F).
    #[arg(long, default_value = "0x50")]
    pump_address: String,

    /// Bind address for the supervisor request/response listener.
    #[arg(long, default_value = "127.0.0.1:7878")]
    request_bind: String,

    /// Bind address for the supervisor event-stream listener.
    #[arg(long, default_value = "127.0.0.1:7879")]
    event_bind: String,

    /// Increase log verbosity; repeatable.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    stderrlog::new()
        .module(module_path!())
        .module("dart_gateway")
        .quiet(false)
        .verbosity(opt.verbose as usize)
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .context("failed to initialize logging")?;

    let pump_address = parse_pump_address(&PumpAddressInput::Text(opt.pump_address.clone()))
        .context("invalid --pump-address")?;
    let config = GatewayConfig::new(opt.port.clone(), opt.baud, pump_address)
        .context("invalid gateway configuration")?;

    let mut transport = Transport::new(SerialParams {
        port: config.port.clone(),
        baud: config.baud,
    });
    transport.open().context("failed to open serial device")?;

    let bus = EventBus::new();
    bus.publish_connection(true, None);
    let engine = ProtocolEngine::new(bus.clone());
    let handle = Arc::new(GatewayHandle::new(engine, transport, config, bus));

    let request_listener = TcpListener::bind(&opt.request_bind)
        .await
        .with_context(|| format!("failed to bind request listener on {}", opt.request_bind))?;
    let event_listener = TcpListener::bind(&opt.event_bind)
        .await
        .with_context(|| format!("failed to bind event listener on {}", opt.event_bind))?;

    log::info!(
        "dart-gatewayd listening: requests on {}, events on {}",
        opt.request_bind,
        opt.event_bind
    );

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        eprintln!("received Ctrl+C, shutting down...");
        let _ = shutdown_tx.try_send(());
    })
    .context("failed to install Ctrl+C handler")?;

    let ingress_handle = Arc::clone(&handle);
    let requests_handle = Arc::clone(&handle);
    let events_handle = Arc::clone(&handle);

    tokio::select! {
        res = ingress_handle.run_ingress_loop() => {
            if let Err(e) = res {
                log::error!("ingress loop ended: {e}");
            }
        }
        res = serve_requests(request_listener, requests_handle) => {
            if let Err(e) = res {
                log::error!("request listener ended: {e}");
            }
        }
        res = serve_events(event_listener, events_handle) => {
            if let Err(e) = res {
                log::error!("event listener ended: {e}");
            }
        }
        _ = shutdown_rx.recv() => {
            log::info!("shutdown requested");
        }
    }

    Ok(())
}
