//! Concrete supervisor transport binding: newline-delimited JSON over
//! TCP.
//!
//! One connection handles one request at a time, matching the engine's
//! single-threaded cooperative model: a request is read,
//! dispatched through the shared [`GatewayHandle`], and the response is
//! written back before the next line is read. Fan-out events go out on
//! a second TCP listener, one JSON object per line per `EventBus`
//! subscription, independent of the request/response connections.

use std::sync::Arc;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::config::GatewayConfig;
use crate::engine::ProtocolEngine;
use crate::error::Result;
use crate::events::EventBus;
use crate::supervisor::{parse_pump_address, SupervisorRequest, SupervisorResponse};
use crate::transport::{SerialParams, Transport};

/// Shared, lock-protected access to the engine and transport, so
/// multiple supervisor connections can be accepted even though only one
/// request is dispatched at a time.
pub struct GatewayHandle {
    engine: Mutex<ProtocolEngine>,
    transport: Mutex<Transport>,
    config: Mutex<GatewayConfig>,
    bus: EventBus,
}

impl GatewayHandle {
    /// Wrap an engine, transport, and config behind a shared handle.
    #[must_use]
    pub fn new(engine: ProtocolEngine, transport: Transport, config: GatewayConfig, bus: EventBus) -> Self {
        Self {
            engine: Mutex::new(engine),
            transport: Mutex::new(transport),
            config: Mutex::new(config),
            bus,
        }
    }

    /// Dispatch one supervisor request to completion.
    pub async fn handle(&self, req: SupervisorRequest) -> SupervisorResponse {
        match self.dispatch(req).await {
            Ok(resp) => resp,
            Err(e) => e.into(),
        }
    }

    async fn dispatch(&self, req: SupervisorRequest) -> Result<SupervisorResponse> {
        match req {
            SupervisorRequest::SendCommand {
                command,
                pump_address,
                control,
            } => {
                let address = parse_pump_address(&pump_address)?;
                let mut engine = self.engine.lock().await;
                let mut transport = self.transport.lock().await;
                let sent = engine
                    .send_command(&command, address, control, &mut transport)
                    .await?;
                Ok(SupervisorResponse::SendCommandOk {
                    command_id: sent.command_id,
                    frame_hex: sent
                        .frame
                        .iter()
                        .map(|b| format!("{b:02x}"))
                        .collect::<Vec<_>>()
                        .join(" "),
                })
            }
            SupervisorRequest::GetStatus => {
                let transport = self.transport.lock().await;
                let config = self.config.lock().await;
                Ok(SupervisorResponse::StatusOk {
                    connected: transport.is_open(),
                    port: config.port.clone(),
                    baud: config.baud,
                    pump_address: format!("{:#04x}", config.pump_address),
                })
            }
            SupervisorRequest::UpdateConfig {
                port,
                baud,
                pump_address,
            } => {
                let address = parse_pump_address(&pump_address)?;
                let new_config = GatewayConfig::new(port, baud, address)?;
                let mut transport = self.transport.lock().await;
                transport.reconfigure(SerialParams {
                    port: new_config.port.clone(),
                    baud: new_config.baud,
                })?;
                self.bus.publish_connection(transport.is_open(), None);
                *self.config.lock().await = new_config.clone();
                Ok(SupervisorResponse::UpdateConfigOk {
                    port: new_config.port,
                    baud: new_config.baud,
                    pump_address: format!("{:#04x}", new_config.pump_address),
                })
            }
        }
    }

    /// Subscribe to the gateway's event bus.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::events::GatewayEvent> {
        self.bus.subscribe()
    }

    /// Continuously read from the transport and feed bytes into the
    /// engine's ingress pipeline. Returns once the transport reports EOF.
    /// A read error flips the connection to disconnected and resets the
    /// ingress buffer before propagating, so a later reconnect doesn't
    /// resume reassembly mid-stale-frame.
    pub async fn run_ingress_loop(&self) -> Result<()> {
        let mut buf = [0u8; 512];
        loop {
            let read_result = {
                let mut transport = self.transport.lock().await;
                transport.read_some(&mut buf).await
            };
            let n = match read_result {
                Ok(n) => n,
                Err(e) => {
                    self.bus.publish_connection(false, Some(e.to_string()));
                    self.engine.lock().await.reset_ingress();
                    return Err(e);
                }
            };
            if n == 0 {
                self.bus.publish_connection(false, Some("serial device EOF".into()));
                self.engine.lock().await.reset_ingress();
                return Ok(());
            }
            let mut engine = self.engine.lock().await;
            engine.process_inbound(&buf[..n]);
        }
    }
}

/// Accept connections on `listener`, reading one JSON `SupervisorRequest`
/// per line and writing back one JSON `SupervisorResponse` per line,
/// until the peer disconnects.
///
/// # Errors
/// Returns [`Error::Transport`] only if `listener.accept()` itself
/// fails; per-connection I/O errors are logged and end that connection
/// without affecting others.
pub async fn serve_requests(listener: TcpListener, handle: Arc<GatewayHandle>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("supervisor_net: accepted request connection from {peer}");
        let handle = Arc::clone(&handle);
        tokio::spawn(async move {
            if let Err(e) = serve_one_connection(stream, &handle).await {
                warn!("supervisor_net: connection {peer} ended: {e}");
            }
        });
    }
}

async fn serve_one_connection(stream: TcpStream, handle: &GatewayHandle) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<SupervisorRequest>(&line) {
            Ok(req) => handle.handle(req).await,
            Err(e) => SupervisorResponse::Err {
                reason: format!("malformed request: {e}"),
            },
        };
        let mut out = serde_json::to_string(&response)
            .unwrap_or_else(|_| "{\"type\":\"Err\",\"reason\":\"encode failure\"}".into());
        out.push('\n');
        write_half.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Accept connections on `listener` and stream every [`GatewayEvent`]
/// from `handle`'s bus to each, one JSON object per line, until the
/// subscriber lags past the bus capacity or disconnects.
pub async fn serve_events(listener: TcpListener, handle: Arc<GatewayHandle>) -> Result<()> {
    loop {
        let (mut stream, peer) = listener.accept().await?;
        debug!("supervisor_net: accepted event subscriber from {peer}");
        let mut rx = handle.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Ok(mut line) = serde_json::to_string(&event) else {
                            continue;
                        };
                        line.push('\n');
                        if stream.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("supervisor_net: event subscriber {peer} lagged by {n}");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("supervisor_net: event subscriber {peer} disconnected");
        });
    }
}
