//! Lógica del servidor de mensajes del gateway de push.
//!
//! Este módulo implementa las dos tareas del lado gateway:
//!
//! 1. **Upstream**: mantiene la conexión con el flujo de mensajes entrantes
//!    del gateway (tramas JSON delimitadas por línea, precedidas por una trama
//!    de saludo con las credenciales del emisor) y entrega cada trama al
//!    servidor por canal. Reconecta con una espera fija de 30 segundos.
//! 2. **Server**: el manejador de mensajes de dispositivos. Registra tokens
//!    nuevos, acepta el vocabulario fijo de comandos, responde a `ping` con el
//!    estado actual y reenvía el resto de los comandos aceptados a la tarea
//!    productora. Nunca deja escapar una falla hacia el transporte: todo error
//!    de envío se captura y se registra.


use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use crate::context::domain::AppContext;
use crate::gateway::domain::{DeviceMessage, InboundMessage};
use crate::message::domain::{Command, PushMessage, ALARM_STATE_UNKNOWN};
use crate::system::domain::System;
use crate::system::domain::gateway_const::RETRY_WAIT;


#[derive(Debug, Clone, Copy, PartialEq)]
enum StateUpstream {
    Init,
    Work,
    Error,
}


/// Ejecuta el bucle del servidor de mensajes del gateway.
pub async fn run_server(mut rx: mpsc::Receiver<InboundMessage>,
                        tx_commands: mpsc::Sender<String>,
                        app_context: AppContext) {

    info!("Info: servidor de mensajes del gateway iniciado");

    while let Some(inbound) = rx.recv().await {
        handle_message(inbound, &tx_commands, &app_context).await;
    }
    info!("Info: canal de entrada cerrado, terminando tarea");
}


/// Procesa un mensaje entrante de un dispositivo.
///
/// # Flujo de Trabajo
/// 1. Si trae `registration_token` y el token es nuevo, lo registra.
/// 2. Si trae `command`, lo valida contra el vocabulario fijo:
///    - comandos de acción → canal hacia la tarea productora.
///    - `ping` → respuesta directa de estado (TTL 0) solo al remitente.
///    - desconocido → warning, sin acción.
/// 3. Sin `command` no hay acción; se registra a nivel info.
pub(crate) async fn handle_message(inbound: InboundMessage,
                                   tx_commands: &mpsc::Sender<String>,
                                   ctx: &AppContext) {

    debug!("Debug: mensaje entrante de {}", inbound.from);

    let DeviceMessage { registration_token, command } = inbound.data;

    if let Some(token) = &registration_token {
        info!("Info: remitente del mensaje: {token}");
        ctx.registry.register(token);
    }

    let Some(raw_command) = command else {
        info!("Info: mensaje inesperado recibido del gateway, ignorando");
        return;
    };

    info!("Info: comando \"{raw_command}\" recibido del dispositivo");

    match Command::parse(&raw_command) {
        Some(Command::Ping) => {
            // El ping lo manda la app cada vez que arranca: garantiza que el
            // token quede registrado aunque el servidor se haya reiniciado, y
            // devuelve el estado actual para la UI.
            info!("Info: ping recibido, devolviendo el estado actual");

            let Some(token) = registration_token else {
                warn!("Warning: ping sin registration_token, no se puede responder");
                return;
            };

            let reply = PushMessage::alarm_status(ALARM_STATE_UNKNOWN);
            match serde_json::to_value(&reply) {
                Ok(payload) => {
                    if let Err(e) = ctx.gateway.send(&token, &payload).await {
                        error!("Error: no se pudo enviar el estado al dispositivo {token}: {e:?}");
                    }
                }
                Err(e) => error!("Error: no se pudo serializar la respuesta de estado: {e}"),
            }
        }

        Some(action) => {
            if tx_commands.send(action.as_str().to_string()).await.is_err() {
                error!("Error: no se pudo entregar el comando a la tarea productora");
            }
        }

        None => {
            warn!("Warning: el comando {raw_command} no es un comando soportado, no se puede accionar el mensaje");
        }
    }
}


async fn connect_upstream(system: &System) -> Result<BufReader<TcpStream>, std::io::Error> {
    let stream = TcpStream::connect((system.upstream_host.as_str(), system.upstream_port)).await?;
    let mut reader = BufReader::new(stream);

    // Trama de saludo: identifica al emisor ante el gateway.
    let hello = serde_json::json!({
        "sender_id": system.gcm_sender_id,
        "api_key": system.gcm_api_key,
    });
    reader.get_mut().write_all(hello.to_string().as_bytes()).await?;
    reader.get_mut().write_all(b"\n").await?;

    Ok(reader)
}


/// Ejecuta el bucle de la conexión de entrada con el gateway. No retorna.
///
/// Lee tramas JSON delimitadas por línea y las entrega al canal del servidor.
/// Una trama inválida se descarta con un warning; una caída de la conexión
/// descarta el flujo, espera 30 segundos y reconecta.
#[instrument(name = "run_upstream_task", skip(tx, app_context))]
pub async fn run_upstream(tx: mpsc::Sender<InboundMessage>, app_context: AppContext) {

    let mut state = StateUpstream::Init;
    let mut reader: Option<BufReader<TcpStream>> = None;

    loop {
        match state {
            StateUpstream::Init => {
                match connect_upstream(&app_context.system).await {
                    Ok(stream) => {
                        info!("Info: conectado al flujo de entrada del gateway");
                        reader = Some(stream);
                        state = StateUpstream::Work;
                    }
                    Err(e) => {
                        error!("Error: no se pudo conectar al gateway, reintentando en 30 segundos: {e}");
                        state = StateUpstream::Error;
                    }
                }
            }

            StateUpstream::Work => {
                if let Some(stream) = reader.as_mut() {
                    let mut line = String::new();
                    match stream.read_line(&mut line).await {
                        Ok(0) => {
                            warn!("Warning: flujo cerrado por el gateway");
                            state = StateUpstream::Error;
                        }
                        Ok(_) => {
                            let frame = line.trim();
                            if frame.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<InboundMessage>(frame) {
                                Ok(inbound) => {
                                    if tx.send(inbound).await.is_err() {
                                        error!("Error: no se pudo entregar el mensaje entrante al servidor");
                                        return;
                                    }
                                }
                                Err(e) => {
                                    warn!("Warning: trama inválida recibida del gateway, descartando {frame}: {e}");
                                }
                            }
                        }
                        Err(e) => {
                            error!("Error: falla leyendo del gateway: {e}");
                            state = StateUpstream::Error;
                        }
                    }
                } else {
                    warn!("Warning: estado Work sin flujo válido, reiniciando...");
                    state = StateUpstream::Init;
                }
            }

            StateUpstream::Error => {
                reader = None;
                sleep(RETRY_WAIT).await;
                state = StateUpstream::Init;
            }
        }
    }
}


/// Inicializa la tarea del servidor del gateway en segundo plano (tokio task).
pub fn start_server(rx_from_upstream: mpsc::Receiver<InboundMessage>,
                    tx_to_producer: mpsc::Sender<String>,
                    app_context: AppContext) {

    info!("Info: iniciando tarea server");
    tokio::spawn(async move {
        run_server(
            rx_from_upstream,
            tx_to_producer,
            app_context,
        ).await;
    });
}


/// Inicializa la tarea de la conexión de entrada en segundo plano (tokio task).
pub fn start_upstream(tx_to_server: mpsc::Sender<InboundMessage>,
                      app_context: AppContext) {

    info!("Info: iniciando tarea upstream");
    tokio::spawn(async move {
        run_upstream(
            tx_to_server,
            app_context,
        ).await;
    });
}
