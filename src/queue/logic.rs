//! Lógica de consumo y producción sobre la cola de trabajos.
//!
//! Este módulo implementa las dos tareas que tocan la cola:
//!
//! 1. **Listener**: long poll sobre el tubo de eventos, traducción de cada
//!    payload a un [`PushMessage`] y entrega a la tarea de difusión por canal.
//!    Todo trabajo se borra después de procesarlo, sea aceptado, descartado o
//!    inválido, para garantizar que se consuma una sola vez.
//! 2. **Producer**: publica los comandos aceptados de los dispositivos en el
//!    tubo de comandos, reintentando sin límite con una espera fija ante
//!    fallas de conexión. Un comando nunca se descarta en silencio.
//!
//! Ambas tareas manejan la conexión con una máquina de estados
//! (Init → Work → Error) que reconecta con una espera fija de 30 segundos.


use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, instrument, warn};
use crate::config::queue::{PUT_DELAY_SECS, PUT_PRIORITY, PUT_TTR_SECS, RESERVE_TIMEOUT_SECS, RETRY_WAIT};
use crate::context::domain::AppContext;
use crate::message::domain::{PushMessage, QueueEvent};
use crate::queue::domain::{QueueClient, QueueError};


#[derive(Debug, Clone, Copy, PartialEq)]
enum StateQueue {
    Init,
    Work,
    Error,
}


/// Traduce el cuerpo de un trabajo de la cola a un mensaje de push.
///
/// Devuelve `None` tanto para payloads inválidos (se registra un warning con
/// el payload crudo) como para tipos de evento no aceptados (se registra a
/// nivel info). En ambos casos el trabajo igual debe borrarse de la cola.
pub(crate) fn push_from_body(body: &[u8]) -> Option<PushMessage> {

    let text = match std::str::from_utf8(body) {
        Ok(text) => text,
        Err(_) => {
            warn!("Warning: mensaje de la cola no es UTF-8 válido, descartando");
            return None;
        }
    };

    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Warning: JSON inválido recibido de la cola, descartando {text}: {e}");
            return None;
        }
    };

    let event_type = match value.get("type").and_then(|t| t.as_str()) {
        Some(event_type) => event_type.to_string(),
        None => {
            warn!("Warning: mensaje de la cola sin campo type, descartando {text}");
            return None;
        }
    };

    // El tipo se inspecciona antes de deserializar el evento completo: un
    // tipo no aceptado sin el resto de los campos es un descarte, no un error.
    if !QueueEvent::accepted(&event_type) {
        info!("Info: no se transmite evento de tipo {event_type}");
        return None;
    }

    match serde_json::from_value::<QueueEvent>(value) {
        Ok(event) => Some(PushMessage::from_queue_event(&event)),
        Err(e) => {
            warn!("Warning: evento {event_type} con campos incompletos, descartando {text}: {e}");
            None
        }
    }
}


async fn connect_consumer(ctx: &AppContext) -> Result<QueueClient, QueueError> {
    let mut client = QueueClient::connect(&ctx.system.beanstalk_host, ctx.system.beanstalk_port).await?;
    client.watch(&ctx.system.tube_events).await?;
    Ok(client)
}


async fn connect_producer(ctx: &AppContext) -> Result<QueueClient, QueueError> {
    let mut client = QueueClient::connect(&ctx.system.beanstalk_host, ctx.system.beanstalk_port).await?;
    client.use_tube(&ctx.system.tube_commands).await?;
    Ok(client)
}


/// Ejecuta el bucle del consumidor de eventos. No retorna.
///
/// # Flujo de Trabajo
/// 1. Conecta y se suscribe al tubo de eventos.
/// 2. Reserva con un long poll de 60 segundos; el timeout sin trabajos no es
///    un error, simplemente vuelve a reservar.
/// 3. Traduce el trabajo recibido y lo entrega al canal de difusión.
/// 4. Borra el trabajo de la cola.
/// 5. Ante una falla de conexión, descarta la conexión, espera 30 segundos y
///    reconecta. Sin límite de reintentos ni crecimiento de la espera.
#[instrument(name = "run_listener_task", skip(tx, app_context))]
pub async fn run_listener(tx: mpsc::Sender<PushMessage>, app_context: AppContext) {

    info!("Info: escuchando la cola en {}:{}",
          app_context.system.beanstalk_host,
          app_context.system.beanstalk_port);

    let mut state = StateQueue::Init;
    let mut consumer: Option<QueueClient> = None;

    loop {
        match state {
            StateQueue::Init => {
                match connect_consumer(&app_context).await {
                    Ok(client) => {
                        info!("Info: conectado al tubo de eventos {}", app_context.system.tube_events);
                        consumer = Some(client);
                        state = StateQueue::Work;
                    }
                    Err(e) => {
                        error!("Error: no se pudo conectar a la cola, reintentando en 30 segundos: {e:?}");
                        state = StateQueue::Error;
                    }
                }
            }

            StateQueue::Work => {
                if let Some(client) = consumer.as_mut() {
                    match client.reserve_with_timeout(RESERVE_TIMEOUT_SECS).await {
                        Ok(Some(job)) => {
                            if let Some(message) = push_from_body(&job.body) {
                                if tx.send(message).await.is_err() {
                                    error!("Error: no se pudo entregar el evento a la tarea de difusión");
                                }
                            }
                            // El trabajo se borra siempre, haya sido difundido o no.
                            if let Err(e) = client.delete(job.id).await {
                                error!("Error: no se pudo borrar el trabajo {}: {e:?}", job.id);
                                state = StateQueue::Error;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!("Error: falla de conexión con la cola, reintentando en 30 segundos: {e:?}");
                            state = StateQueue::Error;
                        }
                    }
                } else {
                    warn!("Warning: estado Work sin conexión válida, reiniciando...");
                    state = StateQueue::Init;
                }
            }

            StateQueue::Error => {
                consumer = None;
                sleep(RETRY_WAIT).await;
                state = StateQueue::Init;
            }
        }
    }
}


/// Ejecuta el bucle del productor de comandos.
///
/// Consume comandos del canal del servidor del gateway y los publica uno por
/// uno. La espera de reintento suspende solo esta tarea: una caída de la cola
/// no frena la atención de mensajes entrantes, solo demora los comandos.
pub async fn run_producer(mut rx: mpsc::Receiver<String>, app_context: AppContext) {

    let mut producer: Option<QueueClient> = None;

    while let Some(command) = rx.recv().await {
        post(&mut producer, &app_context, &command, RETRY_WAIT).await;
    }
    info!("Info: canal de comandos cerrado, terminando tarea");
}


/// Publica un comando en el tubo de comandos, reintentando hasta lograrlo.
///
/// Reconecta cuando hace falta y repite el mismo `put` ante cada falla de
/// transporte, con la espera indicada entre intentos. Retorna recién cuando
/// el comando quedó encolado.
pub(crate) async fn post(conn: &mut Option<QueueClient>,
                         ctx: &AppContext,
                         message: &str,
                         retry_wait: Duration) {

    info!("Info: publicando comando en la cola: {message}");

    loop {
        if conn.is_none() {
            match connect_producer(ctx).await {
                Ok(client) => *conn = Some(client),
                Err(e) => {
                    error!("Error: no se pudo conectar a la cola, reintentando en 30 segundos: {e:?}");
                    sleep(retry_wait).await;
                    continue;
                }
            }
        }

        let Some(client) = conn.as_mut() else { continue };

        match client.put(PUT_PRIORITY, PUT_DELAY_SECS, PUT_TTR_SECS, message.as_bytes()).await {
            Ok(id) => {
                debug!("Debug: comando encolado con id {id}");
                return;
            }
            Err(e) => {
                error!("Error: no se pudo encolar el comando, reintentando en 30 segundos: {e:?}");
                *conn = None;
                sleep(retry_wait).await;
            }
        }
    }
}


/// Inicializa la tarea del consumidor de eventos en segundo plano (tokio task).
pub fn start_listener(tx_to_dispatch: mpsc::Sender<PushMessage>,
                      app_context: AppContext) {

    info!("Info: iniciando tarea listener");
    tokio::spawn(async move {
        run_listener(
            tx_to_dispatch,
            app_context,
        ).await;
    });
}


/// Inicializa la tarea del productor de comandos en segundo plano (tokio task).
pub fn start_producer(rx_from_server: mpsc::Receiver<String>,
                      app_context: AppContext) {

    info!("Info: iniciando tarea producer");
    tokio::spawn(async move {
        run_producer(
            rx_from_server,
            app_context,
        ).await;
    });
}
