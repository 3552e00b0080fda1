use std::sync::Arc;
use tracing::{error, info};
use crate::channels::domain::Channels;
use crate::context::domain::AppContext;
use crate::dispatch::logic::start_dispatch;
use crate::gateway::logic::{start_server, start_upstream};
use crate::queue::logic::{start_listener, start_producer};
use crate::system::domain::{init_tracing, System};

mod channels;
mod config;
mod context;
mod dispatch;
mod gateway;
mod message;
mod queue;
mod registry;
mod system;


#[tokio::main]
async fn main() {

    let system = Arc::new(System::new().expect("configuración inválida"));
    init_tracing(&system);

    let channels = Channels::new();
    let app_context = AppContext::new(system);

    start_listener(channels.listener_to_dispatch,
                   app_context.clone());

    start_dispatch(channels.dispatch_from_listener,
                   app_context.clone());

    start_upstream(channels.upstream_to_server,
                   app_context.clone());

    start_server(channels.server_from_upstream,
                 channels.server_to_producer,
                 app_context.clone());

    start_producer(channels.producer_from_server,
                   app_context);

    info!("Info: relé iniciado, esperando señal de terminación");

    // Sin camino de apagado ordenado: el proceso vive hasta que lo maten.
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Error: falla esperando la señal de terminación: {e}");
    }
}
