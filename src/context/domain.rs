//! Definición del Contexto de Aplicación (Shared State).
//!
//! Este módulo implementa el patrón de **Estado Compartido** para aplicaciones asíncronas.
//! El `AppContext` actúa como un contenedor de "Inyección de Dependencias" manual,
//! agrupando los recursos que deben ser accesibles por múltiples tareas concurrentes
//! (Configuración, Registro de clientes, Cliente del gateway de push).


use std::sync::Arc;
use crate::gateway::domain::{FcmClient, PushSender};
use crate::registry::domain::ClientRegistry;
use crate::system::domain::System;


#[derive(Clone)]
pub struct AppContext {
    pub system: Arc<System>,
    pub registry: ClientRegistry,
    pub gateway: Arc<dyn PushSender>,
}


impl AppContext {
    pub fn new(system: Arc<System>) -> Self {
        let gateway: Arc<dyn PushSender> = Arc::new(FcmClient::new(&system));
        Self {
            registry: ClientRegistry::new(),
            gateway,
            system,
        }
    }
}
