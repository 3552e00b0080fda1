//! Registro en memoria de los clientes móviles.
//!
//! Los tokens de registro se acumulan durante la vida del proceso y se pierden
//! al reiniciar: los clientes se re-registran solos al arrancar la app (ping).
//! No hay camino de baja; los tokens vencidos se acumulan hasta el reinicio.


use std::sync::{Arc, Mutex};
use tracing::info;


/// Lista de tokens de registro, con orden de inserción y sin duplicados.
///
/// Es el único estado mutable compartido entre la tarea del servidor del
/// gateway (escritura) y la tarea de difusión (lectura). La difusión itera
/// sobre una copia (`snapshot`), por lo que un registro concurrente nunca
/// corrompe una iteración en curso.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    tokens: Arc<Mutex<Vec<String>>>,
}


impl ClientRegistry {

    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un token si todavía no está presente. Devuelve `true` si el
    /// token era nuevo. Los duplicados se ignoran en silencio.
    pub fn register(&self, token: &str) -> bool {
        let mut tokens = self.tokens.lock()
            .expect("lock del registro de clientes envenenado");

        if tokens.iter().any(|t| t == token) {
            return false;
        }

        info!("Info: nuevo cliente registrado {token}");
        tokens.push(token.to_string());
        true
    }

    /// Copia de la lista actual de tokens, en orden de inserción.
    pub fn snapshot(&self) -> Vec<String> {
        self.tokens.lock()
            .expect("lock del registro de clientes envenenado")
            .clone()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let registry = ClientRegistry::new();

        assert!(registry.register("token-1"));
        assert!(!registry.register("token-1"));
        assert!(registry.register("token-2"));
        assert!(!registry.register("token-1"));

        assert_eq!(registry.snapshot(), vec!["token-1".to_string(), "token-2".to_string()]);
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let registry = ClientRegistry::new();
        for token in ["c", "a", "b"] {
            registry.register(token);
        }
        assert_eq!(registry.snapshot(), vec!["c", "a", "b"]);
    }

    #[test]
    fn snapshot_is_isolated_from_later_registrations() {
        let registry = ClientRegistry::new();
        registry.register("token-1");

        let snapshot = registry.snapshot();
        registry.register("token-2");

        assert_eq!(snapshot, vec!["token-1"]);
        assert_eq!(registry.snapshot().len(), 2);
    }
}
