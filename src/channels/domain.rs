use tokio::sync::mpsc;
use crate::gateway::domain::InboundMessage;
use crate::message::domain::PushMessage;


pub struct Channels {
    pub listener_to_dispatch: mpsc::Sender<PushMessage>,
    pub dispatch_from_listener: mpsc::Receiver<PushMessage>,

    pub upstream_to_server: mpsc::Sender<InboundMessage>,
    pub server_from_upstream: mpsc::Receiver<InboundMessage>,

    pub server_to_producer: mpsc::Sender<String>,
    pub producer_from_server: mpsc::Receiver<String>,
}


impl Channels {
    pub fn new() -> Channels {
        let (l_to_d, d_from_l) = mpsc::channel::<PushMessage>(200);
        let (u_to_s, s_from_u) = mpsc::channel::<InboundMessage>(200);
        let (s_to_p, p_from_s) = mpsc::channel::<String>(10);

        Self {
            listener_to_dispatch: l_to_d,
            dispatch_from_listener: d_from_l,
            upstream_to_server: u_to_s,
            server_from_upstream: s_from_u,
            server_to_producer: s_to_p,
            producer_from_server: p_from_s,
        }
    }
}
