//! Remote stop for a running stream over an nng REP socket.
//!
//! Clients send `stop` and get `ok` back; any other message is answered with
//! `unknown command`.

use nng::{Aio, AioResult, Context, Message, Protocol, Socket};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::pipeline::StopHandle;

pub const STOP_COMMAND: &str = "stop";

/// Listens until dropped.
pub struct ControlServer {
    // aio is dropped before the socket
    _aio: Aio,
    _socket: Socket,
}

impl ControlServer {
    pub fn start(address: &str, stop: StopHandle) -> Result<Self> {
        let unavailable = |e: nng::Error| Error::unavailable("control socket", e);

        let socket = Socket::new(Protocol::Rep0).map_err(unavailable)?;
        let ctx = Context::new(&socket).map_err(unavailable)?;
        let ctx_clone = ctx.clone();
        let aio = Aio::new(move |aio, res| on_event(aio, &ctx_clone, &stop, res))
            .map_err(unavailable)?;

        socket.listen(address).map_err(unavailable)?;
        ctx.recv(&aio).map_err(unavailable)?;

        info!(address, "control socket listening");
        Ok(Self {
            _aio: aio,
            _socket: socket,
        })
    }
}

/// Reply for one command, triggering `stop` when asked to.
pub fn reply_for(command: &[u8], stop: &StopHandle) -> &'static str {
    let command = String::from_utf8_lossy(command);
    let command = command.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if command == STOP_COMMAND {
        info!("stop requested over control socket");
        stop.stop();
        "ok"
    } else {
        debug!(command, "unknown control command");
        "unknown command"
    }
}

fn on_event(aio: Aio, ctx: &Context, stop: &StopHandle, res: AioResult) {
    match res {
        AioResult::Recv(Ok(message)) => {
            let reply = reply_for(message.as_slice(), stop);
            if let Err((_, e)) = ctx.send(&aio, Message::from(reply.as_bytes())) {
                warn!(error = %e, "control reply failed");
                rearm(&aio, ctx);
            }
        }
        AioResult::Recv(Err(nng::Error::Closed)) => {}
        AioResult::Recv(Err(e)) => {
            warn!(error = %e, "control receive failed");
            rearm(&aio, ctx);
        }
        AioResult::Send(Ok(())) => rearm(&aio, ctx),
        AioResult::Send(Err((_, e))) => {
            warn!(error = %e, "control reply failed");
            rearm(&aio, ctx);
        }
        AioResult::Sleep(_) => {}
    }
}

fn rearm(aio: &Aio, ctx: &Context) {
    if let Err(e) = ctx.recv(aio) {
        warn!(error = %e, "control socket stopped receiving");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stop_triggers_the_handle() {
        let stop = StopHandle::new();
        assert_eq!(reply_for(b"status", &stop), "unknown command");
        assert!(!stop.is_stopped());

        assert_eq!(reply_for(b"stop\n", &stop), "ok");
        assert!(stop.is_stopped());
    }

    #[test]
    fn stop_over_the_socket() {
        let address = "inproc://signtracking/control-test";
        let stop = StopHandle::new();
        let _server = ControlServer::start(address, stop.clone()).unwrap();

        let client = Socket::new(Protocol::Req0).unwrap();
        client.dial(address).unwrap();

        client.send(&b"hello"[..]).map_err(|(_, e)| e).unwrap();
        assert_eq!(client.recv().unwrap().as_slice(), b"unknown command");
        assert!(!stop.is_stopped());

        client.send(&b"stop"[..]).map_err(|(_, e)| e).unwrap();
        assert_eq!(client.recv().unwrap().as_slice(), b"ok");
        assert!(stop.is_stopped());
    }
}
