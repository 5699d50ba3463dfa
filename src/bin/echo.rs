//! Demonstration echo service.
use busrpc::app;
use busrpc::client::Client;
use busrpc::conf;
use busrpc::message;
use busrpc::method;
use busrpc::method::ParamCount;
use busrpc::sclient::HostSettings;
use busrpc::server::Server;
use busrpc::session::SessionHandle;
use std::any::Any;
use std::sync::Arc;

const SERVICE_NAME: &str = "busrpc.echo";

struct EchoEnv;

impl app::ApplicationEnv for EchoEnv {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct EchoApplication;

impl app::Application for EchoApplication {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn init(
        &mut self,
        _client: Client,
        _config: Arc<conf::Config>,
        _host_settings: Arc<HostSettings>,
    ) -> Result<(), String> {
        Ok(())
    }

    fn register_methods(
        &self,
        _client: Client,
        _config: Arc<conf::Config>,
        _host_settings: Arc<HostSettings>,
    ) -> Result<Vec<method::Method>, String> {
        Ok(vec![
            method::Method::new(
                &format!("{SERVICE_NAME}.echo"),
                ParamCount::Any,
                echo_method,
            ),
            method::Method::new(
                &format!("{SERVICE_NAME}.reverse"),
                ParamCount::Exactly(1),
                reverse_method,
            ),
        ])
    }

    fn worker_factory(&self) -> app::ApplicationWorkerFactory {
        || Box::new(EchoWorker {})
    }

    fn env(&self) -> Box<dyn app::ApplicationEnv> {
        Box::new(EchoEnv {})
    }
}

struct EchoWorker;

impl app::ApplicationWorker for EchoWorker {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn absorb_env(
        &mut self,
        _client: Client,
        _config: Arc<conf::Config>,
        _host_settings: Arc<HostSettings>,
        _env: Box<dyn app::ApplicationEnv>,
    ) -> Result<(), String> {
        Ok(())
    }

    fn worker_start(&mut self) -> Result<(), String> {
        log::debug!("EchoWorker starting");
        Ok(())
    }

    fn worker_idle_wake(&mut self, _connected: bool) -> Result<(), String> {
        Ok(())
    }

    fn worker_end(&mut self) -> Result<(), String> {
        log::debug!("EchoWorker ending");
        Ok(())
    }

    fn start_session(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn keepalive_timeout(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn api_call_error(&mut self, method: &str, error: &str) {
        log::error!("API call {method} failed: {error}");
    }
}

/// Reply once per parameter, in order.
fn echo_method(
    _worker: &mut Box<dyn app::ApplicationWorker>,
    session: &SessionHandle,
    trace: usize,
    method: &message::Method,
) -> Result<(), String> {
    for p in method.params() {
        session.respond(trace, p.clone())?;
    }
    Ok(())
}

/// Reply with the single string parameter reversed.
fn reverse_method(
    _worker: &mut Box<dyn app::ApplicationWorker>,
    session: &SessionHandle,
    trace: usize,
    method: &message::Method,
) -> Result<(), String> {
    let text = match method.params()[0].as_str() {
        Some(t) => t,
        None => return Err(format!("busrpc.echo.reverse requires a string")),
    };

    let reversed: String = text.chars().rev().collect();

    session.respond_complete(trace, reversed)
}

fn main() -> Result<(), String> {
    Server::start(Box::new(EchoApplication {}))
}
