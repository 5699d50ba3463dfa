use super::client;
use super::conf;
use super::message;
use super::method;
use super::sclient;
use super::session::SessionHandle;
use std::any::Any;
use std::sync::Arc;

/// Function that generates ApplicationWorker implementers.
pub type ApplicationWorkerFactory = fn() -> Box<dyn ApplicationWorker>;

/// Receives inbound API calls routed by the dispatcher.
///
/// Implementations are expected to reply via the session's respond /
/// respond_complete / status calls before returning.
pub trait RequestHandler {
    fn invoke(
        &mut self,
        session: &SessionHandle,
        trace: usize,
        method: &message::Method,
    ) -> Result<(), String>;
}

/// Opaque collection of read-only, thread-Send'able data.
pub trait ApplicationEnv: Any + Sync + Send {
    fn as_any(&self) -> &dyn Any;
}

/// Per-worker application state and lifecycle hooks.
pub trait ApplicationWorker: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Passes copies of server-global environment data to the worker.
    fn absorb_env(
        &mut self,
        client: client::Client,
        config: Arc<conf::Config>,
        host_settings: Arc<sclient::HostSettings>,
        env: Box<dyn ApplicationEnv>,
    ) -> Result<(), String>;

    /// Called after absorb_env, but before any work occurs.
    fn worker_start(&mut self) -> Result<(), String>;

    /// Called every time our worker wakes up to check for signals,
    /// timeouts, etc.
    ///
    /// This method is only called when no other actions occur as
    /// a result of waking up.
    ///
    /// * `connected` - True if we are in the middle of a stateful
    ///   conversation.
    fn worker_idle_wake(&mut self, connected: bool) -> Result<(), String>;

    /// Called after all work is done and the thread is going away.
    ///
    /// Offers a chance to clean up any resources.
    fn worker_end(&mut self) -> Result<(), String>;

    /// Called for stateful sessions on CONNECT and for each request
    /// in a stateless session.
    fn start_session(&mut self) -> Result<(), String>;

    /// Called for stateful sessions on DISCONNECT or keepalive
    /// timeout, and called for stateless sessions (one-offs) after
    /// the single request has completed.
    fn end_session(&mut self) -> Result<(), String>;

    /// Called if the client sent a CONNECT but no subsequent message
    /// within the configured timeout.
    fn keepalive_timeout(&mut self) -> Result<(), String>;

    /// Called when an API request handler returns an error.
    fn api_call_error(&mut self, method: &str, error: &str);
}

pub trait Application {
    /// Application service name, e.g. busrpc.settings
    fn name(&self) -> &str;

    /// Called when a service first starts, just after connecting to
    /// the bus.
    fn init(
        &mut self,
        client: client::Client,
        config: Arc<conf::Config>,
        host_settings: Arc<sclient::HostSettings>,
    ) -> Result<(), String>;

    /// Tell the server what methods this application implements.
    ///
    /// Called after self.init(), but before workers are spawned.
    fn register_methods(
        &self,
        client: client::Client,
        config: Arc<conf::Config>,
        host_settings: Arc<sclient::HostSettings>,
    ) -> Result<Vec<method::Method>, String>;

    /// Returns a function pointer (ApplicationWorkerFactory) that
    /// returns new ApplicationWorker's when called.
    ///
    /// Dynamic trait objects cannot be passed to threads, but
    /// functions that generate them can.
    fn worker_factory(&self) -> fn() -> Box<dyn ApplicationWorker>;

    /// Creates a new application environment object.
    fn env(&self) -> Box<dyn ApplicationEnv>;
}
