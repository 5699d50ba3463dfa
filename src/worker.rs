use super::addr::ServiceAddress;
use super::app;
use super::client::Client;
use super::conf;
use super::message;
use super::message::MessageStatus;
use super::method;
use super::method::ParamCount;
use super::sclient::HostSettings;
use super::session::{SessionHandle, SessionState};
use super::stack;
use super::util;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time;

/// How often each worker wakes to check for shutdown signals, etc.
const IDLE_WAKE_TIME: i32 = 5;
const DEFAULT_MAX_REQUESTS: u32 = 5000;
const DEFAULT_KEEPALIVE: i32 = 5;

/// Each worker thread is in one of these states.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum WorkerState {
    Idle,
    Active,
    Done,
}

#[derive(Debug)]
pub struct WorkerStateEvent {
    pub worker_id: u64,
    pub state: WorkerState,
}

impl WorkerStateEvent {
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }
    pub fn state(&self) -> WorkerState {
        self.state
    }
}

/// A Worker runs in its own thread and responds to API requests.
///
/// Each worker owns its own bus connection and session registry; a
/// worker serves one conversation at a time.
pub struct Worker {
    service: String,

    config: Arc<conf::Config>,

    /// Has our server asked us to clean up and exit?
    stopping: Arc<AtomicBool>,

    host_settings: Arc<HostSettings>,

    client: Client,

    /// True if the caller has requested a stateful conversation.
    connected: bool,

    methods: Arc<HashMap<String, method::Method>>,

    /// Currently active session.
    ///
    /// For stateless requests, each new conversation thread results
    /// in a new session.
    session: Option<SessionHandle>,

    /// Unique ID for tracking/logging each worker.
    worker_id: u64,

    /// Rendezvous channel for reporting our state to the server.
    state_tx: mpsc::SyncSender<WorkerStateEvent>,
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Worker ({})", self.worker_id)
    }
}

impl Worker {
    pub fn new(
        service: String,
        worker_id: u64,
        config: Arc<conf::Config>,
        host_settings: Arc<HostSettings>,
        stopping: Arc<AtomicBool>,
        methods: Arc<HashMap<String, method::Method>>,
        state_tx: mpsc::SyncSender<WorkerStateEvent>,
    ) -> Result<Worker, String> {
        let client = Client::connect(config.clone())?;

        // Server-side session adoption reads per-service flags from
        // the host settings.
        client.set_host_settings(host_settings.clone());

        Ok(Worker {
            config,
            host_settings,
            stopping,
            service,
            worker_id,
            methods,
            client,
            state_tx,
            session: None,
            connected: false,
        })
    }

    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Create a new ApplicationWorker instance and initialize
    /// its environment.
    pub fn create_app_worker(
        &mut self,
        factory: app::ApplicationWorkerFactory,
        env: Box<dyn app::ApplicationEnv>,
    ) -> Result<Box<dyn app::ApplicationWorker>, String> {
        let mut app_worker = (factory)();
        app_worker.absorb_env(
            self.client.clone(),
            self.config.clone(),
            self.host_settings.clone(),
            env,
        )?;
        Ok(app_worker)
    }

    /// Wait for and process inbound API calls.
    pub fn listen(&mut self, mut appworker: Box<dyn app::ApplicationWorker>) {
        let selfstr = format!("{self}");

        if let Err(e) = appworker.worker_start() {
            log::error!("{selfstr} worker_start failed {e}.  Exiting");
            return;
        }

        let max_requests: u32 = self
            .host_settings
            .value(&format!("apps/{}/unix_config/max_requests", self.service))
            .as_u32()
            .unwrap_or(DEFAULT_MAX_REQUESTS);

        let keepalive: i32 = self
            .host_settings
            .value(&format!("apps/{}/unix_config/keepalive", self.service))
            .as_i32()
            .unwrap_or(DEFAULT_KEEPALIVE);

        let mut requests: u32 = 0;

        // New conversations arrive at the service-level queue; within
        // a stateful conversation the caller addresses us directly.
        let service_addr = ServiceAddress::new(&self.service).as_str().to_string();

        while requests < max_requests {
            let timeout: i32;
            let recipient: Option<&str>;

            if self.connected {
                // We're in the middle of a stateful conversation.
                // Listen for messages sent specifically to our bus
                // address and only wait up to keepalive seconds for
                // subsequent messages.
                recipient = None;
                timeout = keepalive;
            } else {
                // If we are not within a stateful conversation, clear
                // any lingering bus data and session state since it
                // is no longer relevant.
                if let Err(e) = self.reset() {
                    log::error!("{selfstr} could not reset: {e}.  Exiting");
                    break;
                }

                recipient = Some(&service_addr);
                timeout = IDLE_WAKE_TIME;
            }

            // work_occurred will be true if we handled a frame or
            // had to address a stateful session timeout.
            let (work_occurred, msg_handled) =
                match self.handle_recv(&mut appworker, timeout, recipient) {
                    Ok(w) => w,
                    Err(e) => {
                        log::error!("{selfstr} error in main loop: {e}");
                        break;
                    }
                };

            // If we are connected, we remain Active and avoid counting
            // subsequent requests within this stateful conversation
            // toward our overall request count.
            if self.connected {
                continue;
            }

            if work_occurred {
                // also true if msg_handled

                // If we performed any work and we are outside of a
                // keepalive loop, let our worker know a stateless
                // request or stateful conversation has just completed.
                if let Err(e) = appworker.end_session() {
                    log::error!("{selfstr} end_session() returned an error: {e}");
                    break;
                }

                if self.set_idle().is_err() {
                    break;
                }

                if msg_handled {
                    // Each handled conversation counts as 1 request.
                    requests += 1;

                    // An inbound message may have modified our
                    // thread-scoped locale.  Reset our locale back
                    // to the default so the previous locale does not
                    // affect future messages.
                    message::reset_thread_locale();
                }
            } else {
                // Let the worker know we woke up and nothing
                // interesting happened.
                if let Err(e) = appworker.worker_idle_wake(self.connected) {
                    log::error!("{selfstr} worker_idle_wake() returned an error: {e}");
                    break;
                }
            }

            // Did we get a shutdown signal?  Check this after
            // end_session() so we don't interrupt a conversation to
            // shut down.
            if self.stopping.load(Ordering::Relaxed) {
                log::info!("{selfstr} received a stop signal");
                break;
            }
        }

        log::debug!("{self} exiting listen loop and cleaning up");

        if let Err(e) = appworker.worker_end() {
            log::error!("{selfstr} worker_end failed {e}");
        }

        self.notify_state(WorkerState::Done).ok(); // ignore errors

        // Clear our worker-specific bus address of any lingering data.
        self.reset().ok();
    }

    /// Call recv() on our bus connection and process the response.
    ///
    /// Return value consists of (work_occurred, msg_handled).
    fn handle_recv(
        &mut self,
        appworker: &mut Box<dyn app::ApplicationWorker>,
        timeout: i32,
        recipient: Option<&str>,
    ) -> Result<(bool, bool), String> {
        let selfstr = format!("{self}");

        let recv_result = self
            .client
            .singleton()
            .borrow_mut()
            .transport_mut()
            .recv(timeout, recipient);

        let frame_op = match recv_result {
            Ok(o) => o,
            Err(ref e) => {
                // There's a good chance an error in recv() means the
                // thread/system is unusable, so let the worker exit.
                //
                // Avoid a tight thread respawn loop with a short pause.
                thread::sleep(time::Duration::from_secs(1));
                Err(e)?
            }
        };

        let frame = match frame_op {
            Some(f) => f,
            None => {
                if !self.connected {
                    // No new frame and no timeout to address.
                    return Ok((false, false));
                }

                // Caller failed to send a message within the
                // keepalive interval.
                log::warn!("{selfstr} timeout waiting on request while connected");

                self.set_active()?;

                if let Some(ses) = self.session.as_ref() {
                    let trace = ses.session().borrow().last_thread_trace();
                    if let Err(e) = ses.status(
                        trace,
                        MessageStatus::Timeout,
                        message::STATUS_CLASS,
                        "Timeout",
                    ) {
                        Err(format!("server: could not reply with Timeout message: {e}"))?;
                    }
                }

                appworker.keepalive_timeout()?;
                self.connected = false;

                return Ok((true, false)); // work occurred
            }
        };

        self.set_active()?;

        if !self.connected {
            // Any frame received in a non-connected state represents
            // the start of a session.  For stateful convos, the
            // current message will be a CONNECT.  Otherwise, it will
            // be a one-off request.
            appworker.start_session()?;
        }

        let client = self.client.clone();
        let service = self.service.clone();

        let mut dispatch = MethodDispatch {
            config: &self.config,
            methods: &self.methods,
            app_worker: appworker,
        };

        match stack::handle_frame(&client, frame, Some(&service), Some(&mut dispatch)) {
            Ok(Some(handle)) => {
                self.connected = handle.state() == SessionState::Connected;
                self.session = Some(handle);
            }
            Ok(None) => {
                self.connected = false;
            }
            Err(e) => {
                // An error within a method handler is not enough
                // to shut down the worker.  Log, force a disconnect
                // on the session (if applicable) and move on.
                log::error!("{selfstr} error handling frame: {e}");
                self.connected = false;
            }
        }

        Ok((true, true)) // work occurred, message handled
    }

    /// Tell our parent we're about to perform some work.
    fn set_active(&mut self) -> Result<(), String> {
        if let Err(e) = self.notify_state(WorkerState::Active) {
            Err(format!(
                "{self} failed to notify parent of Active state. Exiting. {e}"
            ))?;
        }

        Ok(())
    }

    /// Tell our parent we're available to perform work.
    fn set_idle(&mut self) -> Result<(), String> {
        if let Err(e) = self.notify_state(WorkerState::Idle) {
            Err(format!(
                "{self} failed to notify parent of Idle state. Exiting. {e}"
            ))?;
        }

        Ok(())
    }

    /// Drop session state and clear our bus queue between
    /// conversations.
    fn reset(&mut self) -> Result<(), String> {
        self.connected = false;
        self.session = None;
        self.client.clear()
    }

    /// Report this worker's state to the server.
    fn notify_state(&self, state: WorkerState) -> Result<(), mpsc::SendError<WorkerStateEvent>> {
        log::trace!("{self} reporting state {state:?}");

        self.state_tx.send(WorkerStateEvent {
            worker_id: self.worker_id(),
            state: state,
        })
    }
}

/// Looks up inbound API calls in the method registry, verifies their
/// parameter counts, and runs their handlers.
struct MethodDispatch<'a> {
    config: &'a Arc<conf::Config>,
    methods: &'a Arc<HashMap<String, method::Method>>,
    app_worker: &'a mut Box<dyn app::ApplicationWorker>,
}

impl app::RequestHandler for MethodDispatch<'_> {
    fn invoke(
        &mut self,
        session: &SessionHandle,
        trace: usize,
        method: &message::Method,
    ) -> Result<(), String> {
        let api_name = method.method();

        log::info!(
            "CALL: {} {}",
            api_name,
            util::stringify_params(api_name, method.params(), self.config.log_protect())
        );

        let mdef = match self.methods.get(api_name) {
            Some(m) => m.clone(),
            None => {
                log::warn!("Method not found: {}", api_name);
                return session.status(
                    trace,
                    MessageStatus::MethodNotFound,
                    message::STATUS_CLASS,
                    &format!("Method not found: {}", api_name),
                );
            }
        };

        // Make sure the number of params sent by the caller matches
        // the parameter count for the method.
        if !ParamCount::matches(mdef.param_count(), method.params().len() as u8) {
            return session.status(
                trace,
                MessageStatus::BadRequest,
                message::STATUS_CLASS,
                &format!(
                    "Invalid param count sent: method={} sent={} needed={}",
                    api_name,
                    method.params().len(),
                    mdef.param_count(),
                ),
            );
        }

        if let Err(ref err) = (mdef.handler())(self.app_worker, session, trace, method) {
            log::error!("{session} method {api_name} failed with {err}");
            self.app_worker.api_call_error(api_name, err);
            session.status(
                trace,
                MessageStatus::InternalServerError,
                message::STATUS_CLASS,
                &format!("Internal Server Error: {err}"),
            )?;
            return Err(format!("{api_name} failed: {err}"));
        }

        // Handlers that did not explicitly finish their request get
        // an automatic Request Complete.
        if !session.responded_complete() {
            session.send_complete(trace)
        } else {
            Ok(())
        }
    }
}
