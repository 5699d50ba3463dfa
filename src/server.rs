use super::app;
use super::client::Client;
use super::conf;
use super::init;
use super::message;
use super::method;
use super::sclient::{HostSettings, SettingsClient};
use super::session;
use super::util;
use super::worker::{Worker, WorkerState, WorkerStateEvent};
use signal_hook;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between housekeeping passes when no worker state reports
/// arrive.
const EVENT_POLL_TIME: u64 = 3;
/// Seconds a stopping server gives busy workers to finish their
/// conversations.
const DRAIN_DEADLINE: i32 = 30;
const DEFAULT_MIN_WORKERS: usize = 1;
const DEFAULT_MAX_WORKERS: usize = 30;

/// One spawned worker thread, remembered by the last state it
/// reported.
struct WorkerSlot {
    state: WorkerState,
    join_handle: thread::JoinHandle<()>,
}

pub struct Server {
    application: Box<dyn app::Application>,
    methods: Option<Arc<HashMap<String, method::Method>>>,
    config: Arc<conf::Config>,
    client: Client,

    /// Live worker threads keyed by worker id.
    workers: HashMap<u64, WorkerSlot>,

    /// Source of worker ids.  Ids are never reused within a run.
    worker_id_seq: u64,

    state_tx: mpsc::SyncSender<WorkerStateEvent>,
    state_rx: mpsc::Receiver<WorkerStateEvent>,
    stopping: Arc<AtomicBool>,
    host_settings: Arc<HostSettings>,

    /// Pool floor: keep at least this many workers alive.
    min_workers: usize,

    /// Pool ceiling: never exceed this many workers.
    max_workers: usize,
}

impl Server {
    pub fn start(application: Box<dyn app::Application>) -> Result<(), String> {
        let service = application.name().to_string();

        let config = match init::init() {
            Ok(c) => c,
            Err(e) => Err(format!("Cannot start server for {service}: {e}"))?,
        };

        // The config is final from here on.
        let config = config.into_shared();

        let client = match Client::connect(config.clone()) {
            Ok(c) => c,
            Err(e) => Err(format!("Server cannot connect to bus: {e}"))?,
        };

        let host_settings = match SettingsClient::get_host_settings(&client, false) {
            Ok(s) => s,
            Err(e) => {
                // A host with no settings service still serves; all
                // tunables fall back to their defaults.
                log::warn!("Cannot fetch host settings; using defaults: {e}");
                HostSettings::from_value(json::JsonValue::new_object())
            }
        };

        let min_workers = host_settings
            .value(&format!("apps/{service}/unix_config/min_children"))
            .as_u64()
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MIN_WORKERS);

        let max_workers = host_settings
            .value(&format!("apps/{service}/unix_config/max_children"))
            .as_u64()
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_WORKERS);

        // Workers report state over a rendezvous channel: a send does
        // not complete until the server has taken the event, so the
        // pool bookkeeping below never runs ahead of reality.
        let (state_tx, state_rx): (
            mpsc::SyncSender<WorkerStateEvent>,
            mpsc::Receiver<WorkerStateEvent>,
        ) = mpsc::sync_channel(0);

        let host_settings = host_settings.into_shared();

        client.set_host_settings(host_settings.clone());

        let mut server = Server {
            config,
            client,
            application,
            min_workers,
            max_workers,
            host_settings,
            state_tx,
            state_rx,
            methods: None,
            worker_id_seq: 0,
            workers: HashMap::new(),
            stopping: Arc::new(AtomicBool::new(false)),
        };

        server.listen()
    }

    fn service(&self) -> &str {
        self.application.name()
    }

    /// SIGTERM and SIGINT flip the shared stopping flag.  Workers
    /// check the flag between conversations; the listen loop checks
    /// it between events.
    fn trap_stop_signals(&self) -> Result<(), String> {
        for sig in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
            if let Err(e) = signal_hook::flag::register(sig, self.stopping.clone()) {
                return Err(format!("Error registering handler for signal {sig}: {e}"));
            }
        }

        Ok(())
    }

    fn service_init(&mut self) -> Result<(), String> {
        let client = self.client.clone();
        let config = self.config.clone();
        let host_settings = self.host_settings.clone();
        self.application.init(client, config, host_settings)
    }

    fn register_methods(&mut self) -> Result<(), String> {
        let client = self.client.clone();
        let config = self.config.clone();
        let host_settings = self.host_settings.clone();
        let list = self
            .application
            .register_methods(client, config, host_settings)?;
        let mut hash: HashMap<String, method::Method> = HashMap::new();
        for m in list {
            hash.insert(m.name().to_string(), m);
        }
        self.add_system_methods(&mut hash);
        self.methods = Some(Arc::new(hash));
        Ok(())
    }

    fn add_system_methods(&self, hash: &mut HashMap<String, method::Method>) {
        let name = "busrpc.system.echo";
        hash.insert(
            name.to_string(),
            method::Method::new(name, method::ParamCount::Any, system_method_echo),
        );

        let name = "busrpc.system.time";
        hash.insert(
            name.to_string(),
            method::Method::new(name, method::ParamCount::Zero, system_method_time),
        );
    }

    pub fn listen(&mut self) -> Result<(), String> {
        self.service_init()?;
        self.register_methods()?;
        self.replenish_workers();
        self.trap_stop_signals()?;

        let poll = Duration::from_secs(EVENT_POLL_TIME);

        while !self.stopping.load(Ordering::Relaxed) {
            // recv_timeout errs on timeout; either way this pass ends
            // with a sweep for dead threads.
            if let Ok(evt) = self.state_rx.recv_timeout(poll) {
                self.apply_worker_state(&evt);
            }

            self.reap_dead_workers();
        }

        log::info!("{} received a stop signal; draining workers", self.service());

        self.drain_workers();

        Ok(())
    }

    /// Top the pool back up to the configured floor.
    ///
    /// No-op once a stop has been requested.
    fn replenish_workers(&mut self) {
        if self.stopping.load(Ordering::Relaxed) {
            return;
        }

        let needed = self.min_workers.saturating_sub(self.workers.len());
        for _ in 0..needed {
            self.spawn_worker();
        }
    }

    fn spawn_worker(&mut self) {
        self.worker_id_seq += 1;
        let worker_id = self.worker_id_seq;

        log::debug!("server: starting worker {worker_id}");

        let service = self.service().to_string();
        let config = self.config.clone();
        let host_settings = self.host_settings.clone();
        let stopping = self.stopping.clone();
        let methods = self.methods.as_ref().unwrap().clone();
        let factory = self.application.worker_factory();
        let env = self.application.env();
        let state_tx = self.state_tx.clone();

        let join_handle = thread::spawn(move || {
            run_worker(
                service,
                worker_id,
                config,
                host_settings,
                stopping,
                methods,
                factory,
                env,
                state_tx,
            )
        });

        self.workers.insert(
            worker_id,
            WorkerSlot {
                state: WorkerState::Idle,
                join_handle,
            },
        );
    }

    /// Forget workers whose threads ended without reporting Done,
    /// e.g. after a panic, and backfill the pool.
    fn reap_dead_workers(&mut self) {
        let before = self.workers.len();

        self.workers.retain(|id, slot| {
            if slot.join_handle.is_finished() {
                log::warn!("server: worker {id} exited without saying goodbye");
                false
            } else {
                true
            }
        });

        if self.workers.len() != before {
            self.replenish_workers();
        }
    }

    /// Record a state report from a worker, then rebalance the pool.
    fn apply_worker_state(&mut self, evt: &WorkerStateEvent) {
        log::trace!(
            "server: worker {} is now {:?}",
            evt.worker_id(),
            evt.state()
        );

        match evt.state() {
            WorkerState::Done => {
                // A retiring worker (max requests served, or shutdown)
                // leaves the pool.
                if self.workers.remove(&evt.worker_id()).is_none() {
                    log::error!("server: unknown worker {} reported Done", evt.worker_id());
                }
                self.replenish_workers();
            }

            state => match self.workers.get_mut(&evt.worker_id()) {
                Some(slot) => slot.state = state,
                None => {
                    log::error!(
                        "server: unknown worker {} reported {state:?}",
                        evt.worker_id()
                    );
                    return;
                }
            },
        }

        if self.stopping.load(Ordering::Relaxed) {
            return;
        }

        // Grow only when every worker is mid-request, and never past
        // the ceiling.
        let busy = self.busy_worker_count();

        if busy == self.workers.len() {
            if self.workers.len() < self.max_workers {
                self.spawn_worker();
            } else {
                log::warn!("server: all {busy} workers busy and the pool is at its ceiling");
            }
        }
    }

    fn busy_worker_count(&self) -> usize {
        self.workers
            .values()
            .filter(|slot| slot.state == WorkerState::Active)
            .count()
    }

    /// Give busy workers a window to finish their conversations.
    ///
    /// Workers notice the stopping flag on their next wakeup; this
    /// loop only consumes their final state reports.
    fn drain_workers(&mut self) {
        let deadline = util::Timer::new(DRAIN_DEADLINE);

        while self.workers.len() > 0 {
            if deadline.done() {
                log::warn!(
                    "server: {} worker(s) still busy at the drain deadline",
                    self.workers.len()
                );
                break;
            }

            // Keep anyone watching the console informed.
            println!(
                "{}: waiting on {} worker(s), {}s left",
                self.service(),
                self.workers.len(),
                deadline.remaining()
            );

            if let Ok(evt) = self.state_rx.recv_timeout(Duration::from_secs(1)) {
                self.apply_worker_state(&evt);
            }

            self.reap_dead_workers();
        }

        // Exiting the process reclaims any threads that outlived the
        // deadline.
        std::process::exit(0);
    }
}

/// Thread body for one worker: build it, hand it a fresh application
/// worker, and let it listen until it retires.
fn run_worker(
    service: String,
    worker_id: u64,
    config: Arc<conf::Config>,
    host_settings: Arc<HostSettings>,
    stopping: Arc<AtomicBool>,
    methods: Arc<HashMap<String, method::Method>>,
    factory: app::ApplicationWorkerFactory,
    env: Box<dyn app::ApplicationEnv>,
    state_tx: mpsc::SyncSender<WorkerStateEvent>,
) {
    let mut worker = match Worker::new(
        service,
        worker_id,
        config,
        host_settings,
        stopping,
        methods,
        state_tx,
    ) {
        Ok(w) => w,
        Err(e) => {
            log::error!("Worker {worker_id} could not reach the bus: {e}");

            // If one worker cannot connect, its replacements probably
            // cannot either.  Pause so the server does not churn
            // through doomed threads.
            thread::sleep(Duration::from_secs(5));
            return;
        }
    };

    match worker.create_app_worker(factory, env) {
        Ok(w) => worker.listen(w),
        Err(e) => log::error!("Worker {worker_id} application setup failed: {e}"),
    }
}

// Built-in system method handlers.

fn system_method_echo(
    _worker: &mut Box<dyn app::ApplicationWorker>,
    session: &session::SessionHandle,
    trace: usize,
    method: &message::Method,
) -> Result<(), String> {
    for p in method.params() {
        session.respond(trace, p.clone())?;
    }
    Ok(())
}

fn system_method_time(
    _worker: &mut Box<dyn app::ApplicationWorker>,
    session: &session::SessionHandle,
    trace: usize,
    _method: &message::Method,
) -> Result<(), String> {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(t) => session.respond(trace, t.as_secs()),
        Err(e) => Err(format!("System time error: {e}")),
    }
}
