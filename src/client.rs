use super::bus;
use super::conf;
use super::params::ApiParams;
use super::registry::SessionRegistry;
use super::sclient::HostSettings;
use super::session::ResponseIterator;
use super::session::SessionHandle;
use super::transport::Transport;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Generally speaking, we only need 1 ClientSingleton per thread
/// (hence the name).  This owns the bus connection, the registry of
/// sessions the dispatcher routes into, and the host settings used
/// for server-side session adoption.
pub struct ClientSingleton {
    transport: Box<dyn Transport>,

    config: Arc<conf::Config>,

    /// Live sessions on this thread, keyed by conversation thread.
    sessions: SessionRegistry,

    /// If present, server-side adoption reads per-service flags here.
    host_settings: Option<Arc<HostSettings>>,
}

impl ClientSingleton {
    fn new(config: Arc<conf::Config>) -> Result<ClientSingleton, String> {
        let bus = bus::Bus::new(config.client())?;

        Ok(ClientSingleton {
            config,
            transport: Box::new(bus),
            sessions: SessionRegistry::new(),
            host_settings: None,
        })
    }

    fn from_transport(
        config: Arc<conf::Config>,
        transport: Box<dyn Transport>,
    ) -> ClientSingleton {
        ClientSingleton {
            config,
            transport,
            sessions: SessionRegistry::new(),
            host_settings: None,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    pub fn sessions_mut(&mut self) -> &mut SessionRegistry {
        &mut self.sessions
    }

    pub fn config(&self) -> &Arc<conf::Config> {
        &self.config
    }

    pub fn host_settings(&self) -> Option<&Arc<HostSettings>> {
        self.host_settings.as_ref()
    }

    pub fn set_host_settings(&mut self, settings: Arc<HostSettings>) {
        self.host_settings = Some(settings);
    }
}

impl fmt::Display for ClientSingleton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientSingleton({})", self.transport.address())
    }
}

/// Wrapper around our ClientSingleton Ref so we can easily share a
/// client within a given thread.
///
/// Wrapping the Ref in a struct allows us to present a client-like
/// API to the caller.  I.e. the caller is not required to .borrow() /
/// .borrow_mut() directly when performing actions against the client.
///
/// When a new client Ref is needed, clone the Client.
#[derive(Clone)]
pub struct Client {
    singleton: Rc<RefCell<ClientSingleton>>,
    address: String,
    domain: String,
}

impl Client {
    /// Connect to the bus and return a new Client.
    pub fn connect(config: Arc<conf::Config>) -> Result<Client, String> {
        let domain = config.client().domain().name().to_string();

        // This performs the actual bus-level connection.
        let singleton = ClientSingleton::new(config)?;

        let address = singleton.transport().address().to_string();

        Ok(Client {
            address,
            domain,
            singleton: Rc::new(RefCell::new(singleton)),
        })
    }

    /// Build a Client around an existing transport connection.
    pub fn with_transport(config: Arc<conf::Config>, transport: Box<dyn Transport>) -> Client {
        let domain = config.client().domain().name().to_string();
        let address = transport.address().to_string();
        let singleton = ClientSingleton::from_transport(config, transport);

        Client {
            address,
            domain,
            singleton: Rc::new(RefCell::new(singleton)),
        }
    }

    pub fn singleton(&self) -> &Rc<RefCell<ClientSingleton>> {
        &self.singleton
    }

    /// Our endpoint address on the bus.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn config(&self) -> Arc<conf::Config> {
        self.singleton.borrow().config.clone()
    }

    pub fn set_host_settings(&self, settings: Arc<HostSettings>) {
        self.singleton.borrow_mut().set_host_settings(settings);
    }

    /// True if the host settings flag this service as stateless.
    ///
    /// Absent settings, or an absent or non-numeric flag, mean
    /// stateful.
    pub fn service_is_stateless(&self, service: &str) -> bool {
        match self.singleton.borrow().host_settings() {
            Some(hs) => hs.stateless(service),
            None => false,
        }
    }

    /// Create a new client session for the requested service.
    pub fn session(&self, service: &str) -> SessionHandle {
        SessionHandle::new(self.clone(), service)
    }

    /// Send a request and receive a ResponseIterator for iterating
    /// the responses to the method.
    ///
    /// Uses the default request timeout DEFAULT_REQUEST_TIMEOUT.
    pub fn sendrecv<T>(
        &self,
        service: &str,
        method: &str,
        params: T,
    ) -> Result<ResponseIterator, String>
    where
        T: Into<ApiParams>,
    {
        Ok(ResponseIterator::new(
            self.session(service).request(method, params)?,
        ))
    }

    /// Discard any pending frames at our endpoint address.
    pub fn clear(&self) -> Result<(), String> {
        self.singleton.borrow_mut().transport_mut().clear()
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client({})", self.address())
    }
}
