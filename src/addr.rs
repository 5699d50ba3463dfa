use super::util;
use gethostname::gethostname;
use std::fmt;
use std::process;

const BUS_ADDR_NAMESPACE: &str = "busrpc";

/// Models a bus-level address providing access to individual components
/// of each address.
///
/// Examples:
///
/// busrpc:service:$username:$domain:$service
/// busrpc:client:$username:$domain:$hostname:$pid:$random
#[derive(Debug, Clone)]
pub struct BusAddress {
    /// Full raw address string
    full: String,

    domain: String,
    username: String,

    /// Only service addresses have a service name
    service: Option<String>,

    is_client: bool,
    is_service: bool,
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Address={}", &self.full)
    }
}

impl BusAddress {
    /// Creates a new BusAddress from a bus address string.
    ///
    /// ```
    /// let addr =
    ///   busrpc::addr::BusAddress::from_str("busrpc:client:foobar:localhost:12345")
    ///   .expect("Error creating address from string");
    ///
    /// assert!(addr.is_client());
    /// assert_eq!(addr.domain(), "localhost");
    /// ```
    pub fn from_str(full: &str) -> Result<Self, String> {
        let parts: Vec<&str> = full.split(':').collect();

        // Every address has 4 well-known parts, so we need that many at minimum.
        if parts.len() < 4 {
            return Err(format!("BusAddress bad format: {}", full));
        }

        let purpose = parts[1];
        let username = parts[2].to_owned();
        let domain = parts[3].to_owned();

        let mut addr = BusAddress {
            full: full.to_string(),
            domain: domain,
            username: username,
            service: None,
            is_client: false,
            is_service: false,
        };

        if purpose.eq("service") {
            if let Some(service) = parts.get(4) {
                addr.service = Some(service.to_string());
                addr.is_service = true;
            } else {
                return Err(format!("Invalid service address: {full}"));
            }
        } else if purpose.eq("client") {
            addr.is_client = true;
        } else {
            return Err(format!("Invalid bus address: {full}"));
        }

        Ok(addr)
    }

    /// Full address string
    pub fn as_str(&self) -> &str {
        &self.full
    }
    pub fn domain(&self) -> &str {
        &self.domain
    }
    pub fn username(&self) -> &str {
        &self.username
    }
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }
    pub fn is_client(&self) -> bool {
        self.is_client
    }
    pub fn is_service(&self) -> bool {
        self.is_service
    }
}

#[derive(Debug, Clone)]
pub struct ClientAddress {
    addr: BusAddress,
}

impl ClientAddress {
    pub fn from_addr(addr: BusAddress) -> Result<Self, String> {
        if addr.is_client() {
            Ok(ClientAddress { addr })
        } else {
            Err(format!(
                "Cannot create a ClientAddress from a non-client BusAddress"
            ))
        }
    }

    pub fn from_string(full: &str) -> Result<Self, String> {
        let addr = BusAddress::from_str(full)?;
        if !addr.is_client() {
            return Err(format!("Invalid ClientAddress string: {full}"));
        }
        Ok(ClientAddress { addr })
    }

    pub fn as_str(&self) -> &str {
        self.addr.as_str()
    }

    /// Create a new ClientAddress for a domain.
    ///
    /// ```
    /// let username = "busrpc";
    /// let domain = "private.localhost";
    /// let addr = busrpc::addr::ClientAddress::new(username, domain);
    /// assert_eq!(addr.domain(), domain);
    /// assert!(addr.addr().is_client());
    /// ```
    pub fn new(username: &str, domain: &str) -> Self {
        let full = format!(
            "{}:client:{}:{}:{}:{}:{}",
            BUS_ADDR_NAMESPACE,
            username,
            domain,
            &gethostname().into_string().unwrap(),
            process::id(),
            &util::random_token(6)
        );

        ClientAddress {
            // Assumes the address string built above is valid.
            addr: BusAddress::from_str(&full).unwrap(),
        }
    }

    pub fn domain(&self) -> &str {
        self.addr.domain()
    }

    pub fn addr(&self) -> &BusAddress {
        &self.addr
    }
}

impl fmt::Display for ClientAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ClientAddress={}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ServiceAddress {
    addr: BusAddress,
}

impl ServiceAddress {
    pub fn from_addr(addr: BusAddress) -> Result<Self, String> {
        if addr.is_service() {
            Ok(ServiceAddress { addr })
        } else {
            Err(format!(
                "Cannot create a ServiceAddress from a non-service BusAddress"
            ))
        }
    }

    pub fn from_string(full: &str) -> Result<Self, String> {
        let addr = BusAddress::from_str(full)?;
        if !addr.is_service() {
            return Err(format!("Invalid ServiceAddress string: {full}"));
        }
        Ok(ServiceAddress { addr })
    }

    pub fn as_str(&self) -> &str {
        self.addr.as_str()
    }

    /// Create a user/domain-agnostic service address.
    ///
    /// Service addresses are non domain-specific and refer generically
    /// to a service.
    ///
    /// ```
    /// let service = "busrpc.settings";
    /// let addr = busrpc::addr::ServiceAddress::new(service);
    /// assert_eq!(addr.service(), service);
    /// assert!(addr.addr().is_service());
    /// ```
    pub fn new(service: &str) -> Self {
        let full = format!("{}:service:_:_:{}", BUS_ADDR_NAMESPACE, &service);

        ServiceAddress {
            addr: BusAddress::from_str(&full).unwrap(),
        }
    }

    pub fn addr(&self) -> &BusAddress {
        &self.addr
    }

    pub fn service(&self) -> &str {
        self.addr().service().unwrap()
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ServiceAddress={}", self.as_str())
    }
}
