use super::addr::ClientAddress;
use super::conf;
use super::transport::{Frame, Transport};
use redis::{Commands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::fmt;
use std::time;

/// Redis-backed Transport.
///
/// Every endpoint owns a uniquely named list key which acts as its
/// mailbox; service-level queues are shared list keys popped by any
/// worker of that service.
pub struct Bus {
    connection: redis::Connection,

    // Every bus connection has a unique client address.
    address: ClientAddress,

    /// Set when a read or write fails at the connection level.
    error: bool,
}

impl Bus {
    pub fn new(config: &conf::BusClient) -> Result<Self, String> {
        let info = Bus::connection_info(config)?;

        log::trace!("Bus::new() connecting to {:?}", info);

        let client = match redis::Client::open(info) {
            Ok(c) => c,
            Err(e) => {
                return Err(format!("Error opening Redis connection: {e}"));
            }
        };

        let connection = match client.get_connection() {
            Ok(c) => c,
            Err(e) => Err(format!("Bus connect error: {e}"))?,
        };

        let address = ClientAddress::new(config.username(), config.domain().name());

        Ok(Bus {
            connection,
            address,
            error: false,
        })
    }

    /// Generates the Redis connection Info.
    fn connection_info(config: &conf::BusClient) -> Result<ConnectionInfo, String> {
        // Build the connection info by hand because it gives us more
        // flexibility/control than compiling a URL string.

        let redis_con = RedisConnectionInfo {
            db: 0,
            username: Some(config.username().to_string()),
            password: Some(config.password().to_string()),
        };

        let domain = config.domain();
        let con_addr = ConnectionAddr::Tcp(domain.name().to_string(), domain.port());

        Ok(ConnectionInfo {
            addr: con_addr,
            redis: redis_con,
        })
    }

    fn connection(&mut self) -> &mut redis::Connection {
        &mut self.connection
    }

    /// Returns at most one String pulled from the queue or None if the
    /// pop times out or is interrupted.
    ///
    /// The string will be a whole, unparsed JSON string.
    fn recv_one_chunk(
        &mut self,
        mut timeout: i32,
        recipient: &str,
    ) -> Result<Option<String>, String> {
        let value: String;

        if timeout == 0 {
            // non-blocking

            // LPOP returns a scalar response.
            value = match self.connection().lpop(recipient, None) {
                Ok(c) => c,
                Err(e) => match e.kind() {
                    redis::ErrorKind::TypeError => {
                        // Will read a Nil value when the queue is empty.
                        // That's OK.
                        return Ok(None);
                    }
                    _ => {
                        self.error = true;
                        return Err(format!("recv_one_chunk failed: {e}"));
                    }
                },
            };
        } else {
            // Blocking

            // BLPOP returns the name of the popped list and the value.
            if timeout < 0 {
                // Timeout 0 means block indefinitely in Redis.
                timeout = 0;
            }

            let mut resp: Vec<String> = match self.connection().blpop(recipient, timeout as usize)
            {
                Ok(r) => r,
                Err(e) => {
                    self.error = true;
                    return Err(format!("Redis list pop error: {e} recipient={recipient}"));
                }
            };

            if resp.len() > 1 {
                // resp = [key, value]
                value = resp.remove(1);
            } else {
                // No message received
                return Ok(None);
            }
        }

        log::trace!("recv_one_chunk() pulled from bus: {}", value);

        Ok(Some(value))
    }

    /// Returns at most one JSON value pulled from the queue or None if
    /// the list pop times out or the pop is interrupted by a signal.
    fn recv_one_value(
        &mut self,
        timeout: i32,
        recipient: &str,
    ) -> Result<Option<json::JsonValue>, String> {
        let json_string = match self.recv_one_chunk(timeout, recipient)? {
            Some(s) => s,
            None => {
                return Ok(None);
            }
        };

        log::trace!("{self} read json from the bus: {json_string}");

        match json::parse(&json_string) {
            Ok(json_val) => Ok(Some(json_val)),
            Err(err_msg) => Err(format!("Error parsing JSON: {:?}", err_msg)),
        }
    }

    /// Returns at most one JSON value pulled from the queue.
    ///
    /// Keeps trying until a value is returned or the timeout is exceeded.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Time in seconds to wait for a value.
    ///     A negative value means to block indefinitely.
    ///     0 means do not block.
    fn recv_json_value(
        &mut self,
        timeout: i32,
        recipient: &str,
    ) -> Result<Option<json::JsonValue>, String> {
        let mut option: Option<json::JsonValue>;

        if timeout == 0 {
            // See if any data is ready now
            return self.recv_one_value(timeout, recipient);
        } else if timeout < 0 {
            // Keep trying until we have a result.
            loop {
                option = self.recv_one_value(timeout, recipient)?;
                if let Some(_) = option {
                    return Ok(option);
                }
            }
        }

        // Keep trying until we have a result or exhaust the timeout.

        let mut seconds = timeout;

        while seconds > 0 {
            let now = time::SystemTime::now();

            option = self.recv_one_value(seconds, recipient)?;

            match option {
                None => {
                    seconds -= now.elapsed().unwrap().as_secs() as i32;
                    continue;
                }
                _ => return Ok(option),
            }
        }

        Ok(None)
    }
}

impl Transport for Bus {
    fn address(&self) -> &str {
        self.address.as_str()
    }

    /// Returns at most one Frame.
    ///
    /// Keeps trying until a frame arrives or the timeout is exceeded.
    fn recv(&mut self, timeout: i32, recipient: Option<&str>) -> Result<Option<Frame>, String> {
        let recipient = match recipient {
            Some(r) => r.to_string(),
            None => self.address.as_str().to_string(),
        };

        let json_op = self.recv_json_value(timeout, &recipient)?;

        if let Some(jv) = json_op {
            Ok(Frame::from_json_value(&jv))
        } else {
            Ok(None)
        }
    }

    /// Sends a Frame to its "to" address.
    fn send(&mut self, frame: &Frame) -> Result<(), String> {
        let recipient = frame.to().to_string();
        let json_str = frame.to_json_value().dump();

        log::trace!("send() writing chunk to={}: {}", recipient, json_str);

        let res: Result<i32, _> = self.connection().rpush(&recipient, json_str);

        if let Err(e) = res {
            self.error = true;
            return Err(format!("Error in send() {e}"));
        }

        Ok(())
    }

    fn connected(&mut self) -> bool {
        if self.error {
            return false;
        }

        redis::cmd("PING")
            .query::<String>(self.connection())
            .is_ok()
    }

    fn error(&self) -> bool {
        self.error
    }

    /// Remove all pending data from our endpoint queue.
    fn clear(&mut self) -> Result<(), String> {
        let stream = self.address.as_str().to_string(); // mut borrow
        let res: Result<i32, _> = self.connection().del(stream);

        if let Err(e) = res {
            return Err(format!("Error in queue clear(): {e}"));
        }

        Ok(())
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Bus {}", self.address.as_str())
    }
}

/// Every Bus instance has a unique address which will never be used
/// again.  When this bus instance is dropped, remove any remaining
/// messages destined for this address since otherwise they will linger.
impl Drop for Bus {
    /// Similar to clear() but avoids any logging / error reporting.
    fn drop(&mut self) {
        let stream = self.address.as_str().to_string();
        let res: Result<i32, _> = self.connection().del(&stream);
        res.ok();
    }
}
