///! Settings Client Module
///
use super::client::Client;
use super::jsonpath;
use super::util;
use std::sync::Arc;

const SETTINGS_TIMEOUT: i32 = 10;
const SETTINGS_SERVICE: &str = "busrpc.settings";
const SETTINGS_METHOD: &str = "busrpc.settings.host_config.get";

pub struct SettingsClient;

impl SettingsClient {
    /// Fetch the host config for our host.
    ///
    /// If force is set, it is passed to the settings service to
    /// override any caching.
    pub fn get_host_settings(client: &Client, force: bool) -> Result<HostSettings, String> {
        let ses = client.session(SETTINGS_SERVICE);

        let mut req = ses.request(
            SETTINGS_METHOD,
            vec![
                json::from(client.config().hostname()),
                json::from(force),
            ],
        )?;

        if let Some(s) = req.recv_with_timeout(SETTINGS_TIMEOUT)? {
            Ok(HostSettings { settings: s })
        } else {
            Err(format!("Settings service returned no response"))
        }
    }
}

/// Read-only wrapper around a JSON blob of server setting values,
/// which provides accessor methods for pulling setting values.
pub struct HostSettings {
    settings: json::JsonValue,
}

impl HostSettings {
    /// Wrap an already-fetched settings tree.
    pub fn from_value(settings: json::JsonValue) -> HostSettings {
        HostSettings { settings }
    }

    /// Returns the full host settings config as a JsonValue.
    pub fn settings(&self) -> &json::JsonValue {
        &self.settings
    }

    /// Returns the first value at the specified slash path, e.g.
    /// "apps/busrpc.settings/unix_config/max_children".
    ///
    /// Missing paths yield JsonValue::Null.
    pub fn value(&self, slashpath: &str) -> json::JsonValue {
        jsonpath::find(&self.settings, slashpath)
            .into_iter()
            .next()
            .unwrap_or(json::JsonValue::Null)
    }

    /// True if the service is configured as stateless.
    ///
    /// An absent or non-numeric flag means stateful.
    pub fn stateless(&self, service: &str) -> bool {
        match util::json_isize(&self.value(&format!("apps/{service}/stateless"))) {
            Some(n) => n != 0,
            None => false,
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
