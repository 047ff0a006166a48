//! Client configuration.
//!
//! Construction is programmatic (builder-style); reading environment
//! variables or files is the embedding application's concern.

use std::time::Duration;

/// Device identity fields sent with every request.
///
/// These mirror what the mobile app reports about the handset; the service
/// ties sessions and push credentials to `imei_md5`.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub ostype: String,
    pub imei: String,
    pub mac: String,
    pub model: String,
    pub sdk: String,
    pub mod_name: String,
    pub imei_md5: String,
    pub device_type: String,
    pub network_type: String,
    pub os_type: String,
    pub os_version: String,
    pub mobile_brand: String,
    pub mobile_model: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            ostype: "and".into(),
            imei: "DEVICE0123456".into(),
            mac: "00:00:00:00:00:00".into(),
            model: "POCO F1".into(),
            sdk: "35".into(),
            mod_name: "Xiaomi".into(),
            imei_md5: "00000000000000000000000000000000".into(),
            device_type: "0".into(),
            network_type: "wifi".into(),
            os_type: "15".into(),
            os_version: "35".into(),
            mobile_brand: "XIAOMI".into(),
            mobile_model: "POCO F1".into(),
        }
    }
}

/// Core client configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub username: String,
    pub password: String,
    /// 6-digit remote control PIN; hashed with MD5 before transmission.
    pub control_pin: Option<String>,
    pub base_url: String,
    pub country_code: String,
    pub language: String,
    pub time_zone: String,
    pub app_version: String,
    pub app_inner_version: String,
    pub soft_type: String,
    pub tbox_version: String,
    pub is_auto: String,
    pub user_agent: String,
    pub http_timeout: Duration,
    pub session_ttl: Duration,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    pub mqtt_enabled: bool,
    pub mqtt_keepalive: Duration,
    /// How long a command waits for a push-delivered result before falling
    /// back to HTTP polling.
    pub mqtt_timeout: Duration,
    pub device: DeviceIdentity,
}

impl CoreConfig {
    /// Configuration with service defaults for the given account.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            control_pin: None,
            base_url: "https://dilinkappoversea-eu.byd.auto".into(),
            country_code: "NL".into(),
            language: "en".into(),
            time_zone: "Europe/Amsterdam".into(),
            app_version: "3.2.2".into(),
            app_inner_version: "322".into(),
            soft_type: "0".into(),
            tbox_version: "3".into(),
            is_auto: "1".into(),
            user_agent: "okhttp/4.12.0".into(),
            http_timeout: Duration::from_secs(30),
            session_ttl: Duration::from_secs(12 * 60 * 60),
            poll_attempts: 10,
            poll_interval: Duration::from_millis(1500),
            mqtt_enabled: true,
            mqtt_keepalive: Duration::from_secs(120),
            mqtt_timeout: Duration::from_secs(10),
            device: DeviceIdentity::default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_control_pin(mut self, pin: impl Into<String>) -> Self {
        self.control_pin = Some(pin.into());
        self
    }

    #[must_use]
    pub fn with_country(mut self, country_code: impl Into<String>, language: impl Into<String>) -> Self {
        self.country_code = country_code.into();
        self.language = language.into();
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: DeviceIdentity) -> Self {
        self.device = device;
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_mqtt_enabled(mut self, enabled: bool) -> Self {
        self.mqtt_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_mqtt_timeout(mut self, timeout: Duration) -> Self {
        self.mqtt_timeout = timeout;
        self
    }
}
