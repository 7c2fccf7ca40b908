//! Listener configuration

use std::time::Duration;

/// Where and how an [`SmtpListener`](crate::SmtpListener) listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Address to bind
    pub host: String,
    /// Port to bind; 0 picks an ephemeral port
    pub port: u16,
    /// Name announced in the greeting and HELO/EHLO replies
    pub hostname: String,
    /// How long the accept loop may take to notice a stop request
    pub accept_poll_interval: Duration,
}

impl ListenerConfig {
    /// Port used when none is given
    pub const DEFAULT_PORT: u16 = 1616;

    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    /// The `host:port` string handed to bind
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: Self::DEFAULT_PORT,
            hostname: "smtplistener.local".to_owned(),
            accept_poll_interval: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ListenerConfig::default();
        assert_eq!(config.port, 1616);
        assert_eq!(config.bind_addr(), "127.0.0.1:1616");
        assert_eq!(config.hostname, "smtplistener.local");
    }

    #[test]
    fn test_builder() {
        let config = ListenerConfig::new(2525)
            .with_host("::1")
            .with_hostname("mx.test");

        assert_eq!(config.bind_addr(), "[::1]:2525");
        assert_eq!(config.hostname, "mx.test");
        assert_eq!(config.with_port(0).port, 0);
    }
}
