use smtplistener::{ListenerConfig, SmtpListener};
use std::env;
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let addr = if args.len() > 1 {
        args[1].as_str()
    } else {
        "127.0.0.1:1616"
    };

    let hostname = if args.len() > 2 {
        args[2].as_str()
    } else {
        "smtplistener.local"
    };

    let Some((host, port)) = addr.rsplit_once(':') else {
        error!(addr, "address must be host:port");
        std::process::exit(2);
    };
    let Ok(port) = port.parse::<u16>() else {
        error!(addr, "invalid port");
        std::process::exit(2);
    };

    let config = ListenerConfig::new(port)
        .with_host(host.trim_start_matches('[').trim_end_matches(']'))
        .with_hostname(hostname);
    let listener = SmtpListener::with_config(config);

    if let Err(e) = listener.start_listening() {
        error!(error = %e, "failed to start listener");
        std::process::exit(1);
    }

    let mut last = None;
    loop {
        if let Some(email) = listener.last_email_received() {
            if last.as_ref() != Some(&email) {
                info!(
                    from = email.from(),
                    to = email.to(),
                    subject = email.subject(),
                    "received email"
                );
                last = Some(email);
            }
        }
        thread::sleep(Duration::from_millis(100));
    }
}
