//! SMTP listener implementation

pub mod commands;
pub mod config;
pub mod email;
pub mod error;
pub mod handler;
pub mod listener;
pub mod parser;
pub mod response;
pub mod session;
pub mod store;

pub use config::ListenerConfig;
pub use email::Email;
pub use error::{ListenerError, SmtpError, SmtpLimits};
pub use handler::SessionHandler;
pub use listener::SmtpListener;
pub use parser::MessageParser;
pub use response::SmtpResponse;
pub use session::{SmtpSession, SmtpState};
pub use store::EmailStore;
