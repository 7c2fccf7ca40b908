//! # SMTP Listener
//!
//! An embeddable SMTP receiver for tests that need to check the email an
//! application sends.
//!
//! The listener accepts SMTP dialogues on a TCP port, rebuilds each message
//! and keeps the most recently received one for the test to inspect.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smtplistener::SmtpListener;
//! use std::thread;
//! use std::time::Duration;
//!
//! let listener = SmtpListener::new(1616);
//! listener.start_listening().unwrap();
//!
//! // Application sends email to localhost:1616
//! // ...
//!
//! // Poll for the message with a bounded retry
//! let mut email = listener.last_email_received();
//! for _ in 0..10 {
//!     if email.is_some() {
//!         break;
//!     }
//!     thread::sleep(Duration::from_millis(50));
//!     email = listener.last_email_received();
//! }
//! if let Some(email) = email {
//!     println!("Received email from: {}", email.from());
//! }
//!
//! listener.stop_listening().unwrap();
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Identify the sender
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify the destination (multiple destinations are supported)
//! - `DATA` - Send the email body
//! - `RSET` - Reset the current transaction
//! - `NOOP` - Do nothing
//! - `QUIT` - Close connection
//!
//! ## What is kept
//!
//! Only the envelope sender and recipients, the `Subject` header and the
//! body survive. For MIME messages the body is the first plain text part;
//! attachments are discarded.
//!
//! ## Notes
//!
//! - Only the most recent message is kept. Messages delivered close together
//!   race, and only the last one to complete is visible.
//! - Runs in-memory only. Email persistence is not supported.
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.
//! - Mail relay is not supported.

mod smtp;

pub use smtp::{
    Email, EmailStore, ListenerConfig, ListenerError, MessageParser, SessionHandler, SmtpError,
    SmtpLimits, SmtpListener, SmtpResponse, SmtpSession, SmtpState,
};
