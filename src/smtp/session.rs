//! SMTP session state management

use crate::smtp::error::{SmtpError, SmtpLimits};

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Initial state - waiting for HELO/EHLO
    Initial,
    /// HELO received - ready for MAIL command
    GreetingReceived,
    /// MAIL FROM received - ready for RCPT commands
    MailReceived,
    /// At least one RCPT TO received - ready for DATA or more RCPT commands
    RecipientsReceived,
    /// DATA command received - collecting message lines
    DataMode,
}

/// Outcome of feeding one line to a session in data mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLine {
    /// More lines are expected
    Pending,
    /// The terminating "." line was seen
    Complete,
}

/// A finished mail transaction, ready to be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub from: String,
    pub to: Vec<String>,
    /// Dot-unstuffed payload with the original line endings
    pub data: Vec<u8>,
}

impl Transaction {
    /// Recipients in the form stored on an email
    pub fn recipients(&self) -> String {
        self.to.join(", ")
    }
}

/// Manages the state and data for a single SMTP session
#[derive(Debug)]
pub struct SmtpSession {
    /// Current state of the session
    pub state: SmtpState,
    /// Sender address from MAIL FROM command
    pub from: Option<String>,
    /// List of recipients from RCPT TO commands
    pub to: Vec<String>,
    /// Message payload collected during DATA mode
    pub data: Vec<u8>,
    /// Set when the payload grew past the size limit
    pub data_overflow: bool,
    /// Client domain from HELO command
    pub client_domain: Option<String>,
}

impl SmtpSession {
    /// Create a new SMTP session
    pub fn new() -> Self {
        Self {
            state: SmtpState::Initial,
            from: None,
            to: Vec::new(),
            data: Vec::new(),
            data_overflow: false,
            client_domain: None,
        }
    }

    /// Reset the session to post-HELO state (clears transaction data)
    pub fn reset(&mut self) {
        self.state = SmtpState::GreetingReceived;
        self.from = None;
        self.to.clear();
        self.data.clear();
        self.data_overflow = false;
        // Keep client_domain as it's set by HELO
    }

    /// Whether incoming lines belong to a message payload
    pub fn in_data_mode(&self) -> bool {
        self.state == SmtpState::DataMode
    }

    /// Set the sender address
    pub fn set_sender(&mut self, sender: String) -> Result<(), SmtpError> {
        if sender.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        self.from = Some(sender);
        self.to.clear();
        self.data.clear();
        self.state = SmtpState::MailReceived;
        Ok(())
    }

    /// Add a recipient address
    pub fn add_recipient(&mut self, recipient: String) -> Result<(), SmtpError> {
        if recipient.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        if self.to.len() >= SmtpLimits::MAX_RECIPIENTS {
            return Err(SmtpError::TooManyRecipients {
                max: SmtpLimits::MAX_RECIPIENTS,
            });
        }

        self.to.push(recipient);
        self.state = SmtpState::RecipientsReceived;
        Ok(())
    }

    /// Start data collection mode
    pub fn start_data_mode(&mut self) -> Result<(), SmtpError> {
        if self.state != SmtpState::RecipientsReceived {
            return Err(SmtpError::InvalidState(
                "DATA command requires RCPT first".to_string(),
            ));
        }

        self.data.clear();
        self.data_overflow = false;
        self.state = SmtpState::DataMode;
        Ok(())
    }

    /// Add a raw line, line ending included, during data collection
    ///
    /// A line holding only "." ends the message. Any other line starting
    /// with "." has that dot removed.
    pub fn add_data_line(&mut self, line: &[u8]) -> DataLine {
        let content = match line.strip_suffix(b"\n") {
            Some(content) => content.strip_suffix(b"\r").unwrap_or(content),
            None => line,
        };
        if content == b"." {
            return DataLine::Complete;
        }

        let line = line.strip_prefix(b".").unwrap_or(line);
        if self.data.len() + line.len() > SmtpLimits::MAX_DATA_SIZE {
            // Keep consuming until the terminator so the dialogue stays in step.
            self.data_overflow = true;
        } else if !self.data_overflow {
            self.data.extend_from_slice(line);
        }

        DataLine::Pending
    }

    /// Finish data collection and hand over the transaction
    ///
    /// The session is ready for the next MAIL command afterwards, whether or
    /// not the message was accepted.
    pub fn finish_data_collection(&mut self) -> Result<Transaction, SmtpError> {
        if !self.in_data_mode() {
            return Err(SmtpError::InvalidState(
                "Not in data collection mode".to_string(),
            ));
        }

        let overflow = self.data_overflow;
        let transaction = Transaction {
            from: self.from.take().unwrap_or_default(),
            to: std::mem::take(&mut self.to),
            data: std::mem::take(&mut self.data),
        };
        self.reset();

        if overflow {
            return Err(SmtpError::TooMuchData {
                max: SmtpLimits::MAX_DATA_SIZE,
            });
        }
        Ok(transaction)
    }

    /// Set the client domain from HELO command
    pub fn set_client_domain(&mut self, domain: String) -> Result<(), SmtpError> {
        if domain.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
            return Err(SmtpError::DomainTooLong {
                max: SmtpLimits::DOMAIN_MAX_LENGTH,
            });
        }

        self.client_domain = Some(domain);
        self.reset(); // Clear any existing transaction
        Ok(())
    }

    /// Check if the session is ready for a specific command
    pub fn can_execute_command(&self, command: &str) -> bool {
        match command.to_uppercase().as_str() {
            "HELO" | "EHLO" => true, // Can be sent at any time
            "MAIL" => self.state == SmtpState::GreetingReceived,
            "RCPT" => {
                self.state == SmtpState::MailReceived || self.state == SmtpState::RecipientsReceived
            }
            "DATA" => self.state == SmtpState::RecipientsReceived,
            "RSET" => self.state != SmtpState::Initial,
            "NOOP" => true, // NOOP can be sent at any time
            "QUIT" => true, // QUIT can be sent at any time
            _ => false,
        }
    }
}

impl Default for SmtpSession {
    fn default() -> Self {
        Self::new()
    }
}
