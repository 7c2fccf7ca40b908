//! Email data structures and functionality

use std::fmt;

/// An email message as reconstructed by the listener
///
/// Two emails are equal when sender, recipient, subject and body are all
/// byte-for-byte equal, line endings included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email {
    from: String,
    to: String,
    subject: String,
    body: String,
}

impl Email {
    /// Create a new email
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// The envelope sender given in `MAIL FROM`
    pub fn from(&self) -> &str {
        &self.from
    }

    /// The envelope recipient given in `RCPT TO`
    ///
    /// Several recipients are joined with `", "`.
    pub fn to(&self) -> &str {
        &self.to
    }

    /// The decoded `Subject` header, empty when the message had none
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The message body with its original line endings
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Check if this email was sent to a specific recipient
    pub fn has_recipient(&self, recipient: &str) -> bool {
        self.to.split(", ").any(|addr| addr == recipient)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Email[from={}, to={}, subject={}, body={:?}]",
            self.from, self.to, self.subject, self.body
        )
    }
}
