//! Per-connection SMTP dialogue

use crate::smtp::commands::SmtpCommandHandler;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::parser::MessageParser;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::{DataLine, SmtpSession};
use crate::smtp::store::EmailStore;

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use tracing::{debug, trace};

/// Drives one SMTP connection from greeting to QUIT
///
/// Completed messages are parsed and written to the shared store before the
/// client sees the 250 reply.
#[derive(Debug)]
pub struct SessionHandler {
    hostname: Arc<str>,
    store: Arc<EmailStore>,
}

impl SessionHandler {
    pub fn new(hostname: Arc<str>, store: Arc<EmailStore>) -> Self {
        Self { hostname, store }
    }

    /// Run the dialogue until the client quits or the connection drops
    pub fn handle(&self, mut stream: TcpStream) -> Result<(), SmtpError> {
        let command_handler = SmtpCommandHandler::new(&self.hostname);
        let mut session = SmtpSession::new();
        let mut reader = BufReader::new(stream.try_clone()?);

        self.send_response(&mut stream, &SmtpResponse::greeting(&self.hostname))?;

        let mut line_buffer = Vec::new();
        loop {
            let limit = if session.in_data_mode() {
                SmtpLimits::MAX_DATA_SIZE
            } else {
                SmtpLimits::COMMAND_LINE_MAX_LENGTH
            };

            match read_line(&mut reader, &mut line_buffer, limit)? {
                // Connection closed
                LineRead::Eof => break,
                LineRead::Line => {}
                LineRead::TooLong if session.in_data_mode() => {
                    debug!(max = limit, "data line over the size limit");
                    session.data_overflow = true;
                    continue;
                }
                LineRead::TooLong => {
                    let error = SmtpError::LineTooLong { max: limit };
                    debug!(error = %error, "rejected command");
                    self.send_response(&mut stream, &SmtpResponse::error(&error))?;
                    continue;
                }
            }

            if session.in_data_mode() {
                if session.add_data_line(&line_buffer) == DataLine::Complete {
                    let response = self.finish_message(&mut session);
                    self.send_response(&mut stream, &response)?;
                }
                continue;
            }

            // Invalid UTF-8 turns into an unknown command rather than an error.
            let line = String::from_utf8_lossy(&line_buffer);
            let command = line.trim();
            if command.is_empty() {
                continue;
            }
            trace!(command, "received command");

            let response = match command_handler.process_command(command, &mut session) {
                Ok(response) => response,
                Err(e) => {
                    debug!(command, error = %e, "rejected command");
                    SmtpResponse::error(&e)
                }
            };
            self.send_response(&mut stream, &response)?;

            if response.is_closing() {
                break;
            }
        }

        Ok(())
    }

    fn finish_message(&self, session: &mut SmtpSession) -> SmtpResponse {
        match session.finish_data_collection() {
            Ok(transaction) => {
                let recipients = transaction.recipients();
                let email =
                    MessageParser::new(&transaction.from, &recipients).parse(&transaction.data);
                debug!(
                    from = email.from(),
                    to = email.to(),
                    subject = email.subject(),
                    "message accepted"
                );
                self.store.set(email);
                SmtpResponse::message_accepted()
            }
            Err(e) => {
                debug!(error = %e, "message rejected");
                SmtpResponse::error(&e)
            }
        }
    }

    /// Send a response to the client
    fn send_response(
        &self,
        stream: &mut TcpStream,
        response: &SmtpResponse,
    ) -> Result<(), SmtpError> {
        let formatted = response.format();
        trace!(response = formatted.trim_end(), "sending response");

        if formatted.len() > SmtpLimits::REPLY_LINE_MAX_LENGTH && response.multiline.is_none() {
            let truncated_response =
                SmtpResponse::new(&response.code, "Response too long (truncated)");
            stream.write_all(truncated_response.format().as_bytes())?;
        } else {
            stream.write_all(formatted.as_bytes())?;
        }
        stream.flush()?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Eof,
    Line,
    /// More than the limit arrived without a line feed; the rest of the line
    /// has been discarded
    TooLong,
}

/// Read one LF-terminated line into `buf`, buffering at most `limit` bytes
fn read_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> io::Result<LineRead> {
    buf.clear();
    if reader.by_ref().take(limit as u64).read_until(b'\n', buf)? == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.ends_with(b"\n") || buf.len() < limit {
        return Ok(LineRead::Line);
    }

    buf.clear();
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            break;
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                break;
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
    Ok(LineRead::TooLong)
}
