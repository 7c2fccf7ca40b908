//! End-to-end tests driving the listener over real sockets

use smtplistener::{Email, ListenerConfig, ListenerError, SmtpListener};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

/// Whether the port can be bound right now
fn available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Poll until the port is free again or the deadline passes
fn available_within(port: u16, deadline: Duration) -> bool {
    let start = Instant::now();
    loop {
        if available(port) {
            return true;
        }
        if start.elapsed() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn fetch_email(listener: &SmtpListener) -> Email {
    for _ in 0..20 {
        if let Some(email) = listener.last_email_received() {
            return email;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("no email received");
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        let mut client = Self { stream, reader };
        assert!(client.read_reply().starts_with("220"));
        client
    }

    fn read_reply(&mut self) -> String {
        let mut reply = String::new();
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).unwrap();
            reply.push_str(&line);
            if line.as_bytes().get(3) != Some(&b'-') {
                return reply;
            }
        }
    }

    fn send(&mut self, raw: &str) -> String {
        self.stream.write_all(raw.as_bytes()).unwrap();
        self.stream.flush().unwrap();
        self.read_reply()
    }

    fn command(&mut self, command: &str) -> String {
        self.send(&format!("{command}\r\n"))
    }

    /// Run MAIL/RCPT/DATA and send an already formatted message
    fn deliver(&mut self, from: &str, to: &[&str], message: &str) -> String {
        assert!(client_ok(&self.command(&format!("MAIL FROM:<{from}>"))));
        for recipient in to {
            assert!(client_ok(&self.command(&format!("RCPT TO:<{recipient}>"))));
        }
        assert!(self.command("DATA").starts_with("354"));
        self.send(&format!("{}.\r\n", dot_stuff(message)))
    }
}

fn client_ok(reply: &str) -> bool {
    reply.starts_with("250")
}

/// Escape lines starting with "." and make sure the payload ends in CRLF
fn dot_stuff(message: &str) -> String {
    let mut out = String::new();
    for line in message.split_inclusive("\r\n") {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    if !out.ends_with("\r\n") {
        out.push_str("\r\n");
    }
    out
}

fn format_message(email: &Email) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n\r\n{}",
        email.from(),
        email.to(),
        email.subject(),
        email.body()
    )
}

fn send(addr: SocketAddr, email: &Email) {
    let mut client = Client::connect(addr);
    assert!(client_ok(&client.command("EHLO client.local")));
    let reply = client.deliver(email.from(), &[email.to()], &format_message(email));
    assert!(client_ok(&reply), "{reply}");
    assert!(client.command("QUIT").starts_with("221"));
}

fn start_on(port: u16) -> SmtpListener {
    let listener = SmtpListener::new(port);
    listener.start_listening().unwrap();
    listener
}

#[test]
fn test_stop_listening_before_listening() {
    let listener = SmtpListener::new(1616);
    for _ in 0..2 {
        assert!(matches!(
            listener.stop_listening(),
            Err(ListenerError::NotListening)
        ));
    }
}

#[test]
fn test_uses_port() {
    assert!(available(1616));
    let listener = SmtpListener::default();
    listener.start_listening().unwrap();
    assert!(!available(1616));

    listener.stop_listening().unwrap();
    assert!(available_within(1616, Duration::from_millis(30)));
}

#[test]
fn test_second_listener_gets_bind_error() {
    let first = start_on(1620);
    let second = SmtpListener::new(1620);

    assert!(matches!(
        second.start_listening(),
        Err(ListenerError::Bind { .. })
    ));
    assert!(!second.is_listening());

    first.stop_listening().unwrap();
    second.start_listening().unwrap();
    second.stop_listening().unwrap();
}

#[test]
fn test_email_catch() {
    assert!(available(1617));
    let listener = start_on(1617);
    assert!(!available(1617));

    let to_send = Email::new(
        "sender@smtplistener",
        "root@smtplistener",
        "Subject",
        "Message body\r\nLine 2\r\nLine 3\r\n\
         . a line starting with a dot but not the end of message\r\n",
    );
    send(listener.local_addr().unwrap(), &to_send);

    assert!(!available(1617));
    let received = fetch_email(&listener);
    assert_eq!(received, to_send, "{received}\n{to_send}");

    listener.stop_listening().unwrap();
    assert!(available_within(1617, Duration::from_millis(30)));
}

#[test]
fn test_email_with_attachments_dropped() {
    let listener = start_on(1618);
    let addr = listener.local_addr().unwrap();

    let message = "From: sender@smtplistener\r\n\
                   To: root@smtplistener\r\n\
                   Subject: Subject\r\n\
                   MIME-Version: 1.0\r\n\
                   Content-Type: multipart/mixed;\r\n\
                   \tboundary=\"----=_Part_0_1234.5678\"\r\n\
                   \r\n\
                   ------=_Part_0_1234.5678\r\n\
                   Content-Type: text/plain; charset=us-ascii\r\n\
                   Content-Transfer-Encoding: 7bit\r\n\
                   \r\n\
                   Message body\r\n\
                   ------=_Part_0_1234.5678\r\n\
                   Content-Type: application/octet-stream; name=README.md\r\n\
                   Content-Transfer-Encoding: base64\r\n\
                   Content-Disposition: attachment; filename=README.md\r\n\
                   \r\n\
                   IyBSRUFETUUK\r\n\
                   ------=_Part_0_1234.5678--\r\n";

    let mut client = Client::connect(addr);
    client.command("HELO client.local");
    let reply = client.deliver("sender@smtplistener", &["root@smtplistener"], message);
    assert!(client_ok(&reply));
    client.command("QUIT");

    let received = fetch_email(&listener);
    assert_eq!(
        received,
        Email::new(
            "sender@smtplistener",
            "root@smtplistener",
            "Subject",
            "Message body"
        )
    );
    assert!(!received.body().contains("IyBSRUFETUUK"));

    listener.stop_listening().unwrap();
}

#[test]
fn test_sequential_deliveries_keep_the_last() {
    let listener = start_on(1619);
    let addr = listener.local_addr().unwrap();

    for i in 1..3 {
        let to_send = Email::new(
            format!("sender{i}@smtplistener"),
            "root@smtplistener",
            format!("Subject {i}"),
            format!("Message body{i}\r\n"),
        );
        send(addr, &to_send);
        assert_eq!(fetch_email(&listener), to_send);
    }

    listener.stop_listening().unwrap();
}

#[test]
fn test_concurrent_deliveries_store_one_complete_message() {
    let listener = SmtpListener::with_config(ListenerConfig::new(0));
    listener.start_listening().unwrap();
    let addr = listener.local_addr().unwrap();

    let sent: Vec<Email> = (0..5)
        .map(|i| {
            Email::new(
                format!("sender{i}@example.com"),
                format!("recipient{i}@example.com"),
                format!("Concurrent {i}"),
                format!("From client {i}\r\n"),
            )
        })
        .collect();

    let handles: Vec<_> = sent
        .iter()
        .cloned()
        .map(|email| thread::spawn(move || send(addr, &email)))
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let received = fetch_email(&listener);
    assert!(sent.contains(&received), "{received}");

    listener.stop_listening().unwrap();
}

#[test]
fn test_multiple_recipients() {
    let listener = SmtpListener::with_config(ListenerConfig::new(0));
    listener.start_listening().unwrap();

    let mut client = Client::connect(listener.local_addr().unwrap());
    client.command("HELO client.local");
    let reply = client.deliver(
        "sender@example.com",
        &["one@example.com", "two@example.com"],
        "Subject: Many\r\n\r\nHello all\r\n",
    );
    assert!(client_ok(&reply));
    client.command("QUIT");

    let received = fetch_email(&listener);
    assert_eq!(received.to(), "one@example.com, two@example.com");
    assert!(received.has_recipient("two@example.com"));
}

#[test]
fn test_bad_commands_are_rejected_without_closing() {
    let listener = SmtpListener::with_config(ListenerConfig::new(0));
    listener.start_listening().unwrap();

    let mut client = Client::connect(listener.local_addr().unwrap());
    assert!(client.command("RCPT TO:<root@example.com>").starts_with("503"));
    assert!(client.command("BOGUS").starts_with("500"));
    assert!(client_ok(&client.command("HELO client.local")));
    assert!(client.command("MAIL FROM:root").starts_with("501"));

    let reply = client.deliver(
        "sender@example.com",
        &["root@example.com"],
        "Subject: Still here\r\n\r\nok\r\n",
    );
    assert!(client_ok(&reply));
    assert_eq!(fetch_email(&listener).subject(), "Still here");
}

#[test]
fn test_non_utf8_input_handling() {
    let listener = SmtpListener::with_config(ListenerConfig::new(0));
    listener.start_listening().unwrap();
    let mut client = Client::connect(listener.local_addr().unwrap());

    client.stream.write_all(&[0xFF, 0xFE, 0xFD]).unwrap();
    let reply = client.send(" HELO client.local\r\n");
    assert!(reply.starts_with("500"));

    assert!(client_ok(&client.command("HELO client.local")));
    client.command("QUIT");
}

#[test]
fn test_listener_survives_broken_sessions() {
    let listener = SmtpListener::with_config(ListenerConfig::new(0));
    listener.start_listening().unwrap();
    let addr = listener.local_addr().unwrap();

    {
        let mut client = Client::connect(addr);
        client.command("HELO client.local");
        client.command("MAIL FROM:<sender@example.com>");
        client.command("RCPT TO:<root@example.com>");
        client.command("DATA");
        client.stream.write_all(b"Subject: Lost\r\n\r\nhalf a mess").unwrap();
    }

    let email = Email::new("a@example.com", "b@example.com", "Kept", "whole\r\n");
    send(addr, &email);
    assert_eq!(fetch_email(&listener), email);
    assert!(listener.is_listening());
}

#[test]
fn test_bounce_with_null_sender() {
    let listener = SmtpListener::with_config(ListenerConfig::new(0));
    listener.start_listening().unwrap();

    let mut client = Client::connect(listener.local_addr().unwrap());
    client.command("EHLO mailer-daemon.example.com");
    let reply = client.deliver(
        "",
        &["root@example.com"],
        "Subject: Undeliverable\r\n\r\nReturned mail\r\n",
    );
    assert!(client_ok(&reply), "{reply}");
    client.command("QUIT");

    let received = fetch_email(&listener);
    assert_eq!(
        received,
        Email::new("", "root@example.com", "Undeliverable", "Returned mail\r\n")
    );
}

#[test]
fn test_top_level_attachment_never_reaches_the_body() {
    let listener = SmtpListener::with_config(ListenerConfig::new(0));
    listener.start_listening().unwrap();

    let mut client = Client::connect(listener.local_addr().unwrap());
    client.command("HELO client.local");
    let reply = client.deliver(
        "sender@example.com",
        &["root@example.com"],
        "Subject: Payload\r\n\
         Content-Type: application/octet-stream\r\n\
         Content-Disposition: attachment; filename=payload.bin\r\n\
         Content-Transfer-Encoding: base64\r\n\
         \r\n\
         U0VDUkVUUEFZTE9BRA==\r\n",
    );
    assert!(client_ok(&reply));
    client.command("QUIT");

    let received = fetch_email(&listener);
    assert_eq!(received.subject(), "Payload");
    assert_eq!(received.body(), "");
}
