//! IMAP session over any `Read + Write` transport.
//!
//! Production sessions run over rustls; tests drive the same code with a
//! scripted in-memory stream. All calls are blocking; async callers go
//! through `spawn_blocking`.

use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use super::wire::{self, Response, Status};
use super::{PartSelector, RawMessage, SearchQuery, Uid, quote};
use crate::config::MailboxConfig;
use crate::error::MailboxError;

/// TLS transport used for real mail servers.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// An authenticated mailbox session.
///
/// Released on every exit path: `logout()` closes it explicitly, and
/// dropping an open session sends a best-effort `LOGOUT`.
pub struct MailboxSession<S: Read + Write> {
    reader: BufReader<S>,
    next_tag: u32,
    open: bool,
    selected: Option<String>,
}

impl<S: Read + Write> MailboxSession<S> {
    /// Read the server greeting and log in.
    pub fn handshake(
        stream: S,
        username: &str,
        password: &SecretString,
    ) -> Result<Self, MailboxError> {
        let mut session = Self {
            reader: BufReader::new(stream),
            next_tag: 1,
            open: false,
            selected: None,
        };

        let greeting = wire::read_response(&mut session.reader)?;
        let upper = greeting.text.to_ascii_uppercase();
        if upper.starts_with("* PREAUTH") {
            session.open = true;
            return Ok(session);
        }
        if !upper.starts_with("* OK") {
            return Err(MailboxError::Protocol {
                command: "greeting".into(),
                response: greeting.text,
            });
        }

        let login = format!(
            "LOGIN {} {}",
            quote(username),
            quote(password.expose_secret())
        );
        match session.command("LOGIN", &login) {
            Ok(_) => {}
            Err(MailboxError::Protocol { response, .. }) => {
                return Err(MailboxError::Auth {
                    username: username.to_string(),
                    reason: response,
                });
            }
            Err(e) => return Err(e),
        }
        session.open = true;
        debug!(username, "IMAP login succeeded");
        Ok(session)
    }

    /// Select a folder. Returns its message count when the server reports one.
    pub fn select(&mut self, mailbox: &str) -> Result<Option<u32>, MailboxError> {
        let untagged = self.command("SELECT", &format!("SELECT {}", quote(mailbox)))?;
        self.selected = Some(mailbox.to_string());
        let exists = untagged.iter().find_map(|r| {
            let mut words = r.text.strip_prefix("* ")?.split_whitespace();
            let count = words.next()?.parse().ok()?;
            words
                .next()
                .filter(|w| w.eq_ignore_ascii_case("EXISTS"))
                .map(|_| count)
        });
        Ok(exists)
    }

    /// Server-side search. UIDs come back ascending and de-duplicated.
    pub fn search(&mut self, query: &SearchQuery) -> Result<Vec<Uid>, MailboxError> {
        let criteria = query.to_criteria();
        let untagged = self.command("SEARCH", &format!("UID SEARCH {criteria}"))?;
        let mut uids: Vec<Uid> = untagged
            .iter()
            .filter_map(wire::parse_search)
            .flatten()
            .collect();
        uids.sort_unstable();
        uids.dedup();
        debug!(criteria = %criteria, count = uids.len(), "IMAP search complete");
        Ok(uids)
    }

    /// Fetch a UID set in one batched request.
    pub fn fetch(
        &mut self,
        uids: &[Uid],
        parts: PartSelector,
    ) -> Result<Vec<RawMessage>, MailboxError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let set = uid_set(uids);
        let untagged = self.command(
            "FETCH",
            &format!("UID FETCH {set} {}", parts.fetch_items()),
        )?;
        let messages: Vec<RawMessage> = untagged.iter().filter_map(wire::parse_fetch).collect();
        if messages.len() < uids.len() {
            warn!(
                requested = uids.len(),
                returned = messages.len(),
                "IMAP fetch returned fewer messages than requested"
            );
        }
        Ok(messages)
    }

    /// Flag messages `\Seen`.
    pub fn mark_seen(&mut self, uids: &[Uid]) -> Result<(), MailboxError> {
        if uids.is_empty() {
            return Ok(());
        }
        self.command(
            "STORE",
            &format!("UID STORE {} +FLAGS.SILENT (\\Seen)", uid_set(uids)),
        )?;
        Ok(())
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Close the session, reporting any error from the server.
    pub fn logout(mut self) -> Result<(), MailboxError> {
        self.open = false;
        self.command("LOGOUT", "LOGOUT").map(|_| ())
    }

    /// Send one tagged command and collect untagged responses until its
    /// completion. NO/BAD completions become `Protocol` errors.
    fn command(&mut self, verb: &str, line: &str) -> Result<Vec<Response>, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let stream = self.reader.get_mut();
        stream.write_all(format!("{tag} {line}\r\n").as_bytes())?;
        stream.flush()?;

        let mut untagged = Vec::new();
        loop {
            let response = wire::read_response(&mut self.reader)?;
            if let Some(status) = response.tagged_status(&tag) {
                return match status {
                    Status::Ok => Ok(untagged),
                    Status::No | Status::Bad => Err(MailboxError::Protocol {
                        command: verb.to_string(),
                        response: response.text,
                    }),
                };
            }
            if response.is_continuation() {
                return Err(MailboxError::Protocol {
                    command: verb.to_string(),
                    response: response.text,
                });
            }
            untagged.push(response);
        }
    }
}

impl<S: Read + Write> Drop for MailboxSession<S> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.command("LOGOUT", "LOGOUT") {
                debug!(error = %e, "LOGOUT on drop failed");
            }
        }
    }
}

/// Comma-separated UID set.
fn uid_set(uids: &[Uid]) -> String {
    uids.iter()
        .map(Uid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Open a TLS session, log in and select the configured folder.
pub fn connect(config: &MailboxConfig) -> Result<MailboxSession<TlsStream>, MailboxError> {
    let tcp = TcpStream::connect((config.host.as_str(), config.port))?;
    tcp.set_read_timeout(Some(config.read_timeout))?;
    tcp.set_write_timeout(Some(config.read_timeout))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| MailboxError::Tls(e.to_string()))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())
        .map_err(|e| MailboxError::Tls(e.to_string()))?;
    let conn = rustls::ClientConnection::new(Arc::new(tls_config), server_name)
        .map_err(|e| MailboxError::Tls(e.to_string()))?;
    let stream = rustls::StreamOwned::new(conn, tcp);

    let mut session = MailboxSession::handshake(stream, &config.username, &config.password)?;
    session.select(&config.mailbox)?;
    info!(host = %config.host, mailbox = %config.mailbox, "Mailbox session opened");
    Ok(session)
}

/// Search, then fetch whatever matched, sequentially on one session.
pub fn fetch_cycle<S: Read + Write>(
    session: &mut MailboxSession<S>,
    query: &SearchQuery,
) -> Result<Vec<RawMessage>, MailboxError> {
    let uids = session.search(query)?;
    if uids.is_empty() {
        return Ok(Vec::new());
    }
    session.fetch(&uids, PartSelector::Full)
}

/// One full connect → search → fetch → logout cycle.
pub fn fetch_batch(
    config: &MailboxConfig,
    query: &SearchQuery,
) -> Result<Vec<RawMessage>, MailboxError> {
    let mut session = connect(config)?;
    let messages = fetch_cycle(&mut session, query)?;
    if let Err(e) = session.logout() {
        debug!(error = %e, "LOGOUT failed after fetch");
    }
    Ok(messages)
}

/// Flag messages `\Seen` on a short-lived session of their own.
pub fn mark_seen(config: &MailboxConfig, uids: &[Uid]) -> Result<(), MailboxError> {
    if uids.is_empty() {
        return Ok(());
    }
    let mut session = connect(config)?;
    session.mark_seen(uids)?;
    session.logout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Replays a fixed server transcript and records what the client sent.
    struct ScriptedStream {
        server: Cursor<Vec<u8>>,
        sent: Arc<Mutex<Vec<u8>>>,
    }

    impl ScriptedStream {
        fn new(transcript: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    server: Cursor::new(transcript.to_vec()),
                    sent: Arc::clone(&sent),
                },
                sent,
            )
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.server.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.sent.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(sent.lock().unwrap().clone()).unwrap()
    }

    fn password() -> SecretString {
        SecretString::from("app-password".to_string())
    }

    #[test]
    fn login_select_search_fetch_logout() {
        let transcript = b"* OK IMAP4rev1 ready\r\n\
A1 OK LOGIN completed\r\n\
* 12 EXISTS\r\n\
A2 OK [READ-WRITE] SELECT completed\r\n\
* SEARCH 7 3\r\n\
A3 OK SEARCH completed\r\n\
* 1 FETCH (UID 3 FLAGS () BODY[] {16}\r\nSubject: a\r\n\r\nxy)\r\n\
* 2 FETCH (UID 7 FLAGS (\\Seen) BODY[] {16}\r\nSubject: b\r\n\r\nzw)\r\n\
A4 OK FETCH completed\r\n\
* BYE logging out\r\n\
A5 OK LOGOUT completed\r\n";
        let (stream, sent) = ScriptedStream::new(transcript);

        let mut session = MailboxSession::handshake(stream, "ops@example.com", &password()).unwrap();
        assert_eq!(session.select("INBOX").unwrap(), Some(12));
        assert_eq!(session.selected(), Some("INBOX"));

        let query = SearchQuery::new().from_sender("dispatch@vendor.example");
        let messages = fetch_cycle(&mut session, &query).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].uid, 3);
        assert_eq!(messages[1].uid, 7);
        assert!(messages[1].is_seen());
        session.logout().unwrap();

        let sent = sent_text(&sent);
        assert!(sent.contains("A1 LOGIN \"ops@example.com\" \"app-password\"\r\n"));
        assert!(sent.contains("A2 SELECT \"INBOX\"\r\n"));
        assert!(sent.contains("A3 UID SEARCH FROM \"dispatch@vendor.example\"\r\n"));
        // One batched fetch for the whole UID set, in ascending order.
        assert!(sent.contains("A4 UID FETCH 3,7 (UID FLAGS BODY.PEEK[])\r\n"));
        assert_eq!(sent.matches("FETCH").count(), 1);
        assert!(sent.contains("A5 LOGOUT\r\n"));
    }

    #[test]
    fn rejected_login_is_auth_error() {
        let transcript = b"* OK ready\r\nA1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n";
        let (stream, sent) = ScriptedStream::new(transcript);
        let err = MailboxSession::handshake(stream, "ops@example.com", &password())
            .err()
            .unwrap();
        assert!(matches!(err, MailboxError::Auth { .. }));
        // Never logged in, so nothing to release.
        assert!(!sent_text(&sent).contains("LOGOUT"));
    }

    #[test]
    fn dropped_connection_is_network_error() {
        let (stream, _) = ScriptedStream::new(b"* OK ready\r\n");
        let err = MailboxSession::handshake(stream, "u", &password()).err().unwrap();
        assert!(matches!(err, MailboxError::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn bye_greeting_is_rejected() {
        let (stream, _) = ScriptedStream::new(b"* BYE too many connections\r\n");
        let err = MailboxSession::handshake(stream, "u", &password()).err().unwrap();
        assert!(matches!(err, MailboxError::Protocol { .. }));
    }

    #[test]
    fn preauth_skips_login() {
        let (stream, sent) = ScriptedStream::new(b"* PREAUTH welcome\r\nA1 OK bye\r\n");
        let session = MailboxSession::handshake(stream, "u", &password()).unwrap();
        drop(session);
        let sent = sent_text(&sent);
        assert!(!sent.contains("LOGIN"));
        assert!(sent.contains("A1 LOGOUT"));
    }

    #[test]
    fn session_released_after_search_error() {
        let transcript = b"* OK ready\r\n\
A1 OK LOGIN completed\r\n\
A2 BAD Could not parse command\r\n\
A3 OK LOGOUT completed\r\n";
        let (stream, sent) = ScriptedStream::new(transcript);
        {
            let mut session = MailboxSession::handshake(stream, "u", &password()).unwrap();
            let err = session.search(&SearchQuery::new()).unwrap_err();
            assert!(matches!(err, MailboxError::Protocol { ref command, .. } if command == "SEARCH"));
        }
        assert!(sent_text(&sent).contains("A3 LOGOUT\r\n"));
    }

    #[test]
    fn empty_search_skips_fetch() {
        let transcript = b"* OK ready\r\n\
A1 OK LOGIN completed\r\n\
* SEARCH\r\n\
A2 OK SEARCH completed\r\n\
A3 OK LOGOUT completed\r\n";
        let (stream, sent) = ScriptedStream::new(transcript);
        let mut session = MailboxSession::handshake(stream, "u", &password()).unwrap();
        let messages = fetch_cycle(&mut session, &SearchQuery::new()).unwrap();
        assert!(messages.is_empty());
        session.logout().unwrap();
        assert!(!sent_text(&sent).contains("FETCH"));
    }

    #[test]
    fn mark_seen_uses_silent_store() {
        let transcript = b"* OK ready\r\nA1 OK LOGIN\r\nA2 OK STORE completed\r\nA3 OK LOGOUT\r\n";
        let (stream, sent) = ScriptedStream::new(transcript);
        let mut session = MailboxSession::handshake(stream, "u", &password()).unwrap();
        session.mark_seen(&[4, 9]).unwrap();
        session.logout().unwrap();
        assert!(sent_text(&sent).contains("A2 UID STORE 4,9 +FLAGS.SILENT (\\Seen)\r\n"));
    }

    #[test]
    fn uid_set_joins_with_commas() {
        assert_eq!(uid_set(&[1, 5, 9]), "1,5,9");
    }
}
