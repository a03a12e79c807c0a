//! SMTP client connection with STARTTLS and AUTH support.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};
use tracing::{trace, warn};

use crate::{
    Response,
    error::{ClientError, Result},
};

/// Initial size of the read buffer for SMTP replies.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

enum Connection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, server: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::Tls("Connection is already TLS".to_string()));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            root_store
                .add(cert)
                .map_err(|e| ClientError::Tls(format!("Failed to add certificate: {e}")))?;
        }
        if !certs.errors.is_empty() {
            warn!(errors = ?certs.errors, "Some certificates could not be loaded");
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if accept_invalid_certs {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        let server_name = ServerName::try_from(server.to_string())
            .map_err(|e| ClientError::Tls(format!("Invalid server name: {e}")))?;

        let stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::Tls(e.to_string()))?;

        Ok(Self::Tls(Box::new(stream)))
    }
}

/// Accepts every certificate. Only installed when invalid certificates are
/// explicitly allowed.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}

/// Prepare a message for the DATA phase
///
/// Line endings become CRLF, lines starting with `.` get a second one, and
/// the result always ends with CRLF so the terminating `.` sits on its own
/// line.
#[must_use]
pub fn dot_stuff(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + message.len() / 32 + 2);
    let mut chars = message.chars().peekable();
    let mut line_start = true;

    while let Some(c) = chars.next() {
        if line_start && c == '.' {
            out.push('.');
        }

        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
                line_start = true;
            }
            '\n' => {
                out.push_str("\r\n");
                line_start = true;
            }
            c => {
                out.push(c);
                line_start = false;
            }
        }
    }

    if !line_start {
        out.push_str("\r\n");
    }

    out
}

/// A connection to one SMTP relay.
///
/// Every command method returns the relay's reply as-is; deciding whether a
/// reply is acceptable is left to the caller (see [`Response::ensure_success`]).
/// The AUTH methods are the exception, since they span several exchanges.
pub struct SmtpClient {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Connect to `addr`. `server` is the name checked against the relay's
    /// certificate after STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, server: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            connection: Some(Connection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server: server.into(),
            accept_invalid_certs: false,
        })
    }

    /// Sets whether to accept invalid TLS certificates.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(Connection::Tls(_)))
    }

    /// Reads the initial server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        trace!(command, "C:");
        self.write_line(command).await
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(format!("{line}\r\n").as_bytes())
            .await
    }

    /// Like [`Self::command`], without tracing the line sent
    async fn credentials(&mut self, line: &str) -> Result<Response> {
        trace!("C: <credentials>");
        self.write_line(line).await?;
        self.read_response().await
    }

    /// Sends a raw command and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// Sends STARTTLS and, if the relay agrees, upgrades the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;
            self.buffer_pos = 0;
            self.connection = Some(
                connection
                    .upgrade_to_tls(&self.server, self.accept_invalid_certs)
                    .await?,
            );
        }

        Ok(response)
    }

    /// AUTH PLAIN with an initial response
    ///
    /// # Errors
    ///
    /// A refused exchange is reported as [`ClientError::Authentication`].
    pub async fn auth_plain(&mut self, user: &str, password: &str) -> Result<Response> {
        let token = STANDARD.encode(format!("\0{user}\0{password}"));
        let response = self.credentials(&format!("AUTH PLAIN {token}")).await?;
        Self::auth_outcome(response)
    }

    /// AUTH LOGIN, sending the user name and password in turn
    ///
    /// # Errors
    ///
    /// A refused exchange is reported as [`ClientError::Authentication`].
    pub async fn auth_login(&mut self, user: &str, password: &str) -> Result<Response> {
        let challenge = self.command("AUTH LOGIN").await?;
        Self::auth_continue(challenge)?;

        let challenge = self.credentials(&STANDARD.encode(user)).await?;
        Self::auth_continue(challenge)?;

        let response = self.credentials(&STANDARD.encode(password)).await?;
        Self::auth_outcome(response)
    }

    /// A step in the middle of an AUTH exchange must be answered with 3xx
    fn auth_continue(response: Response) -> Result<Response> {
        if response.is_intermediate() {
            Ok(response)
        } else {
            Err(ClientError::Authentication(response))
        }
    }

    fn auth_outcome(response: Response) -> Result<Response> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::Authentication(response))
        }
    }

    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the dot-stuffed message followed by the end-of-data marker.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn send_data(&mut self, message: &str) -> Result<Response> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;

        connection.send(dot_stuff(message).as_bytes()).await?;
        connection.send(b".\r\n").await?;

        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn rset(&mut self) -> Result<Response> {
        self.command("RSET").await
    }

    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                trace!(%response, "S:");
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::Parse(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_stuff_escapes_leading_dots() {
        assert_eq!(
            dot_stuff("Subject: x\r\n\r\n.hidden\r\nnot.this\r\n.\r\n"),
            "Subject: x\r\n\r\n..hidden\r\nnot.this\r\n..\r\n"
        );
        assert_eq!(dot_stuff(".first"), "..first\r\n");
    }

    #[test]
    fn test_dot_stuff_normalises_line_endings() {
        assert_eq!(dot_stuff("a\nb\rc\r\nd"), "a\r\nb\r\nc\r\nd\r\n");
        assert_eq!(dot_stuff("done\n"), "done\r\n");
        assert_eq!(dot_stuff(""), "");
    }

    #[test]
    fn test_refused_auth_steps_are_authentication_failures() {
        let unsupported = Response::new(504, vec!["Unrecognized authentication type".to_string()]);
        assert!(matches!(
            SmtpClient::auth_continue(unsupported),
            Err(ClientError::Authentication(response)) if response.code == 504
        ));

        let challenge = Response::new(334, vec!["VXNlcm5hbWU6".to_string()]);
        assert!(SmtpClient::auth_continue(challenge).is_ok());

        let busy = Response::new(454, vec!["Temporary authentication failure".to_string()]);
        assert!(matches!(
            SmtpClient::auth_outcome(busy),
            Err(ClientError::Authentication(_))
        ));
    }
}
