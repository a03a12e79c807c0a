//! Scripted SMTP relay for exercising the real transport
//!
//! Replies are configured per command; every command received is recorded so
//! tests can assert on the exact conversation.
//!
//! ```rust,no_run
//! let server = MockSmtpServer::builder()
//!     .with_rcpt_to_response(550, "No such user")
//!     .build()
//!     .await?;
//! ```

use std::{fmt::Write, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// Command received by the mock relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    Auth(String),
    /// A client line sent in answer to an AUTH LOGIN challenge
    AuthResponse(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Everything sent between DATA and the terminating dot, as received
    MessageContent(String),
    Rset,
    Quit,
    StartTls,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct EhloResponse {
    code: u16,
    capabilities: Vec<String>,
}

impl EhloResponse {
    fn to_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.capabilities.len().saturating_sub(1);

        for (i, capability) in self.capabilities.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            let _ = write!(response, "{}{separator}{capability}\r\n", self.code);
        }

        response.into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_response: EhloResponse,
    helo_response: SmtpResponse,
    auth_response: SmtpResponse,
    /// Replies to `AUTH LOGIN`, the user name and the password in turn
    login_responses: [SmtpResponse; 3],
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    rset_response: SmtpResponse,
    quit_response: SmtpResponse,
    starttls_response: SmtpResponse,
    /// Stop answering once this many commands have been received
    hang_on_command: Option<usize>,
    /// Close the connection once this many commands have been received
    drop_after_commands: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_response: EhloResponse {
                code: 250,
                capabilities: vec!["localhost".to_string(), "AUTH PLAIN LOGIN".to_string()],
            },
            helo_response: SmtpResponse::new(250, "Hello"),
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            login_responses: [
                SmtpResponse::new(334, "VXNlcm5hbWU6"),
                SmtpResponse::new(334, "UGFzc3dvcmQ6"),
                SmtpResponse::new(235, "Authentication successful"),
            ],
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            rset_response: SmtpResponse::new(250, "Reset OK"),
            quit_response: SmtpResponse::new(221, "Bye"),
            starttls_response: SmtpResponse::new(502, "Command not implemented"),
            hang_on_command: None,
            drop_after_commands: None,
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    /// The message bodies received so far
    pub async fn messages(&self) -> Vec<String> {
        self.commands
            .read()
            .await
            .iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut received = 0;

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            if config.drop_after_commands.is_some_and(|limit| received >= limit) {
                return Ok(());
            }

            line.clear();
            let read = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await;
            let Ok(read) = read else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }
            received += 1;

            if config.hang_on_command.is_some_and(|index| received > index) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let command_line = line.trim_end().to_string();
            let (verb, argument) = command_line
                .split_once(' ')
                .unwrap_or((command_line.as_str(), ""));

            let (response, command) = match verb.to_uppercase().as_str() {
                "EHLO" => (
                    config.ehlo_response.to_bytes(),
                    SmtpCommand::Ehlo(argument.to_string()),
                ),
                "HELO" => (
                    config.helo_response.to_bytes(),
                    SmtpCommand::Helo(argument.to_string()),
                ),
                "AUTH" if argument.eq_ignore_ascii_case("LOGIN") => {
                    commands
                        .write()
                        .await
                        .push(SmtpCommand::Auth(argument.to_string()));

                    for (step, reply) in config.login_responses.iter().enumerate() {
                        if step > 0 {
                            line.clear();
                            if reader.read_line(&mut line).await? == 0 {
                                return Ok(());
                            }
                            commands
                                .write()
                                .await
                                .push(SmtpCommand::AuthResponse(line.trim_end().to_string()));
                        }

                        writer.write_all(&reply.to_bytes()).await?;
                        writer.flush().await?;
                        if reply.code != 334 {
                            break;
                        }
                    }
                    continue;
                }
                "AUTH" => (
                    config.auth_response.to_bytes(),
                    SmtpCommand::Auth(argument.to_string()),
                ),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(argument.to_string()),
                ),
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    SmtpCommand::RcptTo(argument.to_string()),
                ),
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "RSET" => (config.rset_response.to_bytes(), SmtpCommand::Rset),
                "STARTTLS" => (config.starttls_response.to_bytes(), SmtpCommand::StartTls),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer.write_all(&config.quit_response.to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(command_line.clone()),
                ),
            };

            let reading_message =
                matches!(command, SmtpCommand::Data) && config.data_response.code == 354;
            commands.write().await.push(command);

            writer.write_all(&response).await?;
            writer.flush().await?;

            if reading_message {
                let mut content = String::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    if line == ".\r\n" {
                        break;
                    }
                    content.push_str(&line);
                }

                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                writer
                    .write_all(&config.data_end_response.to_bytes())
                    .await?;
                writer.flush().await?;
            }
        }
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: Vec<String>) -> Self {
        self.config.ehlo_response = EhloResponse { code, capabilities };
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    /// Reply to step `step` of AUTH LOGIN: 0 is the command itself, 1 the
    /// user name, 2 the password
    #[must_use]
    pub fn with_auth_login_response(
        mut self,
        step: usize,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        self.config.login_responses[step] = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = SmtpResponse::new(code, message);
        self
    }

    /// Stop answering after `index` commands have been answered
    #[must_use]
    pub const fn with_timeout_on_command(mut self, index: usize) -> Self {
        self.config.hang_on_command = Some(index);
        self
    }

    /// Close the connection after `count` commands have been answered
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Bind to a random local port and start answering
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));

        let handle = {
            let commands = Arc::clone(&commands);
            tokio::spawn(async move {
                while let Ok((stream, _peer)) = listener.accept().await {
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands);
                    tokio::spawn(async move {
                        let _ = MockSmtpServer::handle_client(stream, config, commands).await;
                    });
                }
            })
        };

        Ok(MockSmtpServer {
            addr,
            commands,
            handle,
        })
    }
}
