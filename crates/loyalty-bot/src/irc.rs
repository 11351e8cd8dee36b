//! Minimal Twitch IRC client: authenticate, join, read PRIVMSG, write PRIVMSG.

use std::io;

use anyhow::anyhow;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, split};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use loyalty_types::chat::ChatMessage;

use crate::dispatcher::ChatSink;

pub const DEFAULT_HOST: &str = "irc.chat.twitch.tv";
pub const DEFAULT_PORT: u16 = 6667;

/// One parsed IRC line: `[@tags] [:prefix] COMMAND params [:trailing]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    pub tags: Option<String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl IrcLine {
    pub fn parse(line: &str) -> Self {
        let mut rest = line.trim();
        let mut tags = None;
        let mut prefix = None;

        if let Some(tagged) = rest.strip_prefix('@') {
            let (t, r) = tagged.split_once(' ').unwrap_or((tagged, ""));
            tags = Some(t.to_string());
            rest = r;
        }

        if let Some(prefixed) = rest.strip_prefix(':') {
            let (p, r) = prefixed.split_once(' ').unwrap_or((prefixed, ""));
            prefix = Some(p.to_string());
            rest = r;
        }

        let (command, rest) = rest.split_once(' ').unwrap_or((rest, ""));

        let (middle, trailing) = if let Some(t) = rest.strip_prefix(':') {
            ("", Some(t.to_string()))
        } else if let Some((m, t)) = rest.split_once(" :") {
            (m, Some(t.to_string()))
        } else {
            (rest, None)
        };

        Self {
            tags,
            prefix,
            command: command.to_uppercase(),
            params: middle.split_whitespace().map(str::to_string).collect(),
            trailing,
        }
    }

    /// Value of `key` in the tag section, e.g. `display-name`.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_deref()?.split(';').find_map(|kv| {
            let (k, v) = kv.split_once('=').unwrap_or((kv, ""));
            (k == key).then_some(v)
        })
    }

    /// Nickname from a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split_once('!').map_or(prefix, |(nick, _)| nick))
    }

    pub fn to_chat_message(&self) -> Option<ChatMessage> {
        if self.command != "PRIVMSG" {
            return None;
        }
        let channel = self.params.first()?;
        let login = self.nick()?;
        let text = self.trailing.as_deref().unwrap_or_default();

        let msg = ChatMessage::new(channel, login, text);
        Some(match self.tag("display-name") {
            Some(display_name) => msg.with_display_name(display_name),
            None => msg,
        })
    }
}

/// `#channel`, lower-cased.
pub fn normalize_channel(channel: &str) -> String {
    let name = channel.trim().trim_start_matches('#').to_lowercase();
    format!("#{}", name)
}

fn pass_token(token: &str) -> String {
    if token.starts_with("oauth:") {
        token.to_string()
    } else {
        format!("oauth:{}", token)
    }
}

/// Cloneable writer side of the connection.
#[derive(Clone)]
pub struct IrcHandle {
    raw_outgoing: mpsc::UnboundedSender<String>,
}

impl IrcHandle {
    pub fn send_raw_line(&self, line: &str) -> anyhow::Result<()> {
        self.raw_outgoing
            .send(line.to_string())
            .map_err(|_| anyhow!("IRC connection closed"))
    }

    pub fn join_channel(&self, channel: &str) -> anyhow::Result<()> {
        self.send_raw_line(&format!("JOIN {}", normalize_channel(channel)))
    }

    pub fn send_privmsg(&self, channel: &str, message: &str) -> anyhow::Result<()> {
        // A line break in the text would start a new IRC command
        let message = message.replace(['\r', '\n'], " ");
        self.send_raw_line(&format!("PRIVMSG {} :{}", channel, message))
    }
}

impl ChatSink for IrcHandle {
    fn send(&self, channel: &str, text: &str) -> anyhow::Result<()> {
        self.send_privmsg(channel, text)
    }
}

pub struct IrcClient {
    handle: IrcHandle,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

impl IrcClient {
    /// Connect over TCP and log in. Incoming chat lines arrive on the
    /// returned receiver until the connection drops.
    pub async fn connect(
        host: &str,
        port: u16,
        nick: &str,
        oauth_token: &str,
    ) -> io::Result<(Self, mpsc::UnboundedReceiver<ChatMessage>)> {
        let tcp = TcpStream::connect((host, port)).await.map_err(|e| {
            io::Error::new(e.kind(), format!("TCP connect to {}:{} failed: {}", host, port, e))
        })?;
        info!("Connected to {}:{}", host, port);
        Ok(Self::from_stream(tcp, nick, oauth_token))
    }

    pub fn from_stream<S>(
        stream: S,
        nick: &str,
        oauth_token: &str,
    ) -> (Self, mpsc::UnboundedReceiver<ChatMessage>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = split(stream);

        let (tx_outgoing, rx_outgoing) = mpsc::unbounded_channel::<String>();
        let (tx_incoming, rx_incoming) = mpsc::unbounded_channel::<ChatMessage>();

        let write_task = tokio::spawn(writer_loop(write_half, rx_outgoing));

        // Sent before the reader starts so login always goes out first
        let _ = tx_outgoing.send(format!("PASS {}", pass_token(oauth_token)));
        let _ = tx_outgoing.send(format!("NICK {}", nick.to_lowercase()));
        let _ = tx_outgoing.send("CAP REQ :twitch.tv/tags twitch.tv/commands".to_string());

        let read_task = tokio::spawn(reader_loop(read_half, tx_incoming, tx_outgoing.clone()));

        let client = Self {
            handle: IrcHandle {
                raw_outgoing: tx_outgoing,
            },
            read_task,
            write_task,
        };
        (client, rx_incoming)
    }

    pub fn handle(&self) -> IrcHandle {
        self.handle.clone()
    }

    pub fn shutdown(self) {
        self.read_task.abort();
        self.write_task.abort();
    }
}

async fn reader_loop<R>(
    read_half: R,
    tx_incoming: mpsc::UnboundedSender<ChatMessage>,
    tx_outgoing: mpsc::UnboundedSender<String>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(read_half);
    let mut line_buffer = String::new();

    loop {
        line_buffer.clear();
        match reader.read_line(&mut line_buffer).await {
            Ok(0) => {
                info!("IRC connection closed by server");
                break;
            }
            Ok(_) => {
                let line = line_buffer.trim_end();
                if line.is_empty() {
                    continue;
                }
                debug!("<< {}", line);

                let parsed = IrcLine::parse(line);
                match parsed.command.as_str() {
                    "PING" => {
                        let token = parsed.trailing.as_deref().unwrap_or("tmi.twitch.tv");
                        let _ = tx_outgoing.send(format!("PONG :{}", token));
                    }
                    "PRIVMSG" => {
                        if let Some(msg) = parsed.to_chat_message() {
                            if tx_incoming.send(msg).is_err() {
                                break;
                            }
                        }
                    }
                    "001" => info!("Logged in to chat"),
                    "JOIN" => {
                        if let Some(ch) = parsed.params.first() {
                            debug!("{} joined {}", parsed.nick().unwrap_or("?"), ch);
                        }
                    }
                    "NOTICE" | "RECONNECT" => {
                        warn!("{}: {}", parsed.command, parsed.trailing.as_deref().unwrap_or(""));
                    }
                    _ => {}
                }
            }
            Err(e) => {
                error!("IRC read error: {}", e);
                break;
            }
        }
    }
}

async fn writer_loop<W>(write_half: W, mut rx_outgoing: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(write_half);

    while let Some(line) = rx_outgoing.recv().await {
        if line.starts_with("PASS ") {
            debug!(">> PASS ***");
        } else {
            debug!(">> {}", line);
        }

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\r\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            error!("IRC write error: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[test]
    fn test_parse_privmsg_with_tags() {
        let line = "@badge-info=;display-name=Alice;user-id=1234 :alice!alice@alice.tmi.twitch.tv PRIVMSG #stream :!cheer100 hype";
        let parsed = IrcLine::parse(line);
        assert_eq!(parsed.command, "PRIVMSG");
        assert_eq!(parsed.params, vec!["#stream"]);
        assert_eq!(parsed.trailing.as_deref(), Some("!cheer100 hype"));
        assert_eq!(parsed.tag("display-name"), Some("Alice"));
        assert_eq!(parsed.tag("badge-info"), Some(""));
        assert_eq!(parsed.tag("missing"), None);
        assert_eq!(parsed.nick(), Some("alice"));

        let msg = parsed.to_chat_message().unwrap();
        assert_eq!(msg.channel, "#stream");
        assert_eq!(msg.login, "alice");
        assert_eq!(msg.display_name, "Alice");
        assert_eq!(msg.text, "!cheer100 hype");
    }

    #[test]
    fn test_parse_ping_and_numeric() {
        let ping = IrcLine::parse("PING :tmi.twitch.tv");
        assert_eq!(ping.command, "PING");
        assert!(ping.params.is_empty());
        assert_eq!(ping.trailing.as_deref(), Some("tmi.twitch.tv"));

        let welcome = IrcLine::parse(":tmi.twitch.tv 001 loyaltybot :Welcome, GLHF!");
        assert_eq!(welcome.prefix.as_deref(), Some("tmi.twitch.tv"));
        assert_eq!(welcome.command, "001");
        assert_eq!(welcome.params, vec!["loyaltybot"]);
        assert_eq!(welcome.trailing.as_deref(), Some("Welcome, GLHF!"));
        assert!(welcome.to_chat_message().is_none());
    }

    #[test]
    fn test_privmsg_without_display_name_uses_login() {
        let parsed = IrcLine::parse(":Bob!bob@bob.tmi.twitch.tv PRIVMSG #stream :!me");
        let msg = parsed.to_chat_message().unwrap();
        assert_eq!(msg.login, "bob");
        assert_eq!(msg.display_name, "Bob");
    }

    #[test]
    fn test_normalize_channel_and_token() {
        assert_eq!(normalize_channel("SomeStreamer"), "#somestreamer");
        assert_eq!(normalize_channel("#somestreamer"), "#somestreamer");
        assert_eq!(pass_token("abc"), "oauth:abc");
        assert_eq!(pass_token("oauth:abc"), "oauth:abc");
    }

    #[tokio::test]
    async fn test_session_over_stream() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let (client, mut incoming) = IrcClient::from_stream(client_side, "LoyaltyBot", "secret");
        let handle = client.handle();

        let (server_read, mut server_write) = tokio::io::split(server_side);
        let mut server_lines = BufReader::new(server_read).lines();

        assert_eq!(server_lines.next_line().await.unwrap().unwrap(), "PASS oauth:secret");
        assert_eq!(server_lines.next_line().await.unwrap().unwrap(), "NICK loyaltybot");
        assert!(server_lines.next_line().await.unwrap().unwrap().starts_with("CAP REQ"));

        handle.join_channel("Stream").unwrap();
        assert_eq!(server_lines.next_line().await.unwrap().unwrap(), "JOIN #stream");

        server_write.write_all(b"PING :tmi.twitch.tv\r\n").await.unwrap();
        assert_eq!(server_lines.next_line().await.unwrap().unwrap(), "PONG :tmi.twitch.tv");

        server_write
            .write_all(b"@display-name=Alice :alice!alice@alice.tmi.twitch.tv PRIVMSG #stream :!stats\r\n")
            .await
            .unwrap();
        let msg = incoming.recv().await.unwrap();
        assert_eq!(msg.login, "alice");
        assert_eq!(msg.text, "!stats");

        handle.send("#stream", "line one\nline two").unwrap();
        assert_eq!(
            server_lines.next_line().await.unwrap().unwrap(),
            "PRIVMSG #stream :line one line two"
        );

        drop(server_write);
        drop(server_lines);
        assert!(incoming.recv().await.is_none());
        client.shutdown();
    }
}
