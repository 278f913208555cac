//! Line based wire protocol.
//!
//! Every datagram carries a single line framed as
//! `<senderCode>!<TYPE>#<senderNick>:<payload>`. Some message types carry a
//! structured payload built from delimited fields, such as
//! `(author)[time]text` for topics. Free text always comes last and is kept
//! verbatim.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::DecodeError;
use crate::types::PeerCode;

/// The closed set of message types understood by every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Logon,
    Logoff,
    Expose,
    Exposing,
    Nick,
    NickCrash,
    Away,
    Back,
    Msg,
    PrivMsg,
    Topic,
    GetTopic,
    Writing,
    StoppedWriting,
    Idle,
    Client,
    SendFile,
    SendFileAccept,
    SendFileAbort,
}

impl MessageType {
    pub const ALL: [MessageType; 19] = [
        MessageType::Logon,
        MessageType::Logoff,
        MessageType::Expose,
        MessageType::Exposing,
        MessageType::Nick,
        MessageType::NickCrash,
        MessageType::Away,
        MessageType::Back,
        MessageType::Msg,
        MessageType::PrivMsg,
        MessageType::Topic,
        MessageType::GetTopic,
        MessageType::Writing,
        MessageType::StoppedWriting,
        MessageType::Idle,
        MessageType::Client,
        MessageType::SendFile,
        MessageType::SendFileAccept,
        MessageType::SendFileAbort,
    ];

    /// The tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logon => "LOGON",
            Self::Logoff => "LOGOFF",
            Self::Expose => "EXPOSE",
            Self::Exposing => "EXPOSING",
            Self::Nick => "NICK",
            Self::NickCrash => "NICKCRASH",
            Self::Away => "AWAY",
            Self::Back => "BACK",
            Self::Msg => "MSG",
            Self::PrivMsg => "PRIVMSG",
            Self::Topic => "TOPIC",
            Self::GetTopic => "GETTOPIC",
            Self::Writing => "WRITING",
            Self::StoppedWriting => "STOPPEDWRITING",
            Self::Idle => "IDLE",
            Self::Client => "CLIENT",
            Self::SendFile => "SENDFILE",
            Self::SendFileAccept => "SENDFILEACCEPT",
            Self::SendFileAbort => "SENDFILEABORT",
        }
    }

    pub fn from_wire(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    /// Code of the peer that sent the line
    pub sender: PeerCode,
    /// Nick of the sender at the time of sending (the new nick for NICK)
    pub nick: String,
    pub body: MessageBody,
}

/// Type specific content of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Logon,
    Logoff,
    Expose,
    /// Answer to EXPOSE. An empty away message means the peer is not away.
    Exposing { away_message: String },
    /// Nick change, the new nick is in the header.
    Nick,
    /// Tells the owner of `nick` to pick another one.
    NickCrash { nick: String },
    Away { away_message: String },
    Back,
    Msg(ChatText),
    /// Private message, sent by unicast to `target`.
    PrivMsg { target: PeerCode, text: ChatText },
    Topic(TopicPayload),
    GetTopic,
    Writing,
    StoppedWriting,
    /// Heartbeat.
    Idle,
    Client(ClientInfo),
    SendFile(FileOffer),
    SendFileAccept(FileAccept),
    SendFileAbort(FileAbort),
}

/// Chat text with the sender's chosen color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatText {
    pub color: i32,
    pub text: String,
}

/// Topic assertion: `(author)[time]text`. Empty text removes the topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPayload {
    pub nick: String,
    /// Unix millis when the topic was set, used as a logical timestamp
    pub time: i64,
    pub text: String,
}

/// Client details: `(client)[millisSinceLogon]{os}<privateChatPort>` and an
/// optional `/tcpChatPort\` suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub client: String,
    pub millis_since_logon: i64,
    pub operating_system: String,
    /// 0 when the peer has no private chat
    pub private_chat_port: u16,
    pub tcp_chat_port: Option<u16>,
}

/// File offer: `(target)[size]{hash}name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOffer {
    pub target: PeerCode,
    pub size: u64,
    pub hash: i32,
    pub name: String,
}

/// File accept: `(target)[port]{hash}name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAccept {
    pub target: PeerCode,
    pub port: u16,
    pub hash: i32,
    pub name: String,
}

/// File abort: `(target){hash}name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAbort {
    pub target: PeerCode,
    pub hash: i32,
    pub name: String,
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Logon => MessageType::Logon,
            Self::Logoff => MessageType::Logoff,
            Self::Expose => MessageType::Expose,
            Self::Exposing { .. } => MessageType::Exposing,
            Self::Nick => MessageType::Nick,
            Self::NickCrash { .. } => MessageType::NickCrash,
            Self::Away { .. } => MessageType::Away,
            Self::Back => MessageType::Back,
            Self::Msg(_) => MessageType::Msg,
            Self::PrivMsg { .. } => MessageType::PrivMsg,
            Self::Topic(_) => MessageType::Topic,
            Self::GetTopic => MessageType::GetTopic,
            Self::Writing => MessageType::Writing,
            Self::StoppedWriting => MessageType::StoppedWriting,
            Self::Idle => MessageType::Idle,
            Self::Client(_) => MessageType::Client,
            Self::SendFile(_) => MessageType::SendFile,
            Self::SendFileAccept(_) => MessageType::SendFileAccept,
            Self::SendFileAbort(_) => MessageType::SendFileAbort,
        }
    }
}

impl WireMessage {
    pub fn new(sender: PeerCode, nick: impl Into<String>, body: MessageBody) -> Self {
        Self {
            sender,
            nick: nick.into(),
            body,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Encode to a single wire line.
    pub fn encode(&self) -> String {
        let mut line = format!(
            "{}!{}#{}:",
            self.sender,
            self.message_type().as_str(),
            self.nick
        );

        match &self.body {
            MessageBody::Logon
            | MessageBody::Logoff
            | MessageBody::Expose
            | MessageBody::Nick
            | MessageBody::Back
            | MessageBody::GetTopic
            | MessageBody::Writing
            | MessageBody::StoppedWriting
            | MessageBody::Idle => {}
            MessageBody::Exposing { away_message } | MessageBody::Away { away_message } => {
                line.push_str(away_message);
            }
            MessageBody::NickCrash { nick } => line.push_str(nick),
            MessageBody::Msg(text) => {
                line.push_str(&format!("[{}]{}", text.color, text.text));
            }
            MessageBody::PrivMsg { target, text } => {
                line.push_str(&format!("({})[{}]{}", target, text.color, text.text));
            }
            MessageBody::Topic(topic) => {
                line.push_str(&format!("({})[{}]{}", topic.nick, topic.time, topic.text));
            }
            MessageBody::Client(info) => {
                line.push_str(&format!(
                    "({})[{}]{{{}}}<{}>",
                    info.client, info.millis_since_logon, info.operating_system, info.private_chat_port
                ));
                if let Some(tcp_port) = info.tcp_chat_port {
                    line.push_str(&format!("/{}\\", tcp_port));
                }
            }
            MessageBody::SendFile(offer) => {
                line.push_str(&format!(
                    "({})[{}]{{{}}}{}",
                    offer.target, offer.size, offer.hash, offer.name
                ));
            }
            MessageBody::SendFileAccept(accept) => {
                line.push_str(&format!(
                    "({})[{}]{{{}}}{}",
                    accept.target, accept.port, accept.hash, accept.name
                ));
            }
            MessageBody::SendFileAbort(abort) => {
                line.push_str(&format!("({}){{{}}}{}", abort.target, abort.hash, abort.name));
            }
        }

        line
    }

    /// Decode a single wire line.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let exclamation = line.find('!').ok_or(DecodeError::MissingFraming)?;
        let hash = line.find('#').ok_or(DecodeError::MissingFraming)?;
        let colon = line.find(':').ok_or(DecodeError::MissingFraming)?;

        if !(exclamation < hash && hash < colon) {
            return Err(DecodeError::MissingFraming);
        }

        let code = &line[..exclamation];
        let sender = code
            .parse::<PeerCode>()
            .map_err(|_| DecodeError::InvalidCode(code.to_string()))?;

        let tag = &line[exclamation + 1..hash];
        let message_type =
            MessageType::from_wire(tag).ok_or_else(|| DecodeError::UnknownType(tag.to_string()))?;

        let nick = &line[hash + 1..colon];
        let payload = &line[colon + 1..];

        let body = decode_body(message_type, payload, line)?;

        Ok(Self {
            sender,
            nick: nick.to_string(),
            body,
        })
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn decode_body(
    message_type: MessageType,
    payload: &str,
    line: &str,
) -> Result<MessageBody, DecodeError> {
    let mut fields = Fields::new(payload);

    let body = match message_type {
        MessageType::Logon => MessageBody::Logon,
        MessageType::Logoff => MessageBody::Logoff,
        MessageType::Expose => MessageBody::Expose,
        MessageType::Exposing => MessageBody::Exposing {
            away_message: payload.to_string(),
        },
        MessageType::Nick => MessageBody::Nick,
        MessageType::NickCrash => MessageBody::NickCrash {
            nick: payload.to_string(),
        },
        MessageType::Away => MessageBody::Away {
            away_message: payload.to_string(),
        },
        MessageType::Back => MessageBody::Back,
        MessageType::Msg => {
            let color = parse_field(fields.enclosed('[', ']', "color")?, "color")?;
            MessageBody::Msg(ChatText {
                color,
                text: fields.rest().to_string(),
            })
        }
        MessageType::PrivMsg => {
            let target = parse_field(fields.enclosed('(', ')', "target")?, "target")?;
            let color = parse_field(fields.enclosed('[', ']', "color")?, "color")?;
            MessageBody::PrivMsg {
                target,
                text: ChatText {
                    color,
                    text: fields.rest().to_string(),
                },
            }
        }
        MessageType::Topic => {
            let nick = fields.enclosed('(', ')', "author")?.to_string();
            let time = parse_field(fields.enclosed('[', ']', "time")?, "time")?;
            MessageBody::Topic(TopicPayload {
                nick,
                time,
                text: fields.rest().to_string(),
            })
        }
        MessageType::GetTopic => MessageBody::GetTopic,
        MessageType::Writing => MessageBody::Writing,
        MessageType::StoppedWriting => MessageBody::StoppedWriting,
        MessageType::Idle => MessageBody::Idle,
        MessageType::Client => MessageBody::Client(decode_client(&mut fields, line)?),
        MessageType::SendFile => {
            let target = parse_field(fields.enclosed('(', ')', "target")?, "target")?;
            let size = parse_field(fields.enclosed('[', ']', "size")?, "size")?;
            let hash = parse_field(fields.enclosed('{', '}', "hash")?, "hash")?;
            MessageBody::SendFile(FileOffer {
                target,
                size,
                hash,
                name: fields.rest().to_string(),
            })
        }
        MessageType::SendFileAccept => {
            let target = parse_field(fields.enclosed('(', ')', "target")?, "target")?;
            let port = parse_field(fields.enclosed('[', ']', "port")?, "port")?;
            let hash = parse_field(fields.enclosed('{', '}', "hash")?, "hash")?;
            MessageBody::SendFileAccept(FileAccept {
                target,
                port,
                hash,
                name: fields.rest().to_string(),
            })
        }
        MessageType::SendFileAbort => {
            let target = parse_field(fields.enclosed('(', ')', "target")?, "target")?;
            let hash = parse_field(fields.enclosed('{', '}', "hash")?, "hash")?;
            MessageBody::SendFileAbort(FileAbort {
                target,
                hash,
                name: fields.rest().to_string(),
            })
        }
    };

    Ok(body)
}

/// CLIENT carries a few optional numbers. A broken number is logged and left
/// at its default so the rest of the details still apply.
fn decode_client(fields: &mut Fields<'_>, line: &str) -> Result<ClientInfo, DecodeError> {
    let client = fields.enclosed('(', ')', "client")?.to_string();
    let elapsed = fields.enclosed('[', ']', "millis_since_logon")?;
    let operating_system = fields.enclosed('{', '}', "operating_system")?.to_string();

    let millis_since_logon = elapsed.parse::<i64>().unwrap_or_else(|_| {
        warn!(value = %elapsed, line = %line, "Failed to parse time since logon");
        0
    });

    let private_chat_port = match fields.enclosed('<', '>', "private_chat_port") {
        Ok(value) => value.parse::<u16>().unwrap_or_else(|_| {
            warn!(value = %value, line = %line, "Failed to parse private chat port");
            0
        }),
        Err(_) => {
            warn!(line = %line, "Missing private chat port");
            0
        }
    };

    let tcp_chat_port = match fields.enclosed('/', '\\', "tcp_chat_port") {
        Ok(value) => match value.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                warn!(value = %value, line = %line, "Failed to parse tcp chat port");
                None
            }
        },
        Err(_) => None,
    };

    Ok(ClientInfo {
        client,
        millis_since_logon,
        operating_system,
        private_chat_port,
        tcp_chat_port,
    })
}

fn parse_field<T: FromStr>(value: &str, field: &'static str) -> Result<T, DecodeError> {
    value.parse::<T>().map_err(|_| DecodeError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// Cursor over the delimited fields of a payload.
struct Fields<'a> {
    payload: &'a str,
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(payload: &'a str) -> Self {
        Self { payload, pos: 0 }
    }

    /// The next value between `open` and `close`, searching from the cursor.
    fn enclosed(
        &mut self,
        open: char,
        close: char,
        field: &'static str,
    ) -> Result<&'a str, DecodeError> {
        let rest = &self.payload[self.pos..];
        let start = rest.find(open).ok_or(DecodeError::MissingField(field))? + open.len_utf8();
        let len = rest[start..]
            .find(close)
            .ok_or(DecodeError::MissingField(field))?;

        self.pos += start + len + close.len_utf8();
        Ok(&rest[start..start + len])
    }

    /// Everything after the last consumed field.
    fn rest(&self) -> &'a str {
        &self.payload[self.pos..]
    }
}
