use std::fmt;

use crate::utils::error::ProtocolError;

/// Placeholder topic carried by PORT requests.
pub const PORT_TOPIC: &str = "-";

/// Longest topic the u16 length field can carry, in bytes.
pub const MAX_TOPIC_LEN: usize = u16::MAX as usize;

/// The closed set of commands a broker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Pub,
    Sub,
    Unsub,
    Port,
}

impl CommandCode {
    pub fn as_byte(self) -> u8 {
        match self {
            CommandCode::Pub => 1,
            CommandCode::Sub => 2,
            CommandCode::Unsub => 3,
            CommandCode::Port => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            1 => Ok(CommandCode::Pub),
            2 => Ok(CommandCode::Sub),
            3 => Ok(CommandCode::Unsub),
            4 => Ok(CommandCode::Port),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandCode::Pub => "PUB",
            CommandCode::Sub => "SUB",
            CommandCode::Unsub => "UNSUB",
            CommandCode::Port => "PORT",
        };
        f.write_str(name)
    }
}

/// Outcome of a request, as reported by the responding side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Ok,
    Err,
}

impl Resolution {
    fn as_byte(self) -> u8 {
        match self {
            Resolution::Ok => 0,
            Resolution::Err => 1,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0 => Ok(Resolution::Ok),
            1 => Ok(Resolution::Err),
            other => Err(ProtocolError::UnknownResolution(other)),
        }
    }
}

/// A request sent to the broker, or a delivery pushed by the broker to a
/// subscriber.
///
/// Body layout: `[code u8][topic_len u16 BE][topic][data]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub code: CommandCode,
    pub topic: String,
    pub data: Vec<u8>,
}

impl Command {
    pub fn new(code: CommandCode, topic: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            topic: topic.into(),
            data: data.into(),
        }
    }

    /// Requests a dedicated client port.
    pub fn port() -> Self {
        Self::new(CommandCode::Port, PORT_TOPIC, Vec::new())
    }

    pub fn subscribe(topic: &str, port: u16) -> Self {
        Self::new(CommandCode::Sub, topic, port.to_string())
    }

    pub fn unsubscribe(topic: &str, port: u16) -> Self {
        Self::new(CommandCode::Unsub, topic, port.to_string())
    }

    pub fn publish(topic: &str, data: impl Into<Vec<u8>>) -> Self {
        Self::new(CommandCode::Pub, topic, data)
    }

    /// Parses the subscriber port that SUB and UNSUB carry as ASCII digits.
    pub fn port_argument(&self) -> Result<u16, ProtocolError> {
        parse_port(&self.data)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_command(self.code, &self.topic, &self.data)
    }
}

/// The answer to a [`Command`].
///
/// Body layout: `[resolution u8][code u8][topic_len u16 BE][topic][data]`.
/// A code byte of `0` means the request could not be identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub resolution: Resolution,
    pub code: Option<CommandCode>,
    pub topic: String,
    pub data: Vec<u8>,
}

impl Response {
    pub fn ok(code: CommandCode, topic: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            resolution: Resolution::Ok,
            code: Some(code),
            topic: topic.into(),
            data: data.into(),
        }
    }

    pub fn err(code: CommandCode, topic: impl Into<String>, reason: &str) -> Self {
        Self {
            resolution: Resolution::Err,
            code: Some(code),
            topic: topic.into(),
            data: reason.as_bytes().to_vec(),
        }
    }

    /// Sent before closing a connection whose frame could not be decoded.
    pub fn invalid_message() -> Self {
        Self {
            resolution: Resolution::Err,
            code: None,
            topic: String::new(),
            data: b"invalid message".to_vec(),
        }
    }

    /// A successful PORT answer; the port travels in the topic field.
    pub fn allocated_port(port: u16) -> Self {
        Self::ok(CommandCode::Port, port.to_string(), Vec::new())
    }

    pub fn is_ok(&self) -> bool {
        self.resolution == Resolution::Ok
    }

    /// Human readable reason carried by an ERR response.
    pub fn reason(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Parses the port number of a PORT answer.
    pub fn port(&self) -> Result<u16, ProtocolError> {
        parse_port(self.topic.as_bytes())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_response(self.resolution, self.code, &self.topic, &self.data)
    }
}

pub fn encode_command(
    code: CommandCode,
    topic: &str,
    data: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let mut frame = Vec::with_capacity(3 + topic.len() + data.len());
    frame.push(code.as_byte());
    put_topic(&mut frame, topic)?;
    frame.extend_from_slice(data);
    Ok(frame)
}

pub fn decode_command(frame: &[u8]) -> Result<Command, ProtocolError> {
    let (&code, rest) = frame.split_first().ok_or(ProtocolError::Truncated)?;
    let code = CommandCode::from_byte(code)?;
    let (topic, data) = take_topic(rest)?;
    Ok(Command {
        code,
        topic,
        data: data.to_vec(),
    })
}

pub fn encode_response(
    resolution: Resolution,
    code: Option<CommandCode>,
    topic: &str,
    data: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let mut frame = Vec::with_capacity(4 + topic.len() + data.len());
    frame.push(resolution.as_byte());
    frame.push(code.map_or(0, CommandCode::as_byte));
    put_topic(&mut frame, topic)?;
    frame.extend_from_slice(data);
    Ok(frame)
}

pub fn decode_response(frame: &[u8]) -> Result<Response, ProtocolError> {
    let [resolution, code, rest @ ..] = frame else {
        return Err(ProtocolError::Truncated);
    };
    let resolution = Resolution::from_byte(*resolution)?;
    let code = match code {
        0 => None,
        byte => Some(CommandCode::from_byte(*byte)?),
    };
    let (topic, data) = take_topic(rest)?;
    Ok(Response {
        resolution,
        code,
        topic,
        data: data.to_vec(),
    })
}

fn put_topic(frame: &mut Vec<u8>, topic: &str) -> Result<(), ProtocolError> {
    let len = u16::try_from(topic.len()).map_err(|_| ProtocolError::TopicTooLong(topic.len()))?;
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(topic.as_bytes());
    Ok(())
}

fn take_topic(buf: &[u8]) -> Result<(String, &[u8]), ProtocolError> {
    let [hi, lo, rest @ ..] = buf else {
        return Err(ProtocolError::Truncated);
    };
    let len = u16::from_be_bytes([*hi, *lo]) as usize;
    if rest.len() < len {
        return Err(ProtocolError::Truncated);
    }
    let (topic, data) = rest.split_at(len);
    let topic = std::str::from_utf8(topic)?.to_string();
    Ok((topic, data))
}

fn parse_port(digits: &[u8]) -> Result<u16, ProtocolError> {
    let text = String::from_utf8_lossy(digits);
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidPort(text.into_owned()));
    }
    text.parse()
        .map_err(|_| ProtocolError::InvalidPort(text.into_owned()))
}
