//! Acknowledgement decisions and their mapping to response packets.

use std::{collections::BTreeSet, fmt, str::FromStr};

use super::ConnectionError;
use crate::codec::{ConnectReturnCode, QoS, SubackCode};

/// Action an acknowledgement answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Answer a connect request.
    Connect,
    /// Answer a subscribe request.
    Subscribe,
    /// Answer an unsubscribe request.
    Unsubscribe,
    /// Answer a publish.
    Publish,
}

impl Action {
    /// Lowercase action name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Action {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connect" => Ok(Self::Connect),
            "subscribe" => Ok(Self::Subscribe),
            "unsubscribe" => Ok(Self::Unsubscribe),
            "publish" => Ok(Self::Publish),
            other => Err(ConnectionError::UnsupportedAction(other.to_owned())),
        }
    }
}

/// Application decision passed to [`Connection::ack`](super::Connection::ack).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Answer a CONNECT with a CONNACK.
    Connect(ConnectAck),
    /// Answer a SUBSCRIBE with a SUBACK.
    Subscribe(SubscribeAck),
    /// Answer an UNSUBSCRIBE with an UNSUBACK.
    Unsubscribe(UnsubscribeAck),
    /// Answer a PUBLISH according to its QoS.
    Publish(PublishAck),
}

impl Ack {
    /// The action this acknowledgement answers.
    #[must_use]
    pub const fn action(&self) -> Action {
        match self {
            Self::Connect(_) => Action::Connect,
            Self::Subscribe(_) => Action::Subscribe,
            Self::Unsubscribe(_) => Action::Unsubscribe,
            Self::Publish(_) => Action::Publish,
        }
    }
}

impl From<ConnectAck> for Ack {
    fn from(value: ConnectAck) -> Self { Self::Connect(value) }
}

/// Connect decision.
///
/// The flags resolve to a single return code; see [`ConnectAck::return_code`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAck {
    /// Explicit return code.
    pub return_code: Option<ConnectReturnCode>,
    /// Failure raised while handling the connect.
    pub error: Option<String>,
    /// `false` refuses the client as not authorized.
    pub authorized: bool,
    /// Refuse the client as not authorized.
    pub reject: bool,
    /// Refuse the client for bad credentials.
    pub bad_credentials: bool,
}

impl Default for ConnectAck {
    fn default() -> Self {
        Self {
            return_code: None,
            error: None,
            authorized: true,
            reject: false,
            bad_credentials: false,
        }
    }
}

impl ConnectAck {
    /// Set an explicit return code.
    #[must_use]
    pub const fn with_return_code(mut self, code: ConnectReturnCode) -> Self {
        self.return_code = Some(code);
        self
    }

    /// Record a failure raised while handling the connect.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Refuse the client as not authorized.
    #[must_use]
    pub const fn unauthorized(mut self) -> Self {
        self.authorized = false;
        self
    }

    /// Refuse the client as not authorized.
    #[must_use]
    pub const fn rejected(mut self) -> Self {
        self.reject = true;
        self
    }

    /// Refuse the client for a bad username or password.
    #[must_use]
    pub const fn with_bad_credentials(mut self) -> Self {
        self.bad_credentials = true;
        self
    }

    /// Resolve the flags into the CONNACK return code.
    ///
    /// Precedence, highest first: bad credentials (4), not authorized or
    /// rejected (5), error (the explicit code when non-zero, else 2), explicit
    /// code, accepted (0).
    #[must_use]
    pub fn return_code(&self) -> ConnectReturnCode {
        let explicit = self
            .return_code
            .filter(|code| *code != ConnectReturnCode::Accepted);
        let mut code = explicit.unwrap_or_default();
        if self.error.is_some() {
            code = explicit.unwrap_or(ConnectReturnCode::IdentifierRejected);
        }
        if !self.authorized || self.reject {
            code = ConnectReturnCode::NotAuthorized;
        }
        if self.bad_credentials {
            code = ConnectReturnCode::BadUsernameOrPassword;
        }
        code
    }
}

/// Subscribe decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeAck {
    /// Identifier of the SUBSCRIBE being answered.
    pub message_id: u16,
    /// QoS requested by each subscription entry, in request order.
    pub requested: Vec<QoS>,
    /// Positions of entries answered with a failure code.
    pub refused: BTreeSet<usize>,
    /// `false` grants nothing.
    pub authorized: bool,
}

impl SubscribeAck {
    /// Answer the entry at `index` with a failure code.
    #[must_use]
    pub fn refuse(mut self, index: usize) -> Self {
        self.refused.insert(index);
        self
    }

    /// Codes the SUBACK will carry.
    #[must_use]
    pub fn granted(&self) -> Vec<SubackCode> {
        if !self.authorized {
            return Vec::new();
        }
        self.requested
            .iter()
            .enumerate()
            .map(|(index, qos)| {
                if self.refused.contains(&index) {
                    SubackCode::Failure
                } else {
                    SubackCode::Granted(*qos)
                }
            })
            .collect()
    }
}

/// Unsubscribe acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeAck {
    /// Identifier of the UNSUBSCRIBE being answered.
    pub message_id: u16,
}

/// Publish acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishAck {
    /// Identifier of the PUBLISH being answered; required for QoS 1 and 2.
    pub message_id: Option<u16>,
    /// QoS deciding the response: none, PUBACK, or PUBREC.
    pub qos: QoS,
}
