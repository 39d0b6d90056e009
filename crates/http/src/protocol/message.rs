use bytes::Bytes;

/// One unit travelling through the codec: a message head or a piece of its
/// payload.
#[derive(Debug)]
pub enum Message<H> {
    /// The head section (request line / status line plus headers)
    Head(H),
    /// A chunk of payload data or the end-of-payload marker
    Payload(PayloadItem),
}

impl<H> Message<H> {
    #[inline]
    pub fn is_head(&self) -> bool {
        matches!(self, Message::Head(_))
    }

    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }
}

/// An item in a payload stream: each chunk is yielded once, followed by a
/// single `Eof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    Chunk(Bytes),
    Eof,
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// How an outgoing request body will be framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Known length, sent with `Content-Length`
    Length(u64),
    /// Unknown length, sent with `Transfer-Encoding: chunked`
    Chunked,
    /// No body
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

/// How an incoming response body is delimited.
///
/// Responses have one framing mode requests never use: when the server sends
/// neither `Content-Length` nor chunked framing, the body runs until the
/// connection closes and the connection cannot be reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body at all (1xx, 204, 304, or a response to HEAD)
    None,
    /// Exactly this many bytes
    Length(u64),
    /// Chunked transfer coding
    Chunked,
    /// Everything until the peer closes the connection
    UntilClose,
}

impl BodyFraming {
    /// Whether this framing lets the connection carry another exchange.
    #[inline]
    pub fn is_self_delimiting(&self) -> bool {
        !matches!(self, BodyFraming::UntilClose)
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, BodyFraming::None)
    }
}
