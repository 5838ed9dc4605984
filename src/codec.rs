//! Stream/Sink glue over [`ParseState`]: a `Decoder` impl (for
//! `asynchronous-codec` or `tokio_util::codec`, whichever feature is
//! enabled) that feeds arriving bytes through the dispatch core and yields
//! one [`DecodedFrame`] per `decode` call once one is available.
//!
//! There is no `Encoder` here: this crate never constructs outbound
//! messages, and there is no single business object for an encoder to
//! serialize — frames come in seven different protocol shapes.
use crate::error::{ParserError, Result as ParserResult};
use crate::state::{Frame, ParseState, ParserTable};
use bytes::BytesMut;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// An accepted frame, detached from the working buffer it was parsed out
/// of, suitable for handing across a `Stream` boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub protocol: &'static str,
    pub bytes: Vec<u8>,
    pub payload_offset: usize,
}

impl DecodedFrame {
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.payload_offset.min(self.bytes.len())..]
    }
}

type PendingQueue = Rc<RefCell<VecDeque<DecodedFrame>>>;

#[cfg_attr(
    docsrs,
    doc(cfg(any(feature = "async-codec", feature = "tokio-codec")))
)]
/// A `Decoder` over any [`ParserTable`], driving a single [`ParseState`]
/// with whatever bytes a `Framed` transport hands it and surfacing
/// completed frames one at a time.
pub struct GnssCodec {
    state: ParseState,
    pending: PendingQueue,
}

impl GnssCodec {
    /// Builds a codec around `parsers`, with a working buffer of
    /// `buffer_capacity` bytes (see [`crate::dispatch::get_buffer_length`]
    /// for sizing it against a given table).
    pub fn new(parsers: ParserTable, buffer_capacity: usize) -> ParserResult<Self> {
        let pending: PendingQueue = Rc::new(RefCell::new(VecDeque::new()));
        let sink = pending.clone();
        let eom_callback = Box::new(move |frame: &Frame<'_>| {
            sink.borrow_mut().push_back(DecodedFrame {
                protocol: frame.protocol_name(),
                bytes: frame.raw().to_vec(),
                payload_offset: frame.payload_offset(),
            });
        });
        let state = ParseState::begin_parser("codec", parsers, buffer_capacity, eom_callback, None, None, None)?;
        Ok(Self { state, pending })
    }

    fn decode_helper(&mut self, src: &mut BytesMut) -> Result<Option<DecodedFrame>, ParserError> {
        if let Some(frame) = self.pending.borrow_mut().pop_front() {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let bytes = src.split().to_vec();
        self.state.parse_next_bytes(&bytes);
        Ok(self.pending.borrow_mut().pop_front())
    }
}

#[cfg(feature = "async-codec")]
mod non_tokio {
    use super::*;
    use asynchronous_codec::Decoder;

    impl Decoder for GnssCodec {
        type Item = DecodedFrame;
        type Error = ParserError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            self.decode_helper(src)
        }
    }
}

#[cfg(feature = "tokio-codec")]
mod tokio_codec {
    use super::*;
    use tokio_util::codec::Decoder;

    impl Decoder for GnssCodec {
        type Item = DecodedFrame;
        type Error = ParserError;

        fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            self.decode_helper(src)
        }
    }
}
